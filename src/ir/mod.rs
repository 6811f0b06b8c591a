use std::borrow::Cow;

/// ONNX element type, keyed by the `TensorProto.DataType` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Undefined,
    F32,
    U8,
    I8,
    U16,
    I16,
    I32,
    I64,
    String,
    Bool,
    F16,
    F64,
    U32,
    U64,
    C64,
    C128,
    BF16,
    Other(i32),
}

impl DataType {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => DataType::Undefined,
            1 => DataType::F32,
            2 => DataType::U8,
            3 => DataType::I8,
            4 => DataType::U16,
            5 => DataType::I16,
            6 => DataType::I32,
            7 => DataType::I64,
            8 => DataType::String,
            9 => DataType::Bool,
            10 => DataType::F16,
            11 => DataType::F64,
            12 => DataType::U32,
            13 => DataType::U64,
            14 => DataType::C64,
            15 => DataType::C128,
            16 => DataType::BF16,
            other => DataType::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            DataType::Undefined => 0,
            DataType::F32 => 1,
            DataType::U8 => 2,
            DataType::I8 => 3,
            DataType::U16 => 4,
            DataType::I16 => 5,
            DataType::I32 => 6,
            DataType::I64 => 7,
            DataType::String => 8,
            DataType::Bool => 9,
            DataType::F16 => 10,
            DataType::F64 => 11,
            DataType::U32 => 12,
            DataType::U64 => 13,
            DataType::C64 => 14,
            DataType::C128 => 15,
            DataType::BF16 => 16,
            DataType::Other(code) => code,
        }
    }

    /// Width of one element in `raw_data`, or `None` for variable-width and unknown types.
    pub fn element_size(self) -> Option<usize> {
        match self {
            DataType::U8 | DataType::I8 | DataType::Bool => Some(1),
            DataType::U16 | DataType::I16 | DataType::F16 | DataType::BF16 => Some(2),
            DataType::F32 | DataType::I32 | DataType::U32 => Some(4),
            DataType::I64 | DataType::U64 | DataType::F64 | DataType::C64 => Some(8),
            DataType::C128 => Some(16),
            DataType::Undefined | DataType::String | DataType::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dim {
    Value(i64),
    Param(String),
    Unknown,
}

/// Graph input or output descriptor. `shape` is `None` when the type carries no shape at all.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueInfo {
    pub name: String,
    pub data_type: DataType,
    pub shape: Option<Vec<Dim>>,
}

/// Tensor payload, in whichever `TensorProto` field it was stored.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Raw(Vec<u8>),
    Floats(Vec<f32>),
    Int32s(Vec<i32>),
    Int64s(Vec<i64>),
    Doubles(Vec<f64>),
    Uint64s(Vec<u64>),
    Strings(Vec<Vec<u8>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub data_type: DataType,
    pub data: TensorData,
}

impl Tensor {
    /// Element count from `shape`, or `None` if it does not fit in `usize`.
    pub fn num_elements(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    /// Little-endian bytes of the payload as `raw_data` would hold them.
    /// Typed fields are narrowed to the element width of `data_type`.
    pub fn raw_bytes(&self) -> Option<Cow<'_, [u8]>> {
        let bytes = match &self.data {
            TensorData::Raw(bytes) => return Some(Cow::Borrowed(bytes)),
            TensorData::Strings(_) => return None,
            TensorData::Floats(values) => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            TensorData::Doubles(values) => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            TensorData::Int64s(values) => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            TensorData::Int32s(values) => match self.data_type.element_size()? {
                1 => values.iter().map(|&v| v as u8).collect(),
                2 => values.iter().flat_map(|&v| (v as u16).to_le_bytes()).collect(),
                4 => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
                _ => return None,
            },
            TensorData::Uint64s(values) => match self.data_type.element_size()? {
                4 => values.iter().flat_map(|&v| (v as u32).to_le_bytes()).collect(),
                8 => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
                _ => return None,
            },
        };
        Some(Cow::Owned(bytes))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Float(f32),
    Int(i64),
    String(String),
    Tensor(Tensor),
    Graph(Box<Graph>),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<String>),
    Tensors(Vec<Tensor>),
    Graphs(Vec<Graph>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub op_type: String,
    pub domain: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: Vec<(String, Attribute)>,
    pub doc_string: Option<String>,
}

impl Node {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|(attr_name, _)| attr_name == name)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Graph {
    pub name: String,
    pub nodes: Vec<Node>,
    pub inputs: Vec<ValueInfo>,
    pub outputs: Vec<ValueInfo>,
    pub initializers: Vec<Tensor>,
    pub doc_string: Option<String>,
}

impl Graph {
    fn strip_doc_strings(&mut self) {
        self.doc_string = None;
        for node in &mut self.nodes {
            node.doc_string = None;
            for (_, attr) in &mut node.attributes {
                match attr {
                    Attribute::Graph(graph) => graph.strip_doc_strings(),
                    Attribute::Graphs(graphs) => graphs.iter_mut().for_each(Graph::strip_doc_strings),
                    _ => {}
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpsetImport {
    pub domain: String,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelIR {
    pub ir_version: Option<i64>,
    pub opset_imports: Vec<OpsetImport>,
    pub producer_name: Option<String>,
    pub producer_version: Option<String>,
    pub graph: Graph,
}

impl ModelIR {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops documentation strings from the graph and every node, subgraphs included.
    pub fn strip_doc_strings(&mut self) {
        self.graph.strip_doc_strings();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_code_mapping() {
        for code in 0..=16 {
            assert_eq!(DataType::from_code(code).code(), code);
        }
        assert_eq!(DataType::from_code(1), DataType::F32);
        assert_eq!(DataType::from_code(10), DataType::F16);
        assert_eq!(DataType::from_code(19), DataType::Other(19));
        assert_eq!(DataType::Other(19).element_size(), None);
    }

    #[test]
    fn test_num_elements_overflow() {
        let mut tensor = Tensor {
            name: "w".to_string(),
            shape: vec![2, 3, 4],
            data_type: DataType::F32,
            data: TensorData::Raw(Vec::new()),
        };
        assert_eq!(tensor.num_elements(), Some(24));

        tensor.shape = vec![usize::MAX / 2, 4, 1, 1];
        assert_eq!(tensor.num_elements(), None);
    }

    #[test]
    fn test_raw_bytes_from_float_data() {
        let tensor = Tensor {
            name: "w".to_string(),
            shape: vec![2],
            data_type: DataType::F32,
            data: TensorData::Floats(vec![1.0, -2.0]),
        };
        let bytes = tensor.raw_bytes().unwrap();
        assert_eq!(&bytes[..], &[0, 0, 128, 63, 0, 0, 0, 192]);
    }

    #[test]
    fn test_raw_bytes_narrows_int32_data() {
        let half = Tensor {
            name: "h".to_string(),
            shape: vec![2],
            data_type: DataType::F16,
            data: TensorData::Int32s(vec![0x3C00, 0xC000]),
        };
        assert_eq!(&half.raw_bytes().unwrap()[..], &[0x00, 0x3C, 0x00, 0xC0]);

        let flags = Tensor {
            name: "b".to_string(),
            shape: vec![3],
            data_type: DataType::Bool,
            data: TensorData::Int32s(vec![1, 0, 1]),
        };
        assert_eq!(&flags.raw_bytes().unwrap()[..], &[1, 0, 1]);
    }

    #[test]
    fn test_raw_bytes_unavailable_for_strings() {
        let tensor = Tensor {
            name: "s".to_string(),
            shape: vec![1],
            data_type: DataType::String,
            data: TensorData::Strings(vec![b"abc".to_vec()]),
        };
        assert!(tensor.raw_bytes().is_none());
    }

    #[test]
    fn test_strip_doc_strings_reaches_subgraphs() {
        let body = Graph {
            name: "body".to_string(),
            doc_string: Some("loop body".to_string()),
            ..Graph::default()
        };

        let mut ir = ModelIR::new();
        ir.graph.doc_string = Some("main".to_string());
        ir.graph.nodes.push(Node {
            name: "loop".to_string(),
            op_type: "Loop".to_string(),
            domain: String::new(),
            inputs: vec!["M".to_string(), "cond".to_string()],
            outputs: vec!["Y".to_string()],
            attributes: vec![("body".to_string(), Attribute::Graph(Box::new(body)))],
            doc_string: Some("a loop".to_string()),
        });

        ir.strip_doc_strings();

        assert_eq!(ir.graph.doc_string, None);
        assert_eq!(ir.graph.nodes[0].doc_string, None);
        match ir.graph.nodes[0].attribute("body") {
            Some(Attribute::Graph(graph)) => assert_eq!(graph.doc_string, None),
            other => panic!("unexpected attribute: {:?}", other),
        }
    }
}
