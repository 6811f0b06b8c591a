use std::fs;
use std::path::{Component, Path};
use crate::ir::{Attribute, DataType, Dim, Graph, ModelIR, Node, OpsetImport, Tensor, TensorData, ValueInfo};
use crate::loader::{LoaderError, ModelLoader};
use crate::proto::onnx;
use crate::proto::onnx::attribute_proto::AttributeType;
use crate::proto::onnx::tensor_proto::DataLocation;
use crate::proto::onnx::tensor_shape_proto::dimension;
use crate::proto::onnx::type_proto;
use prost::Message;
use tracing::{debug, info};

pub struct OnnxLoader;

impl ModelLoader for OnnxLoader {
    fn load<P: AsRef<Path>>(path: P) -> Result<ModelIR, LoaderError> {
        let path = path.as_ref();
        info!("Loading ONNX model: {}", path.display());
        let bytes = fs::read(path)?;
        OnnxLoader::decode(&bytes, path.parent())
    }
}

impl OnnxLoader {
    /// Decodes a serialized `ModelProto`. External tensor data is resolved
    /// against `base_dir`; without one, external tensors are rejected.
    pub fn decode(bytes: &[u8], base_dir: Option<&Path>) -> Result<ModelIR, LoaderError> {
        let proto = onnx::ModelProto::decode(bytes)
            .map_err(|e| LoaderError::InvalidFormat(e.to_string()))?;
        ProtoReader { base_dir }.model(proto)
    }
}

struct ProtoReader<'a> {
    base_dir: Option<&'a Path>,
}

impl ProtoReader<'_> {
    fn model(&self, proto: onnx::ModelProto) -> Result<ModelIR, LoaderError> {
        let graph = proto
            .graph
            .ok_or_else(|| LoaderError::InvalidFormat("model has no graph".to_string()))?;

        let opset_imports = proto
            .opset_import
            .into_iter()
            .map(|opset| OpsetImport {
                domain: opset.domain.unwrap_or_default(),
                version: opset.version.unwrap_or_default(),
            })
            .collect();

        Ok(ModelIR {
            ir_version: proto.ir_version,
            opset_imports,
            producer_name: proto.producer_name,
            producer_version: proto.producer_version,
            graph: self.graph(graph)?,
        })
    }

    fn graph(&self, proto: onnx::GraphProto) -> Result<Graph, LoaderError> {
        let name = proto.name.unwrap_or_default();

        if !proto.sparse_initializer.is_empty() {
            return Err(LoaderError::Unsupported(format!(
                "graph {} has {} sparse initializers",
                name,
                proto.sparse_initializer.len()
            )));
        }
        if !proto.value_info.is_empty() {
            debug!("Dropping {} value_info entries of graph {}", proto.value_info.len(), name);
        }

        Ok(Graph {
            nodes: proto.node.into_iter().map(|n| self.node(n)).collect::<Result<_, _>>()?,
            inputs: proto.input.into_iter().map(value_info).collect::<Result<_, _>>()?,
            outputs: proto.output.into_iter().map(value_info).collect::<Result<_, _>>()?,
            initializers: proto.initializer.into_iter().map(|t| self.tensor(t)).collect::<Result<_, _>>()?,
            doc_string: proto.doc_string,
            name,
        })
    }

    fn node(&self, proto: onnx::NodeProto) -> Result<Node, LoaderError> {
        let attributes = proto
            .attribute
            .into_iter()
            .map(|a| self.attribute(a))
            .collect::<Result<_, _>>()?;

        Ok(Node {
            name: proto.name.unwrap_or_default(),
            op_type: proto.op_type.unwrap_or_default(),
            domain: proto.domain.unwrap_or_default(),
            inputs: proto.input,
            outputs: proto.output,
            attributes,
            doc_string: proto.doc_string,
        })
    }

    fn attribute(&self, proto: onnx::AttributeProto) -> Result<(String, Attribute), LoaderError> {
        let name = proto.name.clone().unwrap_or_default();
        if proto.ref_attr_name.is_some() {
            return Err(LoaderError::Unsupported(format!("attribute {} references a function attribute", name)));
        }

        let value = match attribute_type(&proto) {
            AttributeType::Float => Attribute::Float(proto.f.unwrap_or_default()),
            AttributeType::Int => Attribute::Int(proto.i.unwrap_or_default()),
            AttributeType::String => Attribute::String(utf8(proto.s.unwrap_or_default(), &name)?),
            AttributeType::Tensor => {
                let tensor = proto
                    .t
                    .ok_or_else(|| LoaderError::InvalidFormat(format!("attribute {} has no tensor", name)))?;
                Attribute::Tensor(self.tensor(tensor)?)
            }
            AttributeType::Graph => {
                let graph = proto
                    .g
                    .ok_or_else(|| LoaderError::InvalidFormat(format!("attribute {} has no graph", name)))?;
                Attribute::Graph(Box::new(self.graph(graph)?))
            }
            AttributeType::Floats => Attribute::Floats(proto.floats),
            AttributeType::Ints => Attribute::Ints(proto.ints),
            AttributeType::Strings => Attribute::Strings(
                proto.strings.into_iter().map(|s| utf8(s, &name)).collect::<Result<_, _>>()?,
            ),
            AttributeType::Tensors => Attribute::Tensors(
                proto.tensors.into_iter().map(|t| self.tensor(t)).collect::<Result<_, _>>()?,
            ),
            AttributeType::Graphs => Attribute::Graphs(
                proto.graphs.into_iter().map(|g| self.graph(g)).collect::<Result<_, _>>()?,
            ),
            other => {
                return Err(LoaderError::Unsupported(format!("attribute {} has type {:?}", name, other)));
            }
        };

        Ok((name, value))
    }

    fn tensor(&self, proto: onnx::TensorProto) -> Result<Tensor, LoaderError> {
        let name = proto.name.clone().unwrap_or_default();
        let data_type = DataType::from_code(proto.data_type.unwrap_or_default());
        let shape = proto
            .dims
            .iter()
            .map(|&d| usize::try_from(d))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| LoaderError::InvalidFormat(format!("tensor {} has negative dims {:?}", name, proto.dims)))?;

        let data = if proto.data_location == Some(DataLocation::External as i32) {
            TensorData::Raw(self.external_data(&name, &proto.external_data)?)
        } else if let Some(raw) = proto.raw_data {
            TensorData::Raw(raw)
        } else {
            match data_type {
                DataType::F32 | DataType::C64 => TensorData::Floats(proto.float_data),
                DataType::F64 | DataType::C128 => TensorData::Doubles(proto.double_data),
                DataType::I64 => TensorData::Int64s(proto.int64_data),
                DataType::U32 | DataType::U64 => TensorData::Uint64s(proto.uint64_data),
                DataType::String => TensorData::Strings(proto.string_data),
                _ => TensorData::Int32s(proto.int32_data),
            }
        };

        Ok(Tensor { name, shape, data_type, data })
    }

    fn external_data(&self, name: &str, entries: &[onnx::StringStringEntryProto]) -> Result<Vec<u8>, LoaderError> {
        let base_dir = self
            .base_dir
            .ok_or_else(|| LoaderError::Unsupported(format!("tensor {} stores its data externally", name)))?;

        let mut location = None;
        let mut offset = 0usize;
        let mut length = None;
        for entry in entries {
            let value = entry.value.as_deref().unwrap_or_default();
            match entry.key.as_deref().unwrap_or_default() {
                "location" => location = Some(value),
                "offset" => offset = parse_usize(value, name)?,
                "length" => length = Some(parse_usize(value, name)?),
                _ => {}
            }
        }

        let location = location
            .ok_or_else(|| LoaderError::InvalidFormat(format!("tensor {} has no external data location", name)))?;
        let relative = Path::new(location);
        if relative.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
            return Err(LoaderError::InvalidFormat(format!(
                "external data location {} of tensor {} escapes the model directory",
                location, name
            )));
        }

        let path = base_dir.join(relative);
        debug!("Reading external data of {} from {}", name, path.display());
        let bytes = fs::read(&path)?;
        let end = match length {
            Some(length) => offset.checked_add(length),
            None => Some(bytes.len()),
        };
        match end {
            Some(end) if offset <= end && end <= bytes.len() => Ok(bytes[offset..end].to_vec()),
            _ => Err(LoaderError::InvalidFormat(format!(
                "external data range of tensor {} exceeds {} ({} bytes)",
                name,
                path.display(),
                bytes.len()
            ))),
        }
    }
}

fn value_info(proto: onnx::ValueInfoProto) -> Result<ValueInfo, LoaderError> {
    let name = proto.name.unwrap_or_default();
    let tensor_type = match proto.r#type.and_then(|t| t.value) {
        None => {
            return Ok(ValueInfo { name, data_type: DataType::Undefined, shape: None });
        }
        Some(type_proto::Value::TensorType(tensor_type)) => tensor_type,
        Some(_) => {
            return Err(LoaderError::Unsupported(format!("value {} is not a tensor", name)));
        }
    };

    let shape = tensor_type.shape.map(|shape| {
        shape
            .dim
            .into_iter()
            .map(|dim| match dim.value {
                Some(dimension::Value::DimValue(v)) => Dim::Value(v),
                Some(dimension::Value::DimParam(p)) => Dim::Param(p),
                None => Dim::Unknown,
            })
            .collect()
    });

    Ok(ValueInfo {
        name,
        data_type: DataType::from_code(tensor_type.elem_type.unwrap_or_default()),
        shape,
    })
}

// Older exporters leave `type` unset, so fall back to whichever field is populated.
fn attribute_type(proto: &onnx::AttributeProto) -> AttributeType {
    let declared = proto
        .r#type
        .and_then(|t| AttributeType::try_from(t).ok())
        .unwrap_or(AttributeType::Undefined);
    if declared != AttributeType::Undefined {
        return declared;
    }

    if proto.f.is_some() {
        AttributeType::Float
    } else if proto.i.is_some() {
        AttributeType::Int
    } else if proto.s.is_some() {
        AttributeType::String
    } else if proto.t.is_some() {
        AttributeType::Tensor
    } else if proto.g.is_some() {
        AttributeType::Graph
    } else if !proto.floats.is_empty() {
        AttributeType::Floats
    } else if !proto.ints.is_empty() {
        AttributeType::Ints
    } else if !proto.strings.is_empty() {
        AttributeType::Strings
    } else if !proto.tensors.is_empty() {
        AttributeType::Tensors
    } else if !proto.graphs.is_empty() {
        AttributeType::Graphs
    } else {
        AttributeType::Undefined
    }
}

fn utf8(bytes: Vec<u8>, attr: &str) -> Result<String, LoaderError> {
    String::from_utf8(bytes).map_err(|e| LoaderError::InvalidFormat(format!("attribute {}: {}", attr, e)))
}

fn parse_usize(value: &str, tensor: &str) -> Result<usize, LoaderError> {
    value
        .parse()
        .map_err(|_| LoaderError::InvalidFormat(format!("tensor {} has invalid external data field {}", tensor, value)))
}
