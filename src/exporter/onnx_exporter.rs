use std::path::Path;
use std::fs::File;
use std::io::Write;
use crate::ir::{Attribute, DataType, Dim, Graph, ModelIR, Node, Tensor, TensorData, ValueInfo};
use crate::exporter::{ModelExporter, ExporterError};
use crate::proto::onnx;
use crate::proto::onnx::attribute_proto::AttributeType;
use crate::proto::onnx::tensor_shape_proto::dimension;
use crate::proto::onnx::type_proto;
use prost::Message;
use tracing::info;

pub struct OnnxExporter;

impl ModelExporter for OnnxExporter {
    fn export(ir: &ModelIR, path: &Path) -> Result<(), ExporterError> {
        let buf = OnnxExporter::encode(ir)?;
        info!("Writing {} bytes to {}", buf.len(), path.display());

        let mut file = File::create(path)?;
        file.write_all(&buf)?;

        Ok(())
    }
}

impl OnnxExporter {
    pub fn encode(ir: &ModelIR) -> Result<Vec<u8>, ExporterError> {
        let model = model_proto(ir);
        let mut buf = Vec::with_capacity(model.encoded_len());
        model.encode(&mut buf).map_err(|e| ExporterError::SerializationError(e.to_string()))?;
        Ok(buf)
    }
}

fn model_proto(ir: &ModelIR) -> onnx::ModelProto {
    let mut model = onnx::ModelProto::default();
    model.ir_version = ir.ir_version;
    model.producer_name = ir.producer_name.clone();
    model.producer_version = ir.producer_version.clone();
    model.opset_import = ir
        .opset_imports
        .iter()
        .map(|opset| onnx::OperatorSetIdProto {
            domain: Some(opset.domain.clone()),
            version: Some(opset.version),
        })
        .collect();
    model.graph = Some(graph_proto(&ir.graph));
    model
}

fn graph_proto(graph: &Graph) -> onnx::GraphProto {
    let mut g = onnx::GraphProto::default();
    g.name = Some(graph.name.clone());
    g.doc_string = graph.doc_string.clone();
    g.node = graph.nodes.iter().map(node_proto).collect();
    g.input = graph.inputs.iter().map(value_info_proto).collect();
    g.output = graph.outputs.iter().map(value_info_proto).collect();
    g.initializer = graph.initializers.iter().map(tensor_proto).collect();
    g
}

fn node_proto(node: &Node) -> onnx::NodeProto {
    let mut n = onnx::NodeProto::default();
    n.name = non_empty(&node.name);
    n.op_type = Some(node.op_type.clone());
    n.domain = non_empty(&node.domain);
    n.input = node.inputs.clone();
    n.output = node.outputs.clone();
    n.doc_string = node.doc_string.clone();

    for (attr_name, attr_val) in &node.attributes {
        let mut a = onnx::AttributeProto::default();
        a.name = Some(attr_name.clone());
        let attr_type = match attr_val {
            Attribute::Float(f) => {
                a.f = Some(*f);
                AttributeType::Float
            }
            Attribute::Int(i) => {
                a.i = Some(*i);
                AttributeType::Int
            }
            Attribute::String(s) => {
                a.s = Some(s.as_bytes().to_vec());
                AttributeType::String
            }
            Attribute::Tensor(t) => {
                a.t = Some(tensor_proto(t));
                AttributeType::Tensor
            }
            Attribute::Graph(g) => {
                a.g = Some(graph_proto(g));
                AttributeType::Graph
            }
            Attribute::Floats(fs) => {
                a.floats = fs.clone();
                AttributeType::Floats
            }
            Attribute::Ints(is) => {
                a.ints = is.clone();
                AttributeType::Ints
            }
            Attribute::Strings(ss) => {
                a.strings = ss.iter().map(|s| s.as_bytes().to_vec()).collect();
                AttributeType::Strings
            }
            Attribute::Tensors(ts) => {
                a.tensors = ts.iter().map(tensor_proto).collect();
                AttributeType::Tensors
            }
            Attribute::Graphs(gs) => {
                a.graphs = gs.iter().map(graph_proto).collect();
                AttributeType::Graphs
            }
        };
        a.r#type = Some(attr_type as i32);
        n.attribute.push(a);
    }
    n
}

fn tensor_proto(tensor: &Tensor) -> onnx::TensorProto {
    let mut tp = onnx::TensorProto::default();
    tp.name = Some(tensor.name.clone());
    tp.dims = tensor.shape.iter().map(|&d| d as i64).collect();
    tp.data_type = Some(tensor.data_type.code());
    match &tensor.data {
        TensorData::Raw(bytes) => tp.raw_data = Some(bytes.clone()),
        TensorData::Floats(values) => tp.float_data = values.clone(),
        TensorData::Int32s(values) => tp.int32_data = values.clone(),
        TensorData::Int64s(values) => tp.int64_data = values.clone(),
        TensorData::Doubles(values) => tp.double_data = values.clone(),
        TensorData::Uint64s(values) => tp.uint64_data = values.clone(),
        TensorData::Strings(values) => tp.string_data = values.clone(),
    }
    tp
}

fn value_info_proto(info: &ValueInfo) -> onnx::ValueInfoProto {
    let mut v = onnx::ValueInfoProto::default();
    v.name = Some(info.name.clone());
    if info.data_type == DataType::Undefined && info.shape.is_none() {
        return v;
    }

    let shape = info.shape.as_ref().map(|dims| onnx::TensorShapeProto {
        dim: dims
            .iter()
            .map(|dim| onnx::tensor_shape_proto::Dimension {
                denotation: None,
                value: match dim {
                    Dim::Value(value) => Some(dimension::Value::DimValue(*value)),
                    Dim::Param(param) => Some(dimension::Value::DimParam(param.clone())),
                    Dim::Unknown => None,
                },
            })
            .collect(),
    });

    v.r#type = Some(onnx::TypeProto {
        denotation: None,
        value: Some(type_proto::Value::TensorType(type_proto::Tensor {
            elem_type: Some(info.data_type.code()),
            shape,
        })),
    });
    v
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
