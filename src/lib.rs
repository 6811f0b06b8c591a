//! Converts ONNX models into the variant the MPSX runtime loads: float tensors
//! cast to a single precision and depthwise convolution weights swizzled into
//! the layout MPSX expects.

pub mod convert;
pub mod exporter;
pub mod ir;
pub mod loader;
pub mod proto;

pub use convert::{ConvertError, FloatKind, PRODUCER_NAME};
pub use exporter::onnx_exporter::OnnxExporter;
pub use exporter::{ExporterError, ModelExporter};
pub use ir::ModelIR;
pub use loader::onnx::OnnxLoader;
pub use loader::{LoaderError, ModelLoader};
