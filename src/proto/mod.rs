#[allow(clippy::all)]
pub mod onnx {
    include!("onnx.rs");
}
