use std::path::Path;
use crate::ir::ModelIR;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Unsupported construct: {0}")]
    Unsupported(String),
}

pub trait ModelLoader {
    fn load<P: AsRef<Path>>(path: P) -> Result<ModelIR, LoaderError>;
}

pub mod onnx;
