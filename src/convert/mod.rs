//! ONNX to MPSX conversion.
//!
//! The driver detects depthwise convolution weights, swizzles them into the
//! layout MPSX expects and casts every float tensor to the requested kind.
//! Converted models are tagged with [`PRODUCER_NAME`] so a second run is a no-op.

use std::borrow::Cow;
use crate::ir::ModelIR;
use thiserror::Error;
use tracing::info;

pub mod rewriter;
pub mod swizzle;
pub mod type_map;

pub use rewriter::convert;
pub use swizzle::find_swizzle_candidates;
pub use type_map::FloatKind;

pub const PRODUCER_NAME: &str = "MPSX";

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),
    #[error("Unsupported shape: {0}")]
    UnsupportedShape(String),
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),
}

pub fn is_converted(model: &ModelIR) -> bool {
    model.producer_name.as_deref() == Some(PRODUCER_NAME)
}

/// Converts `source` for `target`, or borrows it back unchanged when it is already an MPSX model.
pub fn run(source: &ModelIR, target: FloatKind) -> Result<Cow<'_, ModelIR>, ConvertError> {
    if is_converted(source) {
        info!("Graph {} is already converted, skipping", source.graph.name);
        return Ok(Cow::Borrowed(source));
    }
    convert(source, target).map(Cow::Owned)
}
