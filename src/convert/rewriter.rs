use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use crate::convert::swizzle::find_swizzle_candidates;
use crate::convert::type_map::FloatKind;
use crate::convert::{ConvertError, PRODUCER_NAME};
use crate::ir::{Graph, ModelIR, Tensor, TensorData, ValueInfo};
use half::f16;
use tracing::{debug, info};

/// Detects swizzle candidates in `model` and rewrites it for `target`.
pub fn convert(model: &ModelIR, target: FloatKind) -> Result<ModelIR, ConvertError> {
    let candidates = find_swizzle_candidates(&model.graph.nodes)?;
    rewrite(model, &candidates, target)
}

/// Builds a new model with swizzled depthwise weights and every float tensor cast to `target`.
/// Nodes are carried over untouched.
pub fn rewrite(
    model: &ModelIR,
    candidates: &HashMap<String, i64>,
    target: FloatKind,
) -> Result<ModelIR, ConvertError> {
    let source = &model.graph;

    let initializers = source
        .initializers
        .iter()
        .map(|tensor| rewrite_initializer(tensor, candidates.get(&tensor.name).copied(), target))
        .collect::<Result<Vec<_>, _>>()?;
    let swizzled: HashSet<&str> = source
        .initializers
        .iter()
        .zip(&initializers)
        .filter(|(before, after)| before.shape != after.shape)
        .map(|(before, _)| before.name.as_str())
        .collect();

    // Models below IR version 4 also list initializers as graph inputs.
    let inputs = source
        .inputs
        .iter()
        .map(|info| {
            let mut info = cast_value_info(info, target);
            if swizzled.contains(info.name.as_str()) {
                swap_leading_dims(&mut info);
            }
            info
        })
        .collect();
    let outputs = source.outputs.iter().map(|info| cast_value_info(info, target)).collect();

    info!(
        "Rewrote graph {}: {} initializers, {} swizzled, target {}",
        source.name,
        initializers.len(),
        swizzled.len(),
        target
    );

    Ok(ModelIR {
        ir_version: model.ir_version,
        opset_imports: model.opset_imports.clone(),
        producer_name: Some(PRODUCER_NAME.to_string()),
        producer_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        graph: Graph {
            name: source.name.clone(),
            nodes: source.nodes.clone(),
            inputs,
            outputs,
            initializers,
            doc_string: source.doc_string.clone(),
        },
    })
}

fn rewrite_initializer(tensor: &Tensor, group: Option<i64>, target: FloatKind) -> Result<Tensor, ConvertError> {
    let swizzle = match (group, tensor.shape.first()) {
        (Some(group), Some(&dim)) => i64::try_from(dim).ok() == Some(group),
        _ => false,
    };
    if group.is_some() && !swizzle {
        debug!("Leaving {} unswizzled: shape {:?} does not match group {:?}", tensor.name, tensor.shape, group);
    }

    let cast = FloatKind::from_data_type(tensor.data_type)
        .filter(|&kind| kind != target)
        .map(|kind| (kind, target));

    if !swizzle && cast.is_none() {
        return Ok(tensor.clone());
    }
    if swizzle && tensor.shape.len() != 4 {
        return Err(ConvertError::UnsupportedShape(format!(
            "{} has shape {:?}; swizzling needs a 4-D weight",
            tensor.name, tensor.shape
        )));
    }

    let element_size = tensor.data_type.element_size().ok_or_else(|| {
        ConvertError::UnsupportedType(format!("{} has no fixed-width element type ({:?})", tensor.name, tensor.data_type))
    })?;
    let mut bytes = checked_raw_bytes(tensor, element_size)?;
    let mut shape = tensor.shape.clone();
    let mut data_type = tensor.data_type;

    if swizzle {
        debug!("Swizzling {} {:?}", tensor.name, shape);
        bytes = Cow::Owned(swap_leading_axes(&bytes, &shape, element_size));
        shape.swap(0, 1);
    }
    if let Some((from, to)) = cast {
        debug!("Casting {} from {} to {}", tensor.name, from, to);
        bytes = Cow::Owned(cast_floats(&bytes, from, to));
        data_type = to.data_type();
    }

    Ok(Tensor {
        name: tensor.name.clone(),
        shape,
        data_type,
        data: TensorData::Raw(bytes.into_owned()),
    })
}

fn checked_raw_bytes(tensor: &Tensor, element_size: usize) -> Result<Cow<'_, [u8]>, ConvertError> {
    let expected = tensor
        .num_elements()
        .and_then(|count| count.checked_mul(element_size))
        .ok_or_else(|| {
            ConvertError::InvalidGraph(format!("{} has shape {:?}, too large to address", tensor.name, tensor.shape))
        })?;
    let bytes = tensor.raw_bytes().ok_or_else(|| {
        ConvertError::UnsupportedType(format!("{} has no raw representation ({:?})", tensor.name, tensor.data_type))
    })?;

    if bytes.len() != expected {
        return Err(ConvertError::InvalidGraph(format!(
            "{} holds {} bytes but shape {:?} of {:?} needs {}",
            tensor.name,
            bytes.len(),
            tensor.shape,
            tensor.data_type,
            expected
        )));
    }
    Ok(bytes)
}

fn cast_value_info(info: &ValueInfo, target: FloatKind) -> ValueInfo {
    match FloatKind::from_data_type(info.data_type) {
        Some(kind) if kind != target => ValueInfo {
            data_type: target.data_type(),
            ..info.clone()
        },
        _ => info.clone(),
    }
}

fn swap_leading_dims(info: &mut ValueInfo) {
    match info.shape.as_mut() {
        Some(dims) if dims.len() == 4 => {
            debug!("Swizzling input descriptor {}", info.name);
            dims.swap(0, 1);
        }
        _ => {}
    }
}

/// Permutes a row-major buffer from axis order (0, 1, ...) to (1, 0, ...).
/// `bytes` must hold exactly the elements described by `shape`, which needs at least two axes.
pub fn swap_leading_axes(bytes: &[u8], shape: &[usize], element_size: usize) -> Vec<u8> {
    let (d0, d1) = (shape[0], shape[1]);
    let block = shape[2..].iter().product::<usize>() * element_size;
    debug_assert_eq!(bytes.len(), d0 * d1 * block);

    let mut out = Vec::with_capacity(bytes.len());
    for j in 0..d1 {
        for i in 0..d0 {
            let start = (i * d1 + j) * block;
            out.extend_from_slice(&bytes[start..start + block]);
        }
    }
    out
}

/// Reinterprets little-endian `bytes` as `from` elements and casts each one to `to`.
pub fn cast_floats(bytes: &[u8], from: FloatKind, to: FloatKind) -> Vec<u8> {
    match (from, to) {
        (FloatKind::F32, FloatKind::F16) => bytes
            .chunks_exact(4)
            .flat_map(|c| f16::from_f32(f32::from_le_bytes([c[0], c[1], c[2], c[3]])).to_le_bytes())
            .collect(),
        (FloatKind::F16, FloatKind::F32) => bytes
            .chunks_exact(2)
            .flat_map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32().to_le_bytes())
            .collect(),
        _ => bytes.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Attribute, DataType, Dim, Node};
    use proptest::prelude::*;

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn f16_values(bytes: &[u8]) -> Vec<f32> {
        bytes.chunks_exact(2).map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32()).collect()
    }

    fn weight(name: &str, shape: Vec<usize>) -> Tensor {
        let count: usize = shape.iter().product();
        let values: Vec<f32> = (0..count).map(|i| i as f32).collect();
        Tensor {
            name: name.to_string(),
            shape,
            data_type: DataType::F32,
            data: TensorData::Raw(f32_bytes(&values)),
        }
    }

    fn model_with(initializers: Vec<Tensor>) -> ModelIR {
        let mut ir = ModelIR::new();
        ir.graph.name = "g".to_string();
        ir.graph.initializers = initializers;
        ir.graph.nodes.push(Node {
            name: "conv".to_string(),
            op_type: "Conv".to_string(),
            domain: String::new(),
            inputs: vec!["X".to_string(), "W".to_string()],
            outputs: vec!["Y".to_string()],
            attributes: vec![("group".to_string(), Attribute::Int(2))],
            doc_string: None,
        });
        ir
    }

    #[test]
    fn test_swap_leading_axes() {
        // shape [2, 3, 1, 1]: rows (0 1 2) (3 4 5) become columns
        let bytes: Vec<u8> = (0..6).collect();
        let swapped = swap_leading_axes(&bytes, &[2, 3, 1, 1], 1);
        assert_eq!(swapped, vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_swap_moves_whole_blocks() {
        // shape [2, 1, 1, 2] with 2-byte elements keeps each 4-byte block intact
        let bytes: Vec<u8> = (0..8).collect();
        assert_eq!(swap_leading_axes(&bytes, &[2, 1, 1, 2], 2), bytes);
    }

    #[test]
    fn test_cast_f32_to_f16() {
        let bytes = cast_floats(&f32_bytes(&[1.0, -2.5, 65504.0, 1e6]), FloatKind::F32, FloatKind::F16);
        let values = f16_values(&bytes);
        assert_eq!(&values[..3], &[1.0, -2.5, 65504.0]);
        assert!(values[3].is_infinite());
    }

    #[test]
    fn test_cast_f16_to_f32() {
        let half: Vec<u8> = [f16::from_f32(0.5), f16::from_f32(-3.0)]
            .iter()
            .flat_map(|h| h.to_le_bytes())
            .collect();
        assert_eq!(cast_floats(&half, FloatKind::F16, FloatKind::F32), f32_bytes(&[0.5, -3.0]));
    }

    #[test]
    fn test_matching_weight_is_swizzled_and_cast() {
        let ir = model_with(vec![weight("W", vec![2, 3, 1, 1])]);
        let out = convert(&ir, FloatKind::F16).unwrap();

        let w = &out.graph.initializers[0];
        assert_eq!(w.shape, vec![3, 2, 1, 1]);
        assert_eq!(w.data_type, DataType::F16);
        match &w.data {
            TensorData::Raw(bytes) => assert_eq!(f16_values(bytes), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]),
            other => panic!("expected raw data, got {:?}", other),
        }
    }

    #[test]
    fn test_mismatched_weight_is_only_cast() {
        let ir = model_with(vec![weight("W", vec![4, 1, 3, 3])]);
        let out = convert(&ir, FloatKind::F16).unwrap();

        let w = &out.graph.initializers[0];
        assert_eq!(w.shape, vec![4, 1, 3, 3]);
        assert_eq!(w.data_type, DataType::F16);
    }

    #[test]
    fn test_f32_target_keeps_f32_weights_intact() {
        let ir = model_with(vec![weight("bias", vec![2])]);
        let out = convert(&ir, FloatKind::F32).unwrap();
        assert_eq!(out.graph.initializers[0], ir.graph.initializers[0]);
    }

    #[test]
    fn test_f32_target_upcasts_half_weights() {
        let half: Vec<u8> = [1.0f32, 2.0].iter().flat_map(|&v| f16::from_f32(v).to_le_bytes()).collect();
        let ir = model_with(vec![Tensor {
            name: "scale".to_string(),
            shape: vec![2],
            data_type: DataType::F16,
            data: TensorData::Raw(half),
        }]);

        let out = convert(&ir, FloatKind::F32).unwrap();
        let scale = &out.graph.initializers[0];
        assert_eq!(scale.data_type, DataType::F32);
        assert_eq!(scale.data, TensorData::Raw(f32_bytes(&[1.0, 2.0])));
    }

    #[test]
    fn test_typed_float_data_is_cast_to_raw() {
        let ir = model_with(vec![Tensor {
            name: "b".to_string(),
            shape: vec![2],
            data_type: DataType::F32,
            data: TensorData::Floats(vec![0.25, 8.0]),
        }]);

        let out = convert(&ir, FloatKind::F16).unwrap();
        match &out.graph.initializers[0].data {
            TensorData::Raw(bytes) => assert_eq!(f16_values(bytes), vec![0.25, 8.0]),
            other => panic!("expected raw data, got {:?}", other),
        }
    }

    #[test]
    fn test_swizzle_requires_four_dims() {
        let ir = model_with(vec![weight("W", vec![2, 1, 3])]);
        assert!(matches!(convert(&ir, FloatKind::F16), Err(ConvertError::UnsupportedShape(_))));
    }

    #[test]
    fn test_mismatched_three_dim_weight_is_not_an_error() {
        let ir = model_with(vec![weight("W", vec![6, 1, 3])]);
        assert!(convert(&ir, FloatKind::F16).is_ok());
    }

    #[test]
    fn test_truncated_buffer_is_invalid() {
        let mut w = weight("W", vec![2, 1, 1, 1]);
        w.data = TensorData::Raw(vec![0, 0, 128]);
        let ir = model_with(vec![w]);
        assert!(matches!(convert(&ir, FloatKind::F16), Err(ConvertError::InvalidGraph(_))));
    }

    #[test]
    fn test_overflowing_shape_is_invalid() {
        let huge = 1usize << (usize::BITS / 2 + 1);
        for shape in [vec![huge, huge, 1, 1], vec![2, huge, huge, 1]] {
            let mut w = weight("W", vec![1]);
            w.shape = shape;
            w.data = TensorData::Raw(Vec::new());
            let ir = model_with(vec![w]);
            assert!(matches!(convert(&ir, FloatKind::F16), Err(ConvertError::InvalidGraph(_))));
        }
    }

    #[test]
    fn test_value_infos_cast_only_floats() {
        let mut ir = model_with(Vec::new());
        ir.graph.inputs = vec![
            ValueInfo {
                name: "X".to_string(),
                data_type: DataType::F32,
                shape: Some(vec![Dim::Param("N".to_string()), Dim::Value(3)]),
            },
            ValueInfo {
                name: "ids".to_string(),
                data_type: DataType::I64,
                shape: Some(vec![Dim::Value(1)]),
            },
        ];

        let out = convert(&ir, FloatKind::F16).unwrap();
        assert_eq!(out.graph.inputs[0].data_type, DataType::F16);
        assert_eq!(out.graph.inputs[0].shape, ir.graph.inputs[0].shape);
        assert_eq!(out.graph.inputs[1], ir.graph.inputs[1]);
    }

    #[test]
    fn test_swizzled_initializer_input_is_swizzled() {
        let mut ir = model_with(vec![weight("W", vec![2, 1, 1, 2])]);
        ir.ir_version = Some(3);
        ir.graph.inputs = vec![
            ValueInfo {
                name: "X".to_string(),
                data_type: DataType::F32,
                shape: Some(vec![Dim::Value(1), Dim::Value(2), Dim::Value(4), Dim::Value(4)]),
            },
            ValueInfo {
                name: "W".to_string(),
                data_type: DataType::F32,
                shape: Some(vec![Dim::Value(2), Dim::Value(1), Dim::Value(1), Dim::Value(2)]),
            },
        ];

        let out = convert(&ir, FloatKind::F16).unwrap();
        assert_eq!(out.graph.initializers[0].shape, vec![1, 2, 1, 2]);

        let w = &out.graph.inputs[1];
        assert_eq!(w.data_type, DataType::F16);
        assert_eq!(w.shape, Some(vec![Dim::Value(1), Dim::Value(2), Dim::Value(1), Dim::Value(2)]));
        assert_eq!(out.graph.inputs[0].shape, ir.graph.inputs[0].shape);
    }

    #[test]
    fn test_output_is_tagged() {
        let mut ir = model_with(Vec::new());
        ir.ir_version = Some(7);
        let out = convert(&ir, FloatKind::F32).unwrap();
        assert_eq!(out.producer_name.as_deref(), Some(PRODUCER_NAME));
        assert_eq!(out.ir_version, Some(7));
        assert_eq!(out.graph.nodes, ir.graph.nodes);
    }

    fn weight_buffer() -> impl Strategy<Value = (Vec<usize>, Vec<u8>)> {
        (1usize..5, 1usize..5, 1usize..4, 1usize..4).prop_flat_map(|(a, b, c, d)| {
            (Just(vec![a, b, c, d]), prop::collection::vec(any::<u8>(), a * b * c * d * 2))
        })
    }

    proptest! {
        #[test]
        fn prop_swap_is_self_inverse((shape, bytes) in weight_buffer()) {
            let once = swap_leading_axes(&bytes, &shape, 2);
            let swapped_shape = [shape[1], shape[0], shape[2], shape[3]];
            let twice = swap_leading_axes(&once, &swapped_shape, 2);
            prop_assert_eq!(twice, bytes);
        }

        #[test]
        fn prop_cast_is_deterministic(values in prop::collection::vec(any::<f32>(), 0..64)) {
            let bytes = f32_bytes(&values);
            let first = cast_floats(&bytes, FloatKind::F32, FloatKind::F16);
            let second = cast_floats(&bytes, FloatKind::F32, FloatKind::F16);
            prop_assert_eq!(first.len(), values.len() * 2);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_half_survives_widening(bits in prop::collection::vec(any::<u16>(), 0..64)) {
            let halves: Vec<u8> = bits
                .iter()
                .map(|&b| f16::from_bits(b))
                .filter(|h| !h.is_nan())
                .flat_map(|h| h.to_le_bytes())
                .collect();
            let wide = cast_floats(&halves, FloatKind::F16, FloatKind::F32);
            prop_assert_eq!(cast_floats(&wide, FloatKind::F32, FloatKind::F16), halves);
        }
    }
}
