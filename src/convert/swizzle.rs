use std::collections::HashMap;
use crate::convert::ConvertError;
use crate::ir::{Attribute, Node};
use tracing::{debug, warn};

pub const GROUPED_CONV_OP: &str = "Conv";
const WEIGHT_INPUT: usize = 1;

/// Maps the weight initializer of every grouped `Conv` (group != 1) to its group count.
/// A weight shared by several convolutions keeps the group of the last one.
pub fn find_swizzle_candidates(nodes: &[Node]) -> Result<HashMap<String, i64>, ConvertError> {
    let mut candidates = HashMap::new();

    for node in nodes.iter().filter(|n| n.op_type == GROUPED_CONV_OP) {
        let weight = match node.inputs.get(WEIGHT_INPUT) {
            Some(weight) if !weight.is_empty() => weight,
            _ => {
                return Err(ConvertError::InvalidGraph(format!(
                    "Conv node {} has no weight input",
                    node.name
                )));
            }
        };

        let group = match node.attribute("group") {
            None => continue,
            Some(Attribute::Int(group)) => *group,
            Some(other) => {
                return Err(ConvertError::InvalidGraph(format!(
                    "Conv node {} has a non-integer group attribute {:?}",
                    node.name, other
                )));
            }
        };

        if group == 1 {
            continue;
        }
        if group < 1 {
            return Err(ConvertError::InvalidGraph(format!(
                "Conv node {} has group {}",
                node.name, group
            )));
        }

        debug!("Conv {} uses {} with group {}", node.name, weight, group);
        if let Some(previous) = candidates.insert(weight.clone(), group) {
            if previous != group {
                warn!(
                    "Weight {} is shared by grouped convolutions with groups {} and {}; keeping {}",
                    weight, previous, group, group
                );
            }
        }
    }

    Ok(candidates)
}
