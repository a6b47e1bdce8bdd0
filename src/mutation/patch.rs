//! JSON Patch construction for the pod node selector.

use serde::Serialize;

use super::selector::{Labels, SelectorError, parse_selector};

/// JSON Pointer to the pod node selector
pub const NODE_SELECTOR_PATH: &str = "/spec/nodeSelector";

/// Values that may appear in a patch operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PatchValue {
    /// A `spec.nodeSelector` label map
    NodeSelector(Labels),
}

/// A single JSON Patch operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    /// Add (or overwrite) the value at `path`
    Add { path: String, value: PatchValue },
}

impl PatchOperation {
    /// Operation that sets the pod node selector
    pub fn set_node_selector(labels: Labels) -> Self {
        PatchOperation::Add {
            path: NODE_SELECTOR_PATH.to_string(),
            value: PatchValue::NodeSelector(labels),
        }
    }

    /// Target path of the operation
    pub fn path(&self) -> &str {
        match self {
            PatchOperation::Add { path, .. } => path,
        }
    }

    /// Value carried by the operation
    pub fn value(&self) -> &PatchValue {
        match self {
            PatchOperation::Add { value, .. } => value,
        }
    }
}

/// Build the patch that applies a selector to a pod.
///
/// Always yields exactly one `add` operation on success.
pub fn build_patch(selector: &str) -> Result<Vec<PatchOperation>, SelectorError> {
    let labels = parse_selector(selector)?;
    Ok(vec![PatchOperation::set_node_selector(labels)])
}

/// Convert patch operations into a [`json_patch::Patch`] for the admission response
pub fn to_json_patch(ops: &[PatchOperation]) -> Result<json_patch::Patch, serde_json::Error> {
    serde_json::from_value(serde_json::to_value(ops)?)
}
