//! Admission mutation pipeline.
//!
//! Decides, for a single decoded admission request, whether the pod gets a
//! node selector and which one:
//! 1. Only `pods` are accepted, anything else is an error
//! 2. Reserved namespaces are allowed unchanged
//! 3. The namespace rule (or the default) is parsed into a JSON Patch
//!
//! Everything here is pure computation over the request and the rules.

pub mod error;
pub mod namespace;
pub mod patch;
pub mod selector;

use std::sync::Arc;

use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, Operation};
use tracing::{debug, info};

use crate::config::RuleConfig;

pub use error::{MutationError, Result, SUPPORTED_RESOURCE};
pub use namespace::{EXEMPT_NAMESPACES, is_exempt};
pub use patch::{NODE_SELECTOR_PATH, PatchOperation, PatchValue, build_patch};
pub use selector::{SelectorError, parse_selector, resolve};

/// The parts of an admission request the pipeline looks at
#[derive(Clone, Debug, PartialEq)]
pub struct AdmissionAttributes {
    /// Correlation id, echoed back in the response
    pub uid: String,
    /// Namespace of the object (empty for cluster-scoped requests)
    pub namespace: String,
    /// Plural resource name, e.g. `pods`
    pub resource: String,
    /// Object name, may be empty when generated by the API server
    pub name: String,
    pub operation: Operation,
}

impl AdmissionAttributes {
    /// Attributes of a pod creation in `namespace`
    pub fn pod(uid: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            namespace: namespace.into(),
            resource: SUPPORTED_RESOURCE.to_string(),
            name: String::new(),
            operation: Operation::Create,
        }
    }

    /// Override the resource name
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }
}

impl From<&AdmissionRequest<DynamicObject>> for AdmissionAttributes {
    fn from(request: &AdmissionRequest<DynamicObject>) -> Self {
        Self {
            uid: request.uid.clone(),
            namespace: request.namespace.clone().unwrap_or_default(),
            resource: request.resource.resource.clone(),
            name: request.name.clone(),
            operation: request.operation.clone(),
        }
    }
}

/// Outcome of a successful pipeline run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Allow the request unchanged
    Allow,
    /// Allow the request with the given patch
    Mutate(Vec<PatchOperation>),
}

impl Decision {
    /// Patch to apply, if any
    pub fn patch(&self) -> Option<&[PatchOperation]> {
        match self {
            Decision::Allow => None,
            Decision::Mutate(ops) => Some(ops),
        }
    }
}

/// Decide how to handle an admission request
pub fn decide(request: &AdmissionAttributes, config: &RuleConfig) -> Result<Decision> {
    if request.resource != SUPPORTED_RESOURCE {
        return Err(MutationError::UnsupportedResource {
            resource: request.resource.clone(),
        });
    }

    let namespace = request.namespace.as_str();
    if is_exempt(namespace) {
        debug!(uid = %request.uid, namespace = %namespace, "No mutation required for namespace");
        return Ok(Decision::Allow);
    }

    let selector = resolve(namespace, config);
    info!(uid = %request.uid, namespace = %namespace, selector = %selector, "Mutating pod");

    let ops = build_patch(selector).map_err(|source| MutationError::SelectorParse {
        selector: selector.to_string(),
        source,
    })?;

    Ok(Decision::Mutate(ops))
}

/// Pipeline context shared by all request handlers
#[derive(Clone, Debug)]
pub struct MutationContext {
    config: Arc<RuleConfig>,
}

impl MutationContext {
    /// Create a context around the loaded rules
    pub fn new(config: impl Into<Arc<RuleConfig>>) -> Self {
        Self {
            config: config.into(),
        }
    }

    /// The rules this context resolves against
    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Run the pipeline for one request
    pub fn decide(&self, request: &AdmissionAttributes) -> Result<Decision> {
        decide(request, &self.config)
    }
}
