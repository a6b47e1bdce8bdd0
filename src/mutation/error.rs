//! Error types for the mutation pipeline.

use thiserror::Error;

use super::selector::SelectorError;

/// The only resource this webhook mutates
pub const SUPPORTED_RESOURCE: &str = "pods";

/// Failures of a single admission request.
///
/// None of these are fatal to the process; each one turns into a denial.
#[derive(Error, Debug)]
pub enum MutationError {
    /// The webhook was invoked for a resource other than pods
    #[error("expected mutating resource is pods, got {resource:?}")]
    UnsupportedResource { resource: String },

    /// The selector resolved for the namespace is invalid
    #[error("invalid node selector {selector:?}: {source}")]
    SelectorParse {
        selector: String,
        #[source]
        source: SelectorError,
    },

    /// The inbound admission review could not be decoded
    #[error("invalid admission review: {0}")]
    Decode(String),

    /// The patch could not be encoded into the response
    #[error("failed to serialize patch: {0}")]
    PatchSerialization(String),
}

impl MutationError {
    /// Machine readable reason reported in the admission status
    pub fn reason(&self) -> &'static str {
        match self {
            MutationError::UnsupportedResource { .. } => "UnsupportedResource",
            MutationError::SelectorParse { .. } => "InvalidSelector",
            MutationError::Decode(_) => "InvalidRequest",
            MutationError::PatchSerialization(_) => "PatchSerialization",
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, MutationError>;
