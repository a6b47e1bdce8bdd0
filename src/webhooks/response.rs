//! Admission response assembly.
//!
//! Turns a pipeline outcome into a kube-rs [`AdmissionResponse`]. The
//! response uid is always overwritten with the request uid as the final
//! step, on success and on failure alike.

use kube::core::admission::{
    AdmissionRequest, AdmissionResponse, META_API_VERSION_V1, META_API_VERSION_V1BETA1, META_KIND,
};
use kube::core::{DynamicObject, Status, TypeMeta};
use tracing::error;

use crate::mutation::patch::to_json_patch;
use crate::mutation::{Decision, MutationError};

/// Status code reported with every denial
pub const DENIAL_CODE: u16 = 403;

/// Assemble an `admission.k8s.io/v1` response without a decoded request to start from
pub fn assemble(outcome: Result<Decision, MutationError>, uid: &str) -> AdmissionResponse {
    assemble_versioned(outcome, uid, META_API_VERSION_V1)
}

fn assemble_versioned(
    outcome: Result<Decision, MutationError>,
    uid: &str,
    api_version: &str,
) -> AdmissionResponse {
    let mut base = AdmissionResponse::invalid(String::new());
    base.types = TypeMeta {
        api_version: review_api_version(api_version).to_string(),
        kind: META_KIND.to_string(),
    };
    base.allowed = true;
    base.result = Status::success();
    assemble_onto(base, outcome, uid)
}

/// Map a caller's review version onto one we answer in, defaulting to v1
fn review_api_version(api_version: &str) -> &'static str {
    if api_version == META_API_VERSION_V1BETA1 {
        META_API_VERSION_V1BETA1
    } else {
        META_API_VERSION_V1
    }
}

/// Assemble a response for a decoded request.
///
/// Keeps the request's API version so `admission.k8s.io/v1beta1` callers get
/// a matching review back.
pub fn assemble_for(
    request: &AdmissionRequest<DynamicObject>,
    outcome: Result<Decision, MutationError>,
) -> AdmissionResponse {
    assemble_onto(AdmissionResponse::from(request), outcome, &request.uid)
}

/// Assemble the response for an admission review that could not be decoded.
///
/// `api_version` is whatever the caller's review declared; anything other
/// than `admission.k8s.io/v1beta1` is answered as `admission.k8s.io/v1`.
pub fn assemble_decode_failure(
    message: impl Into<String>,
    uid: &str,
    api_version: &str,
) -> AdmissionResponse {
    assemble_versioned(Err(MutationError::Decode(message.into())), uid, api_version)
}

fn assemble_onto(
    base: AdmissionResponse,
    outcome: Result<Decision, MutationError>,
    uid: &str,
) -> AdmissionResponse {
    let mut response = match outcome {
        Ok(Decision::Allow) => base,
        Ok(Decision::Mutate(ops)) => match with_patch(base.clone(), &ops) {
            Ok(response) => response,
            Err(e) => {
                error!(uid = %uid, error = %e, "Failed to serialize patch");
                deny(base, &e)
            }
        },
        Err(e) => deny(base, &e),
    };

    // The API server matches responses to requests by uid
    response.uid = uid.to_string();
    response
}

/// Attach a JSON Patch; kube-rs also sets `patchType: JSONPatch`
fn with_patch(
    base: AdmissionResponse,
    ops: &[crate::mutation::PatchOperation],
) -> Result<AdmissionResponse, MutationError> {
    let patch =
        to_json_patch(ops).map_err(|e| MutationError::PatchSerialization(e.to_string()))?;
    base.with_patch(patch)
        .map_err(|e| MutationError::PatchSerialization(e.to_string()))
}

fn deny(base: AdmissionResponse, err: &MutationError) -> AdmissionResponse {
    let message = err.to_string();
    let mut response = base.deny(&message);
    response.result = Status::failure(&message, err.reason()).with_code(DENIAL_CODE);
    response
}
