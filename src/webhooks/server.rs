//! Admission webhook server.
//!
//! Serves `POST /mutate` over TLS. To enable the webhook:
//! 1. Mount the TLS certificate and key (e.g. from cert-manager) into the pod
//! 2. Mount the rules file into the pod
//! 3. Create a MutatingWebhookConfiguration for `pods` on CREATE pointing at `/mutate`
//!
//! The request body is decoded here rather than by an axum extractor so a
//! malformed review still gets an `AdmissionReview` denial back.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::post,
};
use axum_server::Handle;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionReview, ConvertAdmissionReviewError};
use tracing::{debug, error, info, warn};

use crate::health::{AdmissionOutcome, HealthState};
use crate::mutation::{AdmissionAttributes, Decision, MutationContext};
use crate::webhooks::response::{assemble_decode_failure, assemble_for};

/// Route the API server calls
pub const MUTATE_PATH: &str = "/mutate";

/// Shared state for webhook handlers
pub struct WebhookState {
    /// Mutation pipeline
    pub ctx: MutationContext,
    /// Optional health state for metrics
    pub health_state: Option<Arc<HealthState>>,
}

impl WebhookState {
    pub fn new(ctx: MutationContext, health_state: Option<Arc<HealthState>>) -> Self {
        Self { ctx, health_state }
    }

    fn record(&self, outcome: AdmissionOutcome, started: Instant) {
        if let Some(state) = &self.health_state {
            state
                .metrics
                .record_admission(outcome, started.elapsed().as_secs_f64());
        }
    }
}

/// Requests rejected before an admission review can be produced
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request had no body
    #[error("Empty Body")]
    EmptyBody,

    /// The request body is not declared as JSON
    #[error("Invalid Content-Type")]
    InvalidContentType,
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        let status = match self {
            TransportError::EmptyBody => StatusCode::BAD_REQUEST,
            TransportError::InvalidContentType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        };
        (status, self.to_string()).into_response()
    }
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(MUTATE_PATH, post(mutate_pod))
        .with_state(state)
}

/// Mutating admission webhook handler for pods
async fn mutate_pod(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    match review_admission(&state, content_type, &body) {
        Ok(review) => (StatusCode::OK, Json(review)).into_response(),
        Err(e) => {
            warn!(error = %e, "Rejected webhook request");
            e.into_response()
        }
    }
}

/// Run one raw webhook request through the pipeline.
///
/// Transport problems (empty body, wrong content type) are returned as
/// errors. Everything else, including undecodable reviews, yields an
/// `AdmissionReview` whose response carries the request uid.
pub fn review_admission(
    state: &WebhookState,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<AdmissionReview<DynamicObject>, TransportError> {
    let started = Instant::now();

    if body.is_empty() {
        state.record(AdmissionOutcome::Invalid, started);
        return Err(TransportError::EmptyBody);
    }
    if !content_type.is_some_and(is_json) {
        state.record(AdmissionOutcome::Invalid, started);
        return Err(TransportError::InvalidContentType);
    }

    let request = match decode_request(body) {
        Ok(request) => request,
        Err(message) => {
            let (uid, api_version) = salvage_identity(body);
            error!(uid = %uid, error = %message, "Failed to extract admission request");
            state.record(AdmissionOutcome::Invalid, started);
            return Ok(assemble_decode_failure(message, &uid, &api_version).into_review());
        }
    };

    let attributes = AdmissionAttributes::from(&request);
    debug!(
        uid = %attributes.uid,
        operation = ?attributes.operation,
        namespace = %attributes.namespace,
        name = %attributes.name,
        resource = %attributes.resource,
        "Processing admission request"
    );

    let outcome = state.ctx.decide(&attributes);
    let mutated = matches!(outcome, Ok(Decision::Mutate(_)));
    if let Err(e) = &outcome {
        warn!(
            uid = %attributes.uid,
            namespace = %attributes.namespace,
            reason = e.reason(),
            error = %e,
            "Admission request denied"
        );
    }

    let response = assemble_for(&request, outcome);
    let metric = match (response.allowed, mutated) {
        (false, _) => AdmissionOutcome::Denied,
        (true, true) => AdmissionOutcome::Mutated,
        (true, false) => AdmissionOutcome::Skipped,
    };
    state.record(metric, started);

    Ok(response.into_review())
}

/// Check a Content-Type header value for `application/json`
fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

fn decode_request(body: &[u8]) -> Result<AdmissionRequest<DynamicObject>, String> {
    let review: AdmissionReview<DynamicObject> =
        serde_json::from_slice(body).map_err(|e| e.to_string())?;
    let request: AdmissionRequest<DynamicObject> = review
        .try_into()
        .map_err(|e: ConvertAdmissionReviewError| e.to_string())?;
    Ok(request)
}

/// Best-effort uid and `apiVersion` lookup in a body that failed to decode
fn salvage_identity(body: &[u8]) -> (String, String) {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return (String::new(), String::new());
    };
    let field = |pointer: &str| {
        value
            .pointer(pointer)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_default()
    };
    (field("/request/uid"), field("/apiVersion"))
}

/// Errors that can occur when running the webhook server
#[derive(Debug)]
pub enum WebhookError {
    /// TLS material is missing
    MissingCertificate(String),
    /// TLS configuration error
    TlsConfig(String),
    /// Server error
    Server(String),
}

impl std::fmt::Display for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookError::MissingCertificate(path) => {
                write!(f, "TLS file not found: {}", path)
            }
            WebhookError::TlsConfig(msg) => write!(f, "TLS configuration error: {}", msg),
            WebhookError::Server(msg) => write!(f, "Webhook server error: {}", msg),
        }
    }
}

impl std::error::Error for WebhookError {}

/// Check that both TLS files exist
pub fn check_certificates(cert_path: &Path, key_path: &Path) -> Result<(), WebhookError> {
    for path in [cert_path, key_path] {
        if !path.exists() {
            return Err(WebhookError::MissingCertificate(
                path.display().to_string(),
            ));
        }
    }
    Ok(())
}

/// Run the webhook server with TLS
///
/// Serves [`MUTATE_PATH`] on `addr` until `handle` is shut down. The health
/// state, when present, is marked ready once the socket is listening.
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    addr: SocketAddr,
    cert_path: &Path,
    key_path: &Path,
    handle: Handle,
) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;

    check_certificates(cert_path, key_path)?;

    let health_state = state.health_state.clone();
    let app = create_webhook_router(state);

    let config = RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    if let Some(health_state) = health_state {
        tokio::spawn(mark_ready_when_listening(handle.clone(), health_state));
    }

    info!(addr = %addr, "Starting webhook server with TLS");
    axum_server::bind_rustls(addr, config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}

/// Flip readiness once the listener is bound; a failed bind leaves it unset
async fn mark_ready_when_listening(handle: Handle, health_state: Arc<HealthState>) {
    if let Some(local) = handle.listening().await {
        info!(addr = %local, "Webhook server listening with TLS");
        health_state.set_ready(true).await;
    }
}

/// Stop accepting connections and let in-flight requests finish
pub fn shutdown_webhook_server(handle: &Handle, grace_period: Duration) {
    handle.graceful_shutdown(Some(grace_period));
}
