//! Webhook module for mutating admission requests.
//!
//! - `server`: TLS HTTP endpoint, request decoding and transport checks
//! - `response`: turns pipeline outcomes into admission responses

pub mod response;
mod server;

pub use response::{DENIAL_CODE, assemble, assemble_decode_failure, assemble_for};
pub use server::{
    MUTATE_PATH, TransportError, WebhookError, WebhookState, check_certificates,
    create_webhook_router, review_admission, run_webhook_server, shutdown_webhook_server,
};
