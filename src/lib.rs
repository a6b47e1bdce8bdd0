//! nodeselector-webhook library crate
//!
//! A mutating admission webhook that assigns `spec.nodeSelector` to new pods
//! based on the namespace they are created in.

pub mod config;
pub mod health;
pub mod mutation;
pub mod webhooks;

pub use config::{ConfigError, RuleConfig};
pub use health::HealthState;
pub use mutation::{AdmissionAttributes, Decision, MutationContext, MutationError, decide};
pub use webhooks::{WebhookError, WebhookState, run_webhook_server};
