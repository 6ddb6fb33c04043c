//! Admission serving and lifecycle orchestration
//!
//! Composes the store, authenticator, resolver, rate-limit engine, and
//! key manager into the request-admission pipeline, and owns the
//! start/reload/drain state machine around it.

mod admission;
mod http;
mod orchestrator;
mod state;

pub use admission::{AdmissionPipeline, AdmissionRequest};
pub use http::{build_app, GatewayFailure, RATE_LIMIT_TYPE_HEADER};
pub use orchestrator::{LifecycleState, Orchestrator};
pub use state::AppState;
