//! HTTP admission surface
//!
//! Exposes exactly the admission decision contract; upstream protocol
//! translation lives in the proxy layer, not here. Every failure carries
//! a machine-readable `{error, message}` body, and 429 responses name the
//! offending dimension in `X-RateLimit-Type`.

use crate::admission::AdmissionRequest;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ms_types::{AdmissionDecision, GatewayError, UpstreamOutcome};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

pub const RATE_LIMIT_TYPE_HEADER: &str = "x-ratelimit-type";

#[derive(Debug, Deserialize)]
pub struct AdmitBody {
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteBody {
    pub decision: AdmissionDecision,
    #[serde(default)]
    pub request_tokens: u64,
    #[serde(default)]
    pub response_tokens: u64,
    #[serde(default)]
    pub latency_ms: u64,
    /// Upstream HTTP status observed by the proxy
    pub upstream_status: u16,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Response wrapper mapping the gateway taxonomy onto HTTP.
pub struct GatewayFailure(pub GatewayError);

fn status_for(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
        GatewayError::InvalidModel(_) => StatusCode::BAD_REQUEST,
        GatewayError::NoRouteToProvider => StatusCode::NOT_FOUND,
        GatewayError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        GatewayError::NoKeyAvailable => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::Conflict(_) => StatusCode::CONFLICT,
        GatewayError::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayFailure {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        // Taxonomy messages stay at provider granularity; a 503 body never
        // names an individual key.
        let body = ErrorBody {
            error: self.0.slug(),
            message: self.0.to_string(),
        };

        let mut response = (status, Json(body)).into_response();
        if let GatewayError::RateLimited(dim) = &self.0 {
            response.headers_mut().insert(
                RATE_LIMIT_TYPE_HEADER,
                HeaderValue::from_static(dim.as_str()),
            );
        }
        response
    }
}

fn bearer_token(request: &Request) -> String {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

async fn admit(State(state): State<AppState>, request: Request) -> Response {
    let _guard = state.track();
    let token = bearer_token(&request);

    let body = match axum::body::to_bytes(request.into_body(), 64 * 1024).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return GatewayFailure(GatewayError::InvalidModel(format!("unreadable body: {}", e)))
                .into_response()
        }
    };
    let body: AdmitBody = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(e) => {
            return GatewayFailure(GatewayError::InvalidModel(format!("bad request body: {}", e)))
                .into_response()
        }
    };

    let admission = AdmissionRequest {
        token,
        model: body.model,
        optional_auth: false,
    };

    match state.pipeline.admit(&admission) {
        Ok(decision) => (StatusCode::OK, Json(decision)).into_response(),
        Err(e) => GatewayFailure(e).into_response(),
    }
}

async fn complete(State(state): State<AppState>, Json(body): Json<CompleteBody>) -> Response {
    let _guard = state.track();

    let outcome = UpstreamOutcome::from_status(body.upstream_status);
    state.pipeline.complete(
        &body.decision,
        body.request_tokens,
        body.response_tokens,
        body.latency_ms,
        outcome,
    );

    StatusCode::NO_CONTENT.into_response()
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the admission router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/admissions", post(admit))
        .route("/v1/admissions/complete", post(complete))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
