//! End-to-end admission pipeline tests against an in-memory store

use chrono::Utc;
use ms_clients::{ClientAuthenticator, LastSeenToucher};
use ms_keys::{KeyManager, KeyManagerConfig};
use ms_router::{ModelResolver, RateLimitEngine};
use ms_server::{build_app, AdmissionPipeline, AdmissionRequest, AppState, RATE_LIMIT_TYPE_HEADER};
use ms_store::Store;
use ms_types::{
    Alias, ApiKey, AuthMethod, Client, ClientConfig, GatewayError, Limits, Provider,
    ProviderStatus, RateLimitDimension, UpstreamOutcome,
};
use std::sync::Arc;

struct Harness {
    store: Store,
    keys: Arc<KeyManager>,
    pipeline: Arc<AdmissionPipeline>,
}

fn harness() -> Harness {
    let store = Store::open_in_memory().unwrap();
    let keys = Arc::new(KeyManager::new(store.clone(), KeyManagerConfig::default()));
    let pipeline = Arc::new(AdmissionPipeline::new(
        ClientAuthenticator::new(store.clone(), LastSeenToucher::spawn(store.clone())),
        ModelResolver::new(store.clone()),
        Arc::new(RateLimitEngine::new(store.clone())),
        keys.clone(),
        store.clone(),
    ));
    Harness {
        store,
        keys,
        pipeline,
    }
}

fn add_provider(store: &Store, id: &str) {
    store
        .create_provider(&Provider {
            id: id.to_string(),
            name: id.to_string(),
            base_url: format!("https://api.{}.com/v1", id),
            auth_method: AuthMethod::Bearer,
            auth_header_name: None,
            status: ProviderStatus::Online,
            created_at: Utc::now(),
        })
        .unwrap();
}

fn add_client(store: &Store, id: &str, limits: Option<Limits>) -> String {
    let token = ms_utils::crypto::generate_client_token().unwrap();
    store
        .create_client(&Client {
            id: id.to_string(),
            name: id.to_string(),
            version: "1.0.0".to_string(),
            token: token.clone(),
            capabilities: vec![],
            config: ClientConfig::default(),
            created_at: Utc::now(),
            last_seen_at: None,
        })
        .unwrap();
    if let Some(limits) = limits {
        store.upsert_client_rate_limit(id, limits).unwrap();
    }
    token
}

fn add_key(harness: &Harness, provider_id: &str, secret: &str) -> ApiKey {
    let hash = ms_utils::crypto::hash_key_secret(secret);
    let key = harness
        .store
        .create_api_key(
            provider_id,
            &hash,
            Some(&ms_utils::crypto::key_prefix(secret)),
            None,
            Limits::unlimited(),
        )
        .unwrap();
    harness.keys.install_secret(&hash, secret.to_string());
    key
}

fn admit_request(token: &str, model: &str) -> AdmissionRequest {
    AdmissionRequest {
        token: token.to_string(),
        model: model.to_string(),
        optional_auth: false,
    }
}

#[tokio::test]
async fn test_basic_allow_counts_usage() {
    let h = harness();
    add_provider(&h.store, "openai");
    let token = add_client(
        &h.store,
        "cli-1",
        Some(Limits {
            rpm: Some(10),
            tpm: None,
            daily: None,
        }),
    );
    let key = add_key(&h, "openai", "sk-live-1");

    let decision = h.pipeline.admit(&admit_request(&token, "gpt-4o")).unwrap();
    assert_eq!(decision.client_id.as_deref(), Some("cli-1"));
    assert_eq!(decision.model, "gpt-4o");
    assert_eq!(decision.provider_id, "openai");
    assert_eq!(decision.key_id, key.id);

    h.pipeline
        .complete(&decision, 100, 28, 900, UpstreamOutcome::Success);

    let stored_key = h.store.get_api_key(key.id).unwrap();
    assert_eq!(stored_key.requests_count, 1);
    assert_eq!(stored_key.tokens_count, 128);

    let row = h.store.get_client_rate_limit("cli-1").unwrap().unwrap();
    assert_eq!(row.current_rpm, 1);
    assert_eq!(row.current_tpm, 128);

    assert_eq!(h.store.usage_count().unwrap(), 1);
}

#[tokio::test]
async fn test_rpm_denial_leaves_counters_untouched() {
    let h = harness();
    add_provider(&h.store, "openai");
    let token = add_client(
        &h.store,
        "cli-1",
        Some(Limits {
            rpm: Some(2),
            tpm: None,
            daily: None,
        }),
    );
    add_key(&h, "openai", "sk-live-1");

    h.pipeline.admit(&admit_request(&token, "gpt-4o")).unwrap();
    h.pipeline.admit(&admit_request(&token, "gpt-4o")).unwrap();

    let err = h
        .pipeline
        .admit(&admit_request(&token, "gpt-4o"))
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::RateLimited(RateLimitDimension::Rpm)
    ));

    let row = h.store.get_client_rate_limit("cli-1").unwrap().unwrap();
    assert_eq!(row.current_rpm, 2);
    assert_eq!(row.current_daily, 2);
}

#[tokio::test]
async fn test_alias_then_remap_changes_provider() {
    let h = harness();
    add_provider(&h.store, "openai");
    add_provider(&h.store, "anthropic");
    let token = add_client(&h.store, "cli-1", None);
    add_key(&h, "openai", "sk-openai-1");
    add_key(&h, "anthropic", "sk-ant-1");

    h.store
        .upsert_alias(&Alias {
            name: "sonnet".into(),
            client_id: None,
            model_id: "claude-sonnet-4-5".into(),
        })
        .unwrap();
    h.store
        .create_remap_rule("cli-1", "claude-*", "gpt-4o", "openai", 10)
        .unwrap();

    let decision = h.pipeline.admit(&admit_request(&token, "sonnet")).unwrap();
    assert_eq!(decision.model, "gpt-4o");
    assert_eq!(decision.provider_id, "openai");
}

#[tokio::test]
async fn test_key_degradation_fails_over() {
    let h = harness();
    add_provider(&h.store, "openai");
    let token = add_client(&h.store, "cli-1", None);
    let k1 = add_key(&h, "openai", "sk-live-1");
    let k2 = add_key(&h, "openai", "sk-live-2");

    let first = h.pipeline.admit(&admit_request(&token, "gpt-4o")).unwrap();
    // Upstream said 401 with this key: the key is at fault
    h.pipeline
        .complete(&first, 0, 0, 120, UpstreamOutcome::KeyFault);

    // Every subsequent admission avoids the degraded key
    for _ in 0..3 {
        let decision = h.pipeline.admit(&admit_request(&token, "gpt-4o")).unwrap();
        let expected = if first.key_id == k1.id { k2.id } else { k1.id };
        assert_eq!(decision.key_id, expected);
    }

    let faulted = h.store.get_api_key(first.key_id).unwrap();
    assert!(faulted.degraded);
    assert!(faulted.degraded_until.unwrap() > Utc::now());
}

#[tokio::test]
async fn test_all_keys_degraded_is_service_unavailable() {
    let h = harness();
    add_provider(&h.store, "openai");
    let token = add_client(&h.store, "cli-1", None);
    let k1 = add_key(&h, "openai", "sk-live-1");

    h.keys
        .record_usage(k1.id, "openai", 0, UpstreamOutcome::KeyFault)
        .unwrap();

    let err = h
        .pipeline
        .admit(&admit_request(&token, "gpt-4o"))
        .unwrap_err();
    assert!(matches!(err, GatewayError::NoKeyAvailable));
}

#[tokio::test]
async fn test_no_providers_is_no_route() {
    let h = harness();
    let token = add_client(&h.store, "cli-1", None);

    let err = h
        .pipeline
        .admit(&admit_request(&token, "gpt-4o"))
        .unwrap_err();
    assert!(matches!(err, GatewayError::NoRouteToProvider));
}

#[tokio::test]
async fn test_provider_priority_orders_default_routing() {
    let h = harness();
    add_provider(&h.store, "openai");
    add_provider(&h.store, "anthropic");
    add_key(&h, "openai", "sk-openai-1");
    add_key(&h, "anthropic", "sk-ant-1");

    let token = ms_utils::crypto::generate_client_token().unwrap();
    h.store
        .create_client(&Client {
            id: "cli-1".into(),
            name: "c".into(),
            version: "1.0.0".into(),
            token: token.clone(),
            capabilities: vec![],
            config: ClientConfig {
                provider_priority: vec!["anthropic".into(), "openai".into()],
                ..ClientConfig::default()
            },
            created_at: Utc::now(),
            last_seen_at: None,
        })
        .unwrap();

    let decision = h
        .pipeline
        .admit(&admit_request(&token, "claude-sonnet-4-5"))
        .unwrap();
    assert_eq!(decision.provider_id, "anthropic");
}

#[tokio::test]
async fn test_secrets_lost_after_restart_block_provider() {
    let h = harness();
    add_provider(&h.store, "openai");
    let token = add_client(&h.store, "cli-1", None);
    add_key(&h, "openai", "sk-live-1");

    // Simulate a restart: a fresh key manager has an empty secret map
    let reborn = Arc::new(KeyManager::new(
        h.store.clone(),
        KeyManagerConfig::default(),
    ));
    let pipeline = AdmissionPipeline::new(
        ClientAuthenticator::new(h.store.clone(), LastSeenToucher::spawn(h.store.clone())),
        ModelResolver::new(h.store.clone()),
        Arc::new(RateLimitEngine::new(h.store.clone())),
        reborn.clone(),
        h.store.clone(),
    );

    let err = pipeline.admit(&admit_request(&token, "gpt-4o")).unwrap_err();
    assert!(matches!(err, GatewayError::NoKeyAvailable));

    // Re-entering the secret restores service
    reborn.install_secret(
        &ms_utils::crypto::hash_key_secret("sk-live-1"),
        "sk-live-1".to_string(),
    );
    reborn.invalidate("openai");
    pipeline.admit(&admit_request(&token, "gpt-4o")).unwrap();
}

#[tokio::test]
async fn test_concurrent_admissions_respect_the_limit() {
    let h = harness();
    add_provider(&h.store, "openai");
    let limit = 5u32;
    let token = add_client(
        &h.store,
        "cli-1",
        Some(Limits {
            rpm: Some(limit),
            tpm: None,
            daily: None,
        }),
    );
    add_key(&h, "openai", "sk-live-1");

    let mut handles = Vec::new();
    for _ in 0..20 {
        let pipeline = h.pipeline.clone();
        let token = token.clone();
        handles.push(std::thread::spawn(move || {
            pipeline.admit(&admit_request(&token, "gpt-4o")).is_ok()
        }));
    }

    let admitted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(admitted as u32, limit);
}

mod http_surface {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn app(h: &Harness) -> axum::Router {
        build_app(AppState::new(h.pipeline.clone()))
    }

    fn admit_http(token: &str, model: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/admissions")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(format!("{{\"model\": \"{}\"}}", model)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_token_is_401_with_body() {
        let h = harness();
        let request = Request::builder()
            .method("POST")
            .uri("/v1/admissions")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"model\": \"gpt-4o\"}"))
            .unwrap();

        let response = app(&h).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "unauthenticated");
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_invalid_model_is_400() {
        let h = harness();
        let token = add_client(&h.store, "cli-1", None);

        let response = app(&h)
            .oneshot(admit_http(&token, "a/../b"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rate_limited_429_names_the_dimension() {
        let h = harness();
        add_provider(&h.store, "openai");
        let token = add_client(
            &h.store,
            "cli-1",
            Some(Limits {
                rpm: Some(1),
                tpm: None,
                daily: None,
            }),
        );
        add_key(&h, "openai", "sk-live-1");

        let app = app(&h);
        let ok = app
            .clone()
            .oneshot(admit_http(&token, "gpt-4o"))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let denied = app.oneshot(admit_http(&token, "gpt-4o")).await.unwrap();
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            denied
                .headers()
                .get(RATE_LIMIT_TYPE_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("rpm")
        );
    }

    #[tokio::test]
    async fn test_no_key_is_503_and_names_no_key() {
        let h = harness();
        add_provider(&h.store, "openai");
        let token = add_client(&h.store, "cli-1", None);
        // Provider has a key on record but its secret is not in memory
        let hash = ms_utils::crypto::hash_key_secret("sk-live-1");
        h.store
            .create_api_key("openai", &hash, None, None, Limits::unlimited())
            .unwrap();

        let response = app(&h).oneshot(admit_http(&token, "gpt-4o")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "no_key_available");
        // The body never names individual keys
        assert!(!body["message"].as_str().unwrap().contains(&hash));
    }

    #[tokio::test]
    async fn test_completion_reports_usage() {
        let h = harness();
        add_provider(&h.store, "openai");
        let token = add_client(&h.store, "cli-1", None);
        let key = add_key(&h, "openai", "sk-live-1");

        let app = app(&h);
        let response = app
            .clone()
            .oneshot(admit_http(&token, "gpt-4o"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let decision: serde_json::Value = serde_json::from_slice(&body).unwrap();

        let complete = Request::builder()
            .method("POST")
            .uri("/v1/admissions/complete")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({
                    "decision": decision,
                    "request_tokens": 50,
                    "response_tokens": 10,
                    "latency_ms": 420,
                    "upstream_status": 200,
                })
                .to_string(),
            ))
            .unwrap();

        let response = app.oneshot(complete).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let stored = h.store.get_api_key(key.id).unwrap();
        assert_eq!(stored.requests_count, 1);
        assert_eq!(stored.tokens_count, 60);
        assert_eq!(h.store.usage_count().unwrap(), 1);
    }
}
