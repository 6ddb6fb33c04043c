//! One-shot key validation probe
//!
//! A single authentication-only upstream call (a models-list request)
//! that settles whether a key actually works. Never counted against any
//! client's quota. Admin surfaces use it directly; bootstrap uses it to
//! revive keys whose cooldown has passed but whose true status is
//! unknown.

use crate::manager::KeyManager;
use ms_events::{Event, EventBus};
use ms_types::{AuthMethod, GatewayResult, ProviderStatus};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// What a probe learned about a key.
#[derive(Debug, Clone, Serialize)]
pub struct KeyProbeResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models_accessible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl KeyProbeResult {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            rate_limit_remaining: None,
            models_accessible: None,
            error: Some(error.into()),
        }
    }
}

impl KeyManager {
    /// Probe `key_id` against its provider's models endpoint.
    ///
    /// A passing probe on a key whose cooldown already elapsed clears the
    /// degraded flag; the provider's status is updated either way and a
    /// validation event is published for cache coherency.
    pub async fn test_key(&self, key_id: i64, bus: &EventBus) -> GatewayResult<KeyProbeResult> {
        let key = self.store().get_api_key(key_id)?;
        let provider = self.store().get_provider(&key.provider_id)?;

        let Some(secret) = self.secret_for(&key.key_hash) else {
            return Ok(KeyProbeResult::failed(
                "plaintext secret not in memory; re-enter the key",
            ));
        };

        let url = format!("{}/models", provider.base_url.trim_end_matches('/'));
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| ms_types::GatewayError::Transient(format!("probe client: {}", e)))?;

        let request = match provider.auth_method {
            AuthMethod::Bearer => client.get(&url).bearer_auth(&secret),
            AuthMethod::Header => {
                let header = provider.auth_header_name.as_deref().unwrap_or("x-api-key");
                client.get(&url).header(header, &secret)
            }
            AuthMethod::Query => client.get(&url).query(&[("key", secret.as_str())]),
        };

        let result = match request.send().await {
            Ok(response) => {
                let status = response.status();
                let remaining = response
                    .headers()
                    .get("x-ratelimit-remaining-requests")
                    .or_else(|| response.headers().get("x-ratelimit-remaining"))
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());

                if status.is_success() {
                    KeyProbeResult {
                        valid: true,
                        rate_limit_remaining: remaining,
                        models_accessible: Some(true),
                        error: None,
                    }
                } else {
                    KeyProbeResult {
                        valid: false,
                        rate_limit_remaining: remaining,
                        models_accessible: Some(false),
                        error: Some(format!("upstream returned {}", status)),
                    }
                }
            }
            Err(e) => KeyProbeResult::failed(format!("probe request failed: {}", e)),
        };

        if result.valid {
            info!("Key {} validated against {}", key_id, provider.id);
            if key.degraded && !key.currently_degraded(chrono::Utc::now()) {
                self.store().clear_key_degraded(key_id)?;
            }
            self.store()
                .update_provider_status(&provider.id, ProviderStatus::Online)?;
        } else {
            warn!(
                "Key {} failed validation against {}: {:?}",
                key_id, provider.id, result.error
            );
            self.store()
                .update_provider_status(&provider.id, ProviderStatus::Offline)?;
        }

        bus.publish(&Event::ProviderValidated {
            provider_id: provider.id.clone(),
            validated: result.valid,
        });

        Ok(result)
    }
}
