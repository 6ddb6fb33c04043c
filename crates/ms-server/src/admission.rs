//! The request admission pipeline
//!
//! Composes authentication, model resolution, quota admission, and key
//! selection, in that order; the first failing stage short-circuits.
//! The quota counter is not rolled back when key selection fails
//! afterwards: a request that was admitted counts against quota even if
//! it never leaves the gateway.

use chrono::Utc;
use ms_clients::{AuthOutcome, ClientAuthenticator};
use ms_keys::KeyManager;
use ms_router::{ModelResolver, RateLimitEngine};
use ms_store::Store;
use ms_types::{
    AdmissionDecision, GatewayError, GatewayResult, UpstreamOutcome, UsageRecord,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// What the front-end hands the pipeline per request.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    /// Bearer token; empty means anonymous
    pub token: String,
    pub model: String,
    /// Whether the route tolerates an absent token
    pub optional_auth: bool,
}

pub struct AdmissionPipeline {
    authenticator: ClientAuthenticator,
    resolver: ModelResolver,
    ratelimits: Arc<RateLimitEngine>,
    keys: Arc<KeyManager>,
    store: Store,
}

impl AdmissionPipeline {
    pub fn new(
        authenticator: ClientAuthenticator,
        resolver: ModelResolver,
        ratelimits: Arc<RateLimitEngine>,
        keys: Arc<KeyManager>,
        store: Store,
    ) -> Self {
        Self {
            authenticator,
            resolver,
            ratelimits,
            keys,
            store,
        }
    }

    /// Decide whether to accept the request and with which key.
    pub fn admit(&self, request: &AdmissionRequest) -> GatewayResult<AdmissionDecision> {
        let outcome = self
            .authenticator
            .authenticate(&request.token, request.optional_auth)?;
        let client = match outcome {
            AuthOutcome::Client(c) => Some(*c),
            AuthOutcome::Anonymous => None,
        };

        let resolution = self.resolver.resolve(&request.model, client.as_ref())?;

        self.ratelimits
            .admit(client.as_ref().map(|c| c.id.as_str()))?;

        let key = match &resolution.provider_hint {
            // A remap rule pinned the provider; its key troubles surface
            // as no-key-available.
            Some(provider_id) => self.keys.get_key(provider_id)?,
            None => self.pick_by_priority(client.as_ref())?,
        };

        debug!(
            "Admitted model={} provider={} key={}",
            resolution.effective_model, key.provider_id, key.id
        );

        Ok(AdmissionDecision {
            client_id: client.map(|c| c.id),
            model: resolution.effective_model,
            provider_id: key.provider_id.clone(),
            key_id: key.id,
            key_hash: key.key_hash,
        })
    }

    /// Default routing: walk the client's provider priority (or every
    /// registered provider) and take the first one with a usable key.
    /// Nothing routable at all is a routing failure, not a key outage.
    fn pick_by_priority(
        &self,
        client: Option<&ms_types::Client>,
    ) -> GatewayResult<ms_types::ApiKey> {
        let candidates: Vec<String> = match client {
            Some(c) if !c.config.provider_priority.is_empty() => {
                c.config.provider_priority.clone()
            }
            _ => self
                .store
                .list_providers()?
                .into_iter()
                .map(|p| p.id)
                .collect(),
        };

        if candidates.is_empty() {
            return Err(GatewayError::NoRouteToProvider);
        }

        // Providers that have keys but none usable right now mean a 503;
        // candidates with no keys registered at all mean there was never a
        // route.
        let mut saw_registered_keys = false;
        for provider_id in &candidates {
            match self.keys.get_key(provider_id) {
                Ok(key) => return Ok(key),
                Err(GatewayError::NoKeyAvailable) => {
                    if !saw_registered_keys {
                        saw_registered_keys = !self
                            .store
                            .list_active_api_keys(provider_id)?
                            .is_empty();
                    }
                }
                Err(e) => return Err(e),
            }
        }

        if saw_registered_keys {
            Err(GatewayError::NoKeyAvailable)
        } else {
            Err(GatewayError::NoRouteToProvider)
        }
    }

    /// Post-response accounting: client token budget (best-effort), key
    /// usage or degradation, and the usage log.
    pub fn complete(
        &self,
        decision: &AdmissionDecision,
        request_tokens: u64,
        response_tokens: u64,
        latency_ms: u64,
        outcome: UpstreamOutcome,
    ) {
        let total = request_tokens + response_tokens;

        self.ratelimits
            .record_tokens(decision.client_id.as_deref(), total);

        if let Err(e) =
            self.keys
                .record_usage(decision.key_id, &decision.provider_id, total, outcome)
        {
            warn!("Key usage recording failed for {}: {}", decision.key_id, e);
        }

        let record = UsageRecord {
            ts: Utc::now(),
            client_id: decision.client_id.clone(),
            provider_id: decision.provider_id.clone(),
            key_id: decision.key_id,
            model_id: decision.model.clone(),
            request_tokens,
            response_tokens,
            latency_ms,
            success: outcome == UpstreamOutcome::Success,
        };
        if let Err(e) = self.store.append_usage(&record) {
            warn!("Usage log append failed: {}", e);
        }
    }
}
