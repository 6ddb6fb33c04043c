//! Model name resolution
//!
//! Turns a request-time model name into an effective (model, provider
//! hint) pair: validation, one level of alias indirection, then the
//! client's priority-ordered remap rules.

use ms_store::Store;
use ms_types::{Client, GatewayError, GatewayResult};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static MODEL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/\-*]{0,254}$").expect("model name regex"));

/// Outcome of resolution. `provider_hint` is set only when a remap rule
/// named a provider; otherwise the caller picks one from key availability
/// and the client's provider priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub effective_model: String,
    pub provider_hint: Option<String>,
}

pub struct ModelResolver {
    store: Store,
}

impl ModelResolver {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Resolve `requested_model` for `client` (None = anonymous).
    ///
    /// Aliases may chain at most one level; a target that is itself an
    /// alias is a cycle or a misconfiguration and rejects the request.
    /// Remap rules are per-client, so anonymous requests skip them.
    pub fn resolve(
        &self,
        requested_model: &str,
        client: Option<&Client>,
    ) -> GatewayResult<Resolution> {
        validate_model_name(requested_model)?;

        let client_id = client.map(|c| c.id.as_str());

        let model = match self.store.lookup_alias(requested_model, client_id)? {
            None => requested_model.to_string(),
            Some(target) => {
                // One indirection is supported; a second hit means the
                // alias table loops or stacks.
                if self.store.lookup_alias(&target, client_id)?.is_some() {
                    return Err(GatewayError::InvalidModel(format!(
                        "alias chain behind {:?} is longer than one level",
                        requested_model
                    )));
                }
                debug!("Alias {} -> {}", requested_model, target);
                target
            }
        };

        if let Some(client_id) = client_id {
            if let Some(rule) = self.store.find_matching_remap(&model, client_id)? {
                debug!(
                    "Remap rule {} rewrites {} -> {} @ {}",
                    rule.id, model, rule.to_model, rule.to_provider
                );
                return Ok(Resolution {
                    effective_model: rule.to_model,
                    provider_hint: Some(rule.to_provider),
                });
            }
        }

        Ok(Resolution {
            effective_model: model,
            provider_hint: None,
        })
    }
}

fn validate_model_name(model: &str) -> GatewayResult<()> {
    if !MODEL_NAME.is_match(model) {
        return Err(GatewayError::InvalidModel(format!(
            "model name {:?} fails validation",
            model
        )));
    }
    if model.contains("..") {
        return Err(GatewayError::InvalidModel(format!(
            "model name {:?} contains a path traversal",
            model
        )));
    }
    Ok(())
}
