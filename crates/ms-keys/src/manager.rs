//! Key selection and health tracking
//!
//! Owns the per-provider hot list (a TTL-bounded projection of active
//! keys) and the plaintext secret map. Selection filters for healthy,
//! within-budget keys that have a usable secret, then picks the least
//! recently used. The read-filter-select-mark step runs under a
//! per-provider lock so concurrent requests rotate keys instead of piling
//! onto one.

use crate::secrets::SecretMap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ms_events::{Event, EventBus};
use ms_store::Store;
use ms_types::{ApiKey, GatewayError, GatewayResult, UpstreamOutcome};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct KeyManagerConfig {
    /// How long a provider's hot list may serve without a re-read
    pub cache_ttl: Duration,
    /// Cooldown applied when an upstream failure is the key's fault
    pub degrade_duration: Duration,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            degrade_duration: Duration::from_secs(900),
        }
    }
}

struct HotList {
    keys: Vec<ApiKey>,
    fetched_at: Instant,
}

pub struct KeyManager {
    store: Store,
    secrets: SecretMap,
    config: KeyManagerConfig,
    hot: DashMap<String, Arc<Mutex<Option<HotList>>>>,
}

impl KeyManager {
    pub fn new(store: Store, config: KeyManagerConfig) -> Self {
        Self {
            store,
            secrets: SecretMap::new(),
            config,
            hot: DashMap::new(),
        }
    }

    /// Wire cache invalidation to the event bus. Key and provider changes
    /// drop the affected hot list; stale reads in between are bounded by
    /// the cache TTL.
    pub fn register_subscriptions(self: &Arc<Self>, bus: &EventBus) {
        let manager = self.clone();
        bus.subscribe("key-manager", move |event| match event {
            Event::KeyChanged { provider_id }
            | Event::ProviderValidated { provider_id, .. } => {
                manager.invalidate(provider_id);
            }
            _ => {}
        });
    }

    /// Remember the plaintext for a key. Called on key creation and on
    /// explicit re-entry after a restart.
    pub fn install_secret(&self, key_hash: &str, secret: String) {
        self.secrets.install(key_hash, secret);
    }

    /// Drop the plaintext for a deleted key.
    pub fn forget_secret(&self, key_hash: &str) {
        self.secrets.forget(key_hash);
    }

    pub fn has_secret(&self, key_hash: &str) -> bool {
        self.secrets.contains(key_hash)
    }

    pub(crate) fn secret_for(&self, key_hash: &str) -> Option<String> {
        self.secrets.get(key_hash)
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn degrade_duration(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.degrade_duration)
            .unwrap_or_else(|_| chrono::Duration::minutes(15))
    }

    /// Drop the cached list for a provider.
    pub fn invalidate(&self, provider_id: &str) {
        if self.hot.remove(provider_id).is_some() {
            debug!("Invalidated key cache for {}", provider_id);
        }
    }

    /// Drop every cached list. Used on reload so the next selection
    /// re-reads the store.
    pub fn invalidate_all(&self) {
        self.hot.clear();
        debug!("Invalidated all key caches");
    }

    /// Warm the cache for a provider. Failures are the caller's to log;
    /// bootstrap treats them as warnings.
    pub fn warm(&self, provider_id: &str) -> GatewayResult<usize> {
        let slot = self.slot(provider_id);
        let mut guard = slot.lock();
        let list = self.refresh(provider_id)?;
        let count = list.keys.len();
        *guard = Some(list);
        Ok(count)
    }

    /// Pick one active, non-degraded, within-budget key for the provider.
    ///
    /// Keys whose plaintext secret is not in memory cannot be used
    /// upstream and are skipped; after a restart that can mean a provider
    /// with persisted keys still yields no key until secrets are
    /// re-entered.
    pub fn get_key(&self, provider_id: &str) -> GatewayResult<ApiKey> {
        let now = Utc::now();
        let slot = self.slot(provider_id);
        let mut guard = slot.lock();

        let stale = match guard.as_ref() {
            Some(list) => list.fetched_at.elapsed() > self.config.cache_ttl,
            None => true,
        };
        if stale {
            *guard = Some(self.refresh(provider_id)?);
        }
        let list = guard.as_mut().expect("hot list populated above");

        // Lazily recover keys whose cooldown has passed
        for key in list.keys.iter_mut() {
            if key.degraded && !key.currently_degraded(now) {
                info!("Key {} cooldown elapsed, recovering", key.id);
                if let Err(e) = self.store.clear_key_degraded(key.id) {
                    warn!("Failed to clear degraded flag on key {}: {}", key.id, e);
                } else {
                    key.degraded = false;
                    key.degraded_until = None;
                }
            }
        }

        let mut candidates: Vec<&mut ApiKey> = list
            .keys
            .iter_mut()
            .filter(|k| k.active && !k.currently_degraded(now))
            .filter(|k| within_budget(k, now))
            .collect();
        candidates.retain(|k| self.secrets.contains(&k.key_hash));

        // Least recently used first; never-used keys sort ahead of any
        // used key, ties by fewest requests
        candidates.sort_by_key(|k| (k.last_used_at, k.requests_count));

        match candidates.into_iter().next() {
            Some(key) => {
                // Mark in-cache so a concurrent caller moves to the next
                // key even before usage is recorded
                key.last_used_at = Some(now);
                Ok(key.clone())
            }
            None => Err(GatewayError::NoKeyAvailable),
        }
    }

    /// Record the outcome of an upstream call made with `key_id`.
    ///
    /// Success and non-key failures bump usage; a key-fault (401/403/429
    /// or quota exhausted upstream) degrades the key for the configured
    /// cooldown and ejects it from the hot list.
    pub fn record_usage(
        &self,
        key_id: i64,
        provider_id: &str,
        tokens: u64,
        outcome: UpstreamOutcome,
    ) -> GatewayResult<()> {
        match outcome {
            UpstreamOutcome::Success | UpstreamOutcome::Failure => {
                self.store.increment_key_usage(key_id, tokens)?;
                self.apply_to_cached(provider_id, key_id, |key| {
                    key.requests_count += 1;
                    key.tokens_count += tokens;
                    key.last_used_at = Some(Utc::now());
                });
            }
            UpstreamOutcome::KeyFault => {
                let until = Utc::now() + self.degrade_duration();
                warn!(
                    "Key {} of {} reported a key-fault, degrading until {}",
                    key_id, provider_id, until
                );
                self.store.mark_key_degraded(key_id, until)?;
                self.apply_to_cached(provider_id, key_id, |key| {
                    key.degraded = true;
                    key.degraded_until = Some(until);
                });
            }
        }
        Ok(())
    }

    /// Manually return a degraded key to service.
    pub fn reset_key(&self, key_id: i64, provider_id: &str) -> GatewayResult<()> {
        self.store.clear_key_degraded(key_id)?;
        self.invalidate(provider_id);
        Ok(())
    }

    fn slot(&self, provider_id: &str) -> Arc<Mutex<Option<HotList>>> {
        self.hot
            .entry(provider_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    fn refresh(&self, provider_id: &str) -> GatewayResult<HotList> {
        let keys = self.store.list_active_api_keys(provider_id)?;
        debug!("Refreshed {} keys for {}", keys.len(), provider_id);
        Ok(HotList {
            keys,
            fetched_at: Instant::now(),
        })
    }

    fn apply_to_cached(&self, provider_id: &str, key_id: i64, f: impl FnOnce(&mut ApiKey)) {
        if let Some(slot) = self.hot.get(provider_id) {
            let mut guard = slot.lock();
            if let Some(list) = guard.as_mut() {
                if let Some(key) = list.keys.iter_mut().find(|k| k.id == key_id) {
                    f(key);
                }
            }
        }
    }
}

/// Is the key inside its own window budget? The window is named by
/// `reset_interval` (minute, hour, or day; minute when unset). Counters
/// whose window has lapsed count as zero; the row itself is reset by
/// `reset_key_limits` out of band.
fn within_budget(key: &ApiKey, now: DateTime<Utc>) -> bool {
    if key.limits.is_unlimited() {
        return true;
    }
    if key_window_expired(key, now) {
        return true;
    }

    if let Some(rpm) = key.limits.rpm {
        if key.requests_count >= rpm as u64 {
            return false;
        }
    }
    if let Some(tpm) = key.limits.tpm {
        if key.tokens_count >= tpm {
            return false;
        }
    }
    if let Some(daily) = key.limits.daily {
        if key.requests_count >= daily as u64 {
            return false;
        }
    }
    true
}

fn key_window_expired(key: &ApiKey, now: DateTime<Utc>) -> bool {
    let last = key.last_reset;
    match key.reset_interval.as_deref() {
        Some("hour") => now.timestamp() / 3600 > last.timestamp() / 3600,
        Some("day") | Some("daily") => now.date_naive() > last.date_naive(),
        _ => now.timestamp() / 60 > last.timestamp() / 60,
    }
}
