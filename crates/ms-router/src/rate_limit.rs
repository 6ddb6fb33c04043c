//! Client rate limiting
//!
//! Thin engine over the store's atomic check-and-increment. Admission
//! costs one request against the rpm and daily windows; tokens are
//! recorded after the response. The background sweepers only keep rows
//! tidy, the lazy reset inside the store primitive is what correctness
//! rests on.

use ms_store::Store;
use ms_types::{GatewayError, GatewayResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub struct RateLimitEngine {
    store: Store,
}

impl RateLimitEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Admit one request for `client_id`, or say which dimension denied
    /// it. Anonymous requests are not rate limited.
    pub fn admit(&self, client_id: Option<&str>) -> GatewayResult<()> {
        let Some(client_id) = client_id else {
            return Ok(());
        };

        let (allowed, dim) = self.store.check_and_increment_ratelimit(client_id, 1, 0)?;
        if allowed {
            return Ok(());
        }

        // The primitive always names the dimension on denial
        let dim = dim.ok_or_else(|| {
            GatewayError::Corrupt("rate limit denial without a dimension".to_string())
        })?;
        debug!("Rate limited {} on {}", client_id, dim);
        Err(GatewayError::RateLimited(dim))
    }

    /// Post-response token accounting. Best-effort: a failed write means
    /// the client got tokens for free this window, which is accepted and
    /// logged.
    pub fn record_tokens(&self, client_id: Option<&str>, tokens: u64) {
        let Some(client_id) = client_id else {
            return;
        };
        if tokens == 0 {
            return;
        }
        if let Err(e) = self.store.record_client_tokens(client_id, tokens) {
            warn!("Token accounting for {} lost {}: {}", client_id, tokens, e);
        }
    }

    /// Start the cosmetic window sweepers. Returned handles are aborted on
    /// shutdown.
    pub fn spawn_sweepers(
        self: &Arc<Self>,
        minute_period: Duration,
        daily_period: Duration,
    ) -> (JoinHandle<()>, JoinHandle<()>) {
        let minute_engine = self.clone();
        let minute = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(minute_period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match minute_engine.store.reset_minute_counters() {
                    Ok(0) => {}
                    Ok(n) => debug!("Minute sweep reset {} rate-limit rows", n),
                    Err(e) => error!("Minute sweep failed: {}", e),
                }
            }
        });

        let daily_engine = self.clone();
        let daily = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(daily_period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match daily_engine.store.reset_daily_counters() {
                    Ok(0) => {}
                    Ok(n) => debug!("Daily sweep reset {} rate-limit rows", n),
                    Err(e) => error!("Daily sweep failed: {}", e),
                }
            }
        });

        (minute, daily)
    }
}
