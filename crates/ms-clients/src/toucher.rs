//! Bounded last-seen updater
//!
//! A single worker drains a bounded queue of client ids and stamps their
//! last-seen time. The queue caps concurrency at one store write at a
//! time and drops touches on overload; a dropped or failed touch is only
//! ever log noise. The worker is detached from request lifetimes, so a
//! cancelled request does not cancel its touch, but each touch still runs
//! under its own deadline.

use ms_store::Store;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const QUEUE_CAPACITY: usize = 256;
const TOUCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle for enqueueing touches. Cheap to clone.
#[derive(Clone)]
pub struct LastSeenToucher {
    tx: mpsc::Sender<String>,
}

impl LastSeenToucher {
    /// Spawn the worker task and return the handle.
    pub fn spawn(store: Store) -> Self {
        let (tx, mut rx) = mpsc::channel::<String>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(client_id) = rx.recv().await {
                let store = store.clone();
                let id = client_id.clone();
                let touch =
                    tokio::task::spawn_blocking(move || store.touch_client_last_seen(&id));

                match tokio::time::timeout(TOUCH_TIMEOUT, touch).await {
                    Ok(Ok(Ok(()))) => debug!("Touched last-seen for {}", client_id),
                    Ok(Ok(Err(e))) => warn!("Last-seen touch failed for {}: {}", client_id, e),
                    Ok(Err(e)) => warn!("Last-seen touch panicked for {}: {}", client_id, e),
                    Err(_) => warn!(
                        "Last-seen touch for {} exceeded {:?}",
                        client_id, TOUCH_TIMEOUT
                    ),
                }
            }
        });

        Self { tx }
    }

    /// Enqueue a touch. Never blocks; on a full queue the touch is dropped
    /// and counted as noise.
    pub fn touch(&self, client_id: &str) {
        if self.tx.try_send(client_id.to_string()).is_err() {
            warn!("Last-seen queue full, dropping touch for {}", client_id);
        }
    }
}
