//! In-process lifecycle event bus
//!
//! Synchronous publish/subscribe for wiring state changes (key created,
//! provider validated) to in-memory caches. Subscribers run in
//! registration order on the publisher's thread; one failing subscriber is
//! logged and does not stop delivery to the rest. There is no buffering
//! and no back-pressure, so producers must not publish from hot paths.
//!
//! The subscriber table is filled during wiring, before traffic starts,
//! and is effectively immutable afterwards; dispatch only ever takes a
//! read lock.

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

/// Lifecycle events published on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A provider SDK finished generating (external agent)
    SdkGenerated { provider_id: String },
    /// The discovery agent found a new provider
    ProviderDiscovered { provider_id: String },
    /// A validation probe settled a provider's reachability
    ProviderValidated { provider_id: String, validated: bool },
    /// A key was created, deleted, or had its flags changed
    KeyChanged { provider_id: String },
    /// A client was created, deleted, or reconfigured
    ClientChanged { client_id: String },
}

impl Event {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::SdkGenerated { .. } => "sdk_generated",
            Event::ProviderDiscovered { .. } => "provider_discovered",
            Event::ProviderValidated { .. } => "provider_validated",
            Event::KeyChanged { .. } => "key_changed",
            Event::ClientChanged { .. } => "client_changed",
        }
    }
}

type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

/// The bus. Cheap to clone; all clones share one subscriber table.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<(String, Subscriber)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber under a name used in error logs. Must happen
    /// during wiring, before any publisher is running.
    pub fn subscribe(&self, name: impl Into<String>, f: impl Fn(&Event) + Send + Sync + 'static) {
        self.subscribers.write().push((name.into(), Arc::new(f)));
    }

    /// Deliver `event` to every subscriber in registration order. A
    /// panicking subscriber is logged and skipped.
    pub fn publish(&self, event: &Event) {
        let subscribers = self.subscribers.read();
        for (name, subscriber) in subscribers.iter() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| subscriber(event))) {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(
                    "Event subscriber {:?} failed on {}: {}",
                    name,
                    event.kind(),
                    msg
                );
            }
        }
        if subscribers.is_empty() {
            warn!("Event {} published with no subscribers", event.kind());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_subscribers_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = order.clone();
            bus.subscribe(label, move |_| order.lock().push(label));
        }

        bus.publish(&Event::KeyChanged {
            provider_id: "openai".into(),
        });

        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_panicking_subscriber_does_not_abort_delivery() {
        let bus = EventBus::new();
        let delivered = Arc::new(Mutex::new(0u32));

        bus.subscribe("boom", |_| panic!("subscriber blew up"));
        {
            let delivered = delivered.clone();
            bus.subscribe("counter", move |_| *delivered.lock() += 1);
        }

        bus.publish(&Event::ClientChanged {
            client_id: "cli-1".into(),
        });

        assert_eq!(*delivered.lock(), 1);
    }

    #[test]
    fn test_payload_reaches_subscriber() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        {
            let seen = seen.clone();
            bus.subscribe("capture", move |event| {
                *seen.lock() = Some(event.clone());
            });
        }

        let event = Event::ProviderValidated {
            provider_id: "anthropic".into(),
            validated: true,
        };
        bus.publish(&event);

        assert_eq!(seen.lock().clone(), Some(event));
    }
}
