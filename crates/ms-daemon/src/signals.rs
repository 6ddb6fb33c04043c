//! Unix signal wiring
//!
//! Translates process signals into lifecycle commands: SIGINT/SIGTERM
//! start a graceful drain, SIGHUP reloads configuration, and a second
//! interrupt during the drain forces an immediate exit.

use tokio::sync::mpsc;
use tracing::{info, warn};

/// Lifecycle command derived from a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// SIGINT or SIGTERM: drain and stop
    Shutdown,
    /// SIGHUP: re-read configuration
    Reload,
    /// Second SIGINT/SIGTERM while draining: exit 1 now
    ForceExit,
}

/// Spawn the signal listener task. The returned receiver yields
/// `Shutdown` on the first interrupt, `ForceExit` on the second, and
/// `Reload` for every SIGHUP.
pub fn spawn_listener() -> mpsc::Receiver<LifecycleSignal> {
    let (tx, rx) = mpsc::channel(4);

    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to install SIGINT handler: {}", e);
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                return;
            }
        };
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to install SIGHUP handler: {}", e);
                return;
            }
        };

        let mut draining = false;
        loop {
            let event = tokio::select! {
                _ = sigint.recv() => {
                    if draining {
                        warn!("Second interrupt received, forcing exit");
                        LifecycleSignal::ForceExit
                    } else {
                        info!("Received SIGINT, initiating graceful shutdown");
                        draining = true;
                        LifecycleSignal::Shutdown
                    }
                }
                _ = sigterm.recv() => {
                    if draining {
                        warn!("Second termination signal, forcing exit");
                        LifecycleSignal::ForceExit
                    } else {
                        info!("Received SIGTERM, initiating graceful shutdown");
                        draining = true;
                        LifecycleSignal::Shutdown
                    }
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    LifecycleSignal::Reload
                }
            };

            if tx.send(event).await.is_err() {
                return;
            }
        }
    });

    rx
}
