//! Single-instance daemon supervision
//!
//! Guarantees at most one serving instance per host: dynamic port
//! discovery, a PID file with a liveness probe, background daemonisation,
//! and signal-to-lifecycle translation.

mod daemonize;
mod liveness;
mod pidfile;
mod ports;
mod signals;

pub use daemonize::spawn_daemon;
pub use liveness::is_running;
pub use pidfile::PidRecord;
pub use ports::{bind, discover_port, DEFAULT_PORT_RANGE};
pub use signals::{spawn_listener, LifecycleSignal};

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;

/// The supervisor value threaded through the orchestrator. Owns the PID
/// file for this process; nothing else touches it.
pub struct SingletonSupervisor {
    pid_path: PathBuf,
    host: String,
    version: String,
}

impl SingletonSupervisor {
    pub fn new(pid_path: PathBuf, host: String, version: String) -> Self {
        Self {
            pid_path,
            host,
            version,
        }
    }

    pub fn pid_path(&self) -> &std::path::Path {
        &self.pid_path
    }

    /// Claim the singleton and bind a listener.
    ///
    /// Fails with an "already running" error when a live instance holds
    /// the PID file; a stale file is cleaned up and the claim proceeds.
    pub async fn acquire(&self, port: u16) -> Result<(TcpListener, u16)> {
        if let Some(running) = liveness::is_running(&self.pid_path)? {
            return Err(anyhow!(
                "modelscan is already running (pid {}, port {})",
                running.pid,
                running.port
            ));
        }

        let (listener, port) = ports::bind(&self.host, port).await?;
        info!("Listening on {}:{}", self.host, port);
        Ok((listener, port))
    }

    /// Publish this process in the PID file. Call after a successful
    /// listen.
    pub fn register(&self, port: u16) -> Result<()> {
        let record = PidRecord::for_current_process(&self.host, port, &self.version);
        pidfile::write(&self.pid_path, &record)
    }

    /// Remove the PID file on clean exit. Only removes our own record; a
    /// file overwritten by a newer instance is left alone.
    pub fn release(&self) -> Result<()> {
        if let Some(record) = pidfile::read(&self.pid_path)? {
            if record.pid == std::process::id() {
                pidfile::remove(&self.pid_path)?;
            }
        }
        Ok(())
    }

    /// Current liveness snapshot, for the `status` command.
    pub fn status(&self) -> Result<Option<PidRecord>> {
        liveness::is_running(&self.pid_path)
    }
}
