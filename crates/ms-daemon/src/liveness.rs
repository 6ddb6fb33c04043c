//! Liveness probe against the PID file
//!
//! An instance counts as alive only when both its process exists and its
//! port answers a TCP dial quickly. Anything else is a stale PID file and
//! gets cleaned up on the spot.

use crate::pidfile::{self, PidRecord};
use anyhow::Result;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

const DIAL_TIMEOUT: Duration = Duration::from_millis(100);

/// Does the process named by `record` still exist? `kill(pid, 0)` probes
/// without delivering a signal; EPERM means the process is there but owned
/// by someone else, which still counts.
fn process_exists(pid: u32) -> bool {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn port_answers(host: &str, port: u16) -> bool {
    let addr: SocketAddr = match format!("{}:{}", host, port).parse() {
        Ok(a) => a,
        Err(_) => return false,
    };
    TcpStream::connect_timeout(&addr, DIAL_TIMEOUT).is_ok()
}

/// Check whether a live instance is registered at `pid_path`.
///
/// Returns the record when one is serving. A PID file whose process is
/// gone or whose port does not answer within 100 ms is treated as stale
/// and removed.
pub fn is_running(pid_path: &Path) -> Result<Option<PidRecord>> {
    let Some(record) = pidfile::read(pid_path).unwrap_or_else(|e| {
        warn!("Unreadable PID file at {:?}: {}", pid_path, e);
        None
    }) else {
        return Ok(None);
    };

    if process_exists(record.pid) && port_answers(&record.host, record.port) {
        debug!(
            "Instance alive: pid={} port={}",
            record.pid, record.port
        );
        return Ok(Some(record));
    }

    warn!(
        "Stale PID file at {:?} (pid={} port={}), removing",
        pid_path, record.pid, record.port
    );
    pidfile::remove(pid_path)?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_own_process_exists() {
        assert!(process_exists(std::process::id()));
    }

    #[test]
    fn test_dead_pid_is_stale() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("modelscan.pid");

        // PID from far outside the live range on any sane system
        let record = PidRecord {
            pid: u32::MAX - 7,
            port: 1,
            host: "127.0.0.1".into(),
            started_at: chrono::Utc::now(),
            version: "0.3.0".into(),
        };
        pidfile::write(&path, &record).unwrap();

        assert!(is_running(&path).unwrap().is_none());
        assert!(!path.exists(), "stale file must be removed");
    }

    #[test]
    fn test_live_pid_with_dead_port_is_stale() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("modelscan.pid");

        // Our own PID exists, but nothing listens on the port
        let record = PidRecord {
            pid: std::process::id(),
            port: 1,
            host: "127.0.0.1".into(),
            started_at: chrono::Utc::now(),
            version: "0.3.0".into(),
        };
        pidfile::write(&path, &record).unwrap();

        assert!(is_running(&path).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_live_pid_and_port_is_running() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("modelscan.pid");

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let record = PidRecord {
            pid: std::process::id(),
            port,
            host: "127.0.0.1".into(),
            started_at: chrono::Utc::now(),
            version: "0.3.0".into(),
        };
        pidfile::write(&path, &record).unwrap();

        let running = is_running(&path).unwrap().unwrap();
        assert_eq!(running.port, port);
        assert!(path.exists());
    }
}
