//! Background daemonisation via re-exec
//!
//! The parent re-runs its own binary with a `--child` marker, the child
//! detaches into its own session and logs to a file, and the parent only
//! exits once the child has claimed the PID file.

use anyhow::{anyhow, Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;

const STARTUP_DEADLINE: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Re-exec the current binary as a detached daemon.
///
/// `child_args` is the full argument list for the child (the caller adds
/// its `--child` marker). stdout and stderr are appended to `log_path`.
/// Returns once the child has written `pid_path`, so the caller can print
/// the port and exit.
pub fn spawn_daemon(child_args: &[String], log_path: &Path, pid_path: &Path) -> Result<u32> {
    if let Some(parent) = log_path.parent() {
        ms_utils::paths::ensure_dir_exists(&parent.to_path_buf())
            .map_err(|e| anyhow!("{}", e))?;
    }

    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("open daemon log at {}", log_path.display()))?;
    let log_err = log.try_clone().context("clone daemon log handle")?;

    let exe = std::env::current_exe().context("locate own binary")?;

    let mut command = std::process::Command::new(exe);
    command
        .args(child_args)
        .stdin(std::process::Stdio::null())
        .stdout(log)
        .stderr(log_err);

    // Detach the child into its own session so terminal signals do not
    // reach it.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid()
                    .map(|_| ())
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
            });
        }
    }

    let child = command.spawn().context("spawn daemon child")?;
    let child_pid = child.id();
    info!("Spawned daemon child pid={}", child_pid);

    // The child writes the PID file after it starts listening; wait for it
    // so our exit code reflects whether startup worked.
    let deadline = Instant::now() + STARTUP_DEADLINE;
    while Instant::now() < deadline {
        if let Ok(Some(record)) = crate::pidfile::read(pid_path) {
            if record.pid == child_pid {
                return Ok(child_pid);
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    Err(anyhow!(
        "daemon child pid={} did not write {} within {:?}",
        child_pid,
        pid_path.display(),
        STARTUP_DEADLINE
    ))
}
