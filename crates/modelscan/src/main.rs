mod cli;

use anyhow::{Context, Result};
use cli::{Cli, Command};
use ms_config::Settings;
use ms_server::Orchestrator;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(settings: &Settings) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("modelscan={}", settings.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    let settings = ms_config::load().map_err(|e| anyhow::anyhow!("{}", e))?;
    init_tracing(&settings);

    match cli.command {
        Command::Start { foreground, child } => {
            if foreground || child {
                run_server(settings).await
            } else {
                start_daemon(settings)
            }
        }
        Command::Stop => stop_daemon(settings),
        Command::Status => print_status(settings),
        Command::Reload => reload_daemon(settings),
    }
}

/// Run the gateway in this process until a shutdown signal lands.
async fn run_server(settings: Settings) -> Result<()> {
    let settings_path = ms_utils::paths::settings_file().map_err(|e| anyhow::anyhow!("{}", e))?;
    let db_path = ms_utils::paths::database_file().map_err(|e| anyhow::anyhow!("{}", e))?;

    let orchestrator = Orchestrator::initialize(settings, settings_path, &db_path)
        .map_err(|e| anyhow::anyhow!("initialization failed: {}", e))?;
    orchestrator.bootstrap();

    let port = orchestrator.start().await?;
    info!("ModelScan listening on port {}", port);

    let signals = ms_daemon::spawn_listener();
    let exit_code = orchestrator.run(signals).await;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Detach a daemon child, then report where it ended up listening.
fn start_daemon(settings: Settings) -> Result<()> {
    let pid_path = settings.pid_path().map_err(|e| anyhow::anyhow!("{}", e))?;
    let log_path = settings.log_path().map_err(|e| anyhow::anyhow!("{}", e))?;

    if let Some(running) = ms_daemon::is_running(&pid_path)? {
        anyhow::bail!(
            "modelscan is already running (pid {}, port {})",
            running.pid,
            running.port
        );
    }

    let args = vec!["start".to_string(), "--child".to_string()];
    let pid = ms_daemon::spawn_daemon(&args, &log_path, &pid_path)?;

    let record = ms_daemon::is_running(&pid_path)?
        .context("daemon started but did not register in the PID file")?;
    println!(
        "Started modelscan: pid {} listening on {}:{} (log: {})",
        pid,
        record.host,
        record.port,
        log_path.display()
    );
    Ok(())
}

fn stop_daemon(settings: Settings) -> Result<()> {
    let pid_path = settings.pid_path().map_err(|e| anyhow::anyhow!("{}", e))?;

    let Some(running) = ms_daemon::is_running(&pid_path)? else {
        println!("modelscan is not running");
        return Ok(());
    };

    kill(Pid::from_raw(running.pid as i32), Signal::SIGTERM)
        .with_context(|| format!("signal pid {}", running.pid))?;

    // Give the drain a generous window before declaring failure
    let deadline = Instant::now() + Duration::from_secs(35);
    while Instant::now() < deadline {
        if !pid_path.exists() {
            println!("Stopped modelscan (pid {})", running.pid);
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    anyhow::bail!(
        "modelscan (pid {}) did not stop within the drain window",
        running.pid
    )
}

fn print_status(settings: Settings) -> Result<()> {
    let pid_path = settings.pid_path().map_err(|e| anyhow::anyhow!("{}", e))?;

    match ms_daemon::is_running(&pid_path)? {
        Some(record) => {
            println!(
                "modelscan is running: pid {} on {}:{} (version {}, started {})",
                record.pid,
                record.host,
                record.port,
                record.version,
                record.started_at.to_rfc3339()
            );
        }
        None => println!("modelscan is not running"),
    }
    Ok(())
}

fn reload_daemon(settings: Settings) -> Result<()> {
    let pid_path = settings.pid_path().map_err(|e| anyhow::anyhow!("{}", e))?;

    let Some(running) = ms_daemon::is_running(&pid_path)? else {
        anyhow::bail!("modelscan is not running");
    };

    kill(Pid::from_raw(running.pid as i32), Signal::SIGHUP)
        .with_context(|| format!("signal pid {}", running.pid))?;
    println!("Sent reload to modelscan (pid {})", running.pid);
    Ok(())
}
