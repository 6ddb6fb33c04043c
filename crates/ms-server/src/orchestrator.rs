//! Lifecycle orchestration
//!
//! Builds the component graph from the store handle, owns the lifecycle
//! state machine, and runs the signal loop:
//! `Uninit → Initializing → Ready → Started → (Draining → Stopped)` with
//! a `Reloading` detour for SIGHUP.

use crate::admission::AdmissionPipeline;
use crate::http::build_app;
use crate::state::AppState;
use anyhow::Result;
use ms_clients::{ClientAuthenticator, LastSeenToucher};
use ms_config::Settings;
use ms_daemon::{LifecycleSignal, SingletonSupervisor};
use ms_events::EventBus;
use ms_keys::{KeyManager, KeyManagerConfig};
use ms_router::{ModelResolver, RateLimitEngine};
use ms_store::Store;
use ms_types::GatewayResult;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const DRAIN_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninit,
    Initializing,
    Ready,
    Started,
    Draining,
    Reloading,
    Stopped,
}

pub struct Orchestrator {
    settings: RwLock<Settings>,
    settings_path: PathBuf,
    state: RwLock<LifecycleState>,
    store: Store,
    bus: EventBus,
    supervisor: SingletonSupervisor,
    keys: Arc<KeyManager>,
    ratelimits: Arc<RateLimitEngine>,
    app_state: AppState,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    server_handle: Mutex<Option<JoinHandle<()>>>,
    sweeper_handles: Mutex<Vec<JoinHandle<()>>>,
    port: RwLock<Option<u16>>,
}

impl Orchestrator {
    /// Open the store and wire every component. Failure here leaves
    /// nothing behind: no PID file, no listeners, no tasks.
    pub fn initialize(
        settings: Settings,
        settings_path: PathBuf,
        db_path: &Path,
    ) -> GatewayResult<Self> {
        info!("Initializing orchestrator");

        let store = Store::open(db_path)?;
        let bus = EventBus::new();

        let keys = Arc::new(KeyManager::new(
            store.clone(),
            KeyManagerConfig {
                cache_ttl: Duration::from_secs(settings.ratelimit.cache_ttl_secs),
                degrade_duration: Duration::from_secs(settings.ratelimit.degrade_duration_secs),
            },
        ));
        keys.register_subscriptions(&bus);

        let ratelimits = Arc::new(RateLimitEngine::new(store.clone()));

        let toucher = LastSeenToucher::spawn(store.clone());
        let pipeline = Arc::new(AdmissionPipeline::new(
            ClientAuthenticator::new(store.clone(), toucher),
            ModelResolver::new(store.clone()),
            ratelimits.clone(),
            keys.clone(),
            store.clone(),
        ));
        let app_state = AppState::new(pipeline);

        let pid_path = settings.pid_path()?;
        let supervisor = SingletonSupervisor::new(
            pid_path,
            settings.server.host.clone(),
            env!("CARGO_PKG_VERSION").to_string(),
        );

        Ok(Self {
            settings: RwLock::new(settings),
            settings_path,
            state: RwLock::new(LifecycleState::Ready),
            store,
            bus,
            supervisor,
            keys,
            ratelimits,
            app_state,
            shutdown_tx: Mutex::new(None),
            server_handle: Mutex::new(None),
            sweeper_handles: Mutex::new(Vec::new()),
            port: RwLock::new(None),
        })
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    pub fn port(&self) -> Option<u16> {
        *self.port.read()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    pub fn app_state(&self) -> &AppState {
        &self.app_state
    }

    /// Warm the key caches from the store. Any failure is a warning; the
    /// gateway starts regardless and lazily fills caches on demand.
    pub fn bootstrap(&self) {
        match self.store.list_providers() {
            Ok(providers) => {
                for provider in providers {
                    match self.keys.warm(&provider.id) {
                        Ok(n) => info!("Warmed {} keys for {}", n, provider.id),
                        Err(e) => warn!("Key warm-up for {} failed: {}", provider.id, e),
                    }
                }
            }
            Err(e) => warn!("Provider warm-up skipped: {}", e),
        }
    }

    /// Claim the singleton, write the PID file, and start serving.
    pub async fn start(&self) -> Result<u16> {
        {
            let state = self.state.read();
            if *state != LifecycleState::Ready {
                anyhow::bail!("start called in state {:?}", *state);
            }
        }

        let configured_port = self.settings.read().server.port;
        let (listener, port) = self.supervisor.acquire(configured_port).await?;
        self.supervisor.register(port)?;

        let (tx, rx) = oneshot::channel::<()>();
        *self.shutdown_tx.lock() = Some(tx);

        let app = build_app(self.app_state.clone());
        let handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Admission server failed: {}", e);
            }
        });
        *self.server_handle.lock() = Some(handle);
        *self.port.write() = Some(port);

        self.spawn_sweepers();

        *self.state.write() = LifecycleState::Started;
        info!("Serving admission requests on port {}", port);
        Ok(port)
    }

    fn spawn_sweepers(&self) {
        let settings = self.settings.read();
        let (minute, daily) = self.ratelimits.spawn_sweepers(
            Duration::from_secs(settings.ratelimit.minute_window_secs),
            Duration::from_secs(settings.ratelimit.daily_window_secs),
        );
        let mut handles = self.sweeper_handles.lock();
        handles.push(minute);
        handles.push(daily);
    }

    fn abort_sweepers(&self) {
        for handle in self.sweeper_handles.lock().drain(..) {
            handle.abort();
        }
    }

    /// Re-read the settings file and apply the safe subset: log level,
    /// daemon paths, and window durations. Everything else needs a full
    /// restart and is reported, not applied. In-flight requests are
    /// untouched; key caches are re-read on next use.
    pub fn reload(&self) {
        *self.state.write() = LifecycleState::Reloading;

        match ms_config::load_from_path(&self.settings_path) {
            Ok(newer) => {
                let ignored = self.settings.write().apply_reloadable(&newer);
                if !ignored.is_empty() {
                    warn!(
                        "Reload ignored changed fields that need a restart: {}",
                        ignored.join(", ")
                    );
                }

                // Window durations may have changed; restart the sweepers
                self.abort_sweepers();
                self.spawn_sweepers();

                self.keys.invalidate_all();
                info!("Configuration reloaded");
            }
            Err(e) => error!("Reload failed, keeping running settings: {}", e),
        }

        *self.state.write() = LifecycleState::Started;
    }

    /// Stop accepting requests, drain in-flight work, then release the
    /// singleton.
    pub async fn stop(&self, timeout: Duration) {
        *self.state.write() = LifecycleState::Draining;
        info!("Draining (timeout {:?})", timeout);

        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }

        let deadline = tokio::time::Instant::now() + timeout;
        while self.app_state.inflight() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL).await;
        }
        if self.app_state.inflight() > 0 {
            warn!(
                "Drain timeout with {} requests still in flight",
                self.app_state.inflight()
            );
        }

        if let Some(handle) = self.server_handle.lock().take() {
            if tokio::time::timeout(Duration::from_secs(1), handle).await.is_err() {
                warn!("Admission server did not settle after drain");
            }
        }

        self.abort_sweepers();

        if let Err(e) = self.supervisor.release() {
            warn!("PID file release failed: {}", e);
        }

        *self.state.write() = LifecycleState::Stopped;
        info!("Stopped");
    }

    /// Signal loop: runs until shutdown and returns the process exit
    /// code.
    pub async fn run(&self, mut signals: mpsc::Receiver<LifecycleSignal>) -> i32 {
        while let Some(signal) = signals.recv().await {
            match signal {
                LifecycleSignal::Reload => self.reload(),
                LifecycleSignal::Shutdown => {
                    self.stop(DRAIN_TIMEOUT).await;
                    return 0;
                }
                LifecycleSignal::ForceExit => {
                    error!("Forced exit before drain completed");
                    return 1;
                }
            }
        }
        // Signal stream closed underneath us; treat as shutdown
        self.stop(DRAIN_TIMEOUT).await;
        0
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.abort_sweepers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_settings(dir: &std::path::Path) -> (Settings, PathBuf) {
        let mut settings = Settings::default();
        settings.daemon.pid_path = Some(dir.join("modelscan.pid"));
        let settings_path = dir.join("settings.yaml");
        ms_config::save_settings(&settings, &settings_path).unwrap();
        (settings, settings_path)
    }

    #[tokio::test]
    async fn test_initialize_reaches_ready() {
        let dir = tempdir().unwrap();
        let (settings, settings_path) = test_settings(dir.path());

        let orchestrator =
            Orchestrator::initialize(settings, settings_path, &dir.path().join("ms.db")).unwrap();
        assert_eq!(orchestrator.state(), LifecycleState::Ready);
        assert_eq!(orchestrator.port(), None);
    }

    #[tokio::test]
    async fn test_start_and_stop_cycle() {
        let dir = tempdir().unwrap();
        let (settings, settings_path) = test_settings(dir.path());
        let pid_path = settings.daemon.pid_path.clone().unwrap();

        let orchestrator =
            Orchestrator::initialize(settings, settings_path, &dir.path().join("ms.db")).unwrap();
        orchestrator.bootstrap();

        let port = orchestrator.start().await.unwrap();
        assert!(port >= ms_daemon::DEFAULT_PORT_RANGE.0);
        assert_eq!(orchestrator.state(), LifecycleState::Started);
        assert!(pid_path.exists());

        orchestrator.stop(Duration::from_secs(2)).await;
        assert_eq!(orchestrator.state(), LifecycleState::Stopped);
        assert!(!pid_path.exists());
    }

    #[tokio::test]
    async fn test_reload_returns_to_started() {
        let dir = tempdir().unwrap();
        let (settings, settings_path) = test_settings(dir.path());

        let orchestrator = Orchestrator::initialize(
            settings,
            settings_path.clone(),
            &dir.path().join("ms.db"),
        )
        .unwrap();
        orchestrator.start().await.unwrap();

        // Change a reloadable and a non-reloadable field on disk
        let mut newer = ms_config::load_from_path(&settings_path).unwrap();
        newer.log_level = "debug".to_string();
        newer.server.port = 9999;
        ms_config::save_settings(&newer, &settings_path).unwrap();

        orchestrator.reload();
        assert_eq!(orchestrator.state(), LifecycleState::Started);
        assert_eq!(orchestrator.settings.read().log_level, "debug");
        // The bind port keeps its running value
        assert_ne!(orchestrator.settings.read().server.port, 9999);

        orchestrator.stop(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let dir = tempdir().unwrap();
        let (settings, settings_path) = test_settings(dir.path());

        let orchestrator =
            Orchestrator::initialize(settings, settings_path, &dir.path().join("ms.db")).unwrap();
        orchestrator.start().await.unwrap();

        let err = orchestrator.start().await.unwrap_err();
        assert!(err.to_string().contains("start called in state"));

        orchestrator.stop(Duration::from_secs(2)).await;
    }
}
