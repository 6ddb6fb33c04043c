//! Shared state for the admission surface

use crate::admission::AdmissionPipeline;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// State threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AdmissionPipeline>,
    inflight: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(pipeline: Arc<AdmissionPipeline>) -> Self {
        Self {
            pipeline,
            inflight: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of requests currently inside a handler. The drain loop
    /// watches this to know when in-flight work has finished.
    pub fn inflight(&self) -> u64 {
        self.inflight.load(Ordering::SeqCst)
    }

    /// RAII guard counting one in-flight request.
    pub fn track(&self) -> InFlightGuard {
        self.inflight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            inflight: self.inflight.clone(),
        }
    }
}

pub struct InFlightGuard {
    inflight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}
