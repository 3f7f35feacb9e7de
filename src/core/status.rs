use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Readiness flag shared between the main HTTP service and the status probe.
///
/// Flipped once the gateway has built its session provider, forwarder and
/// routes from configuration. Cloning shares the same flag.
#[derive(Clone, Debug, Default)]
pub struct Readiness {
    ready: Arc<AtomicBool>,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the service as ready to accept traffic.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        log::info!("Routes and upstream loaded, service is ready");
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn reset(&self) {
        self.ready.store(false, Ordering::SeqCst);
        log::debug!("Readiness status reset");
    }
}
