use std::sync::Arc;

/// Pingable dependency. `is_enabled` lets optional dependencies (the broker)
/// opt out of the liveness equation when they are turned off.
#[async_trait::async_trait]
pub trait Monitored: Send + Sync {
    async fn ping(&self) -> bool;
    fn is_enabled(&self) -> bool;
}

/// Aggregates dependency pings for the liveness endpoint: healthy iff the
/// store answers AND the broker is either disabled or answers too.
#[derive(Clone)]
pub struct HealthChecker {
    store: Arc<dyn Monitored>,
    broker: Arc<dyn Monitored>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn Monitored>, broker: Arc<dyn Monitored>) -> Self {
        Self { store, broker }
    }

    pub async fn check(&self) -> bool {
        self.store.ping().await && (!self.broker.is_enabled() || self.broker.ping().await)
    }
}
