//! Shared application state wired into every handler.

use std::sync::Arc;

use herald_core::{storage::Storage, Clock};
use herald_delivery::{
    storage::PostgresDeliveryStore, DeliveryWorker, GatewaySendProvider, SendProvider,
};
use herald_scheduler::{PostgresSchedulerStore, Scheduler};

use crate::config::Config;

/// Everything a handler needs: storage for status queries, the worker and
/// scheduler facades, and the trigger token.
#[derive(Clone)]
pub struct AppState {
    /// Repository container, used directly for cheap status queries.
    pub storage: Arc<Storage>,

    /// Campaign delivery worker.
    pub worker: Arc<DeliveryWorker>,

    /// Sweep scheduler.
    pub scheduler: Arc<Scheduler>,

    /// Shared secret for the trigger endpoints; `None` leaves them open.
    pub scheduler_token: Option<String>,
}

impl AppState {
    /// Wires production components from configuration.
    pub fn new(storage: Arc<Storage>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        let provider: Arc<dyn SendProvider> = Arc::new(GatewaySendProvider::new(
            reqwest::Client::new(),
            config.gateway_url.clone(),
        ));
        Self::with_provider(storage, clock, provider, config)
    }

    /// Wires components with an explicit provider; tests inject a scripted
    /// one here.
    pub fn with_provider(
        storage: Arc<Storage>,
        clock: Arc<dyn Clock>,
        provider: Arc<dyn SendProvider>,
        config: &Config,
    ) -> Self {
        let worker = DeliveryWorker::new(
            Arc::new(PostgresDeliveryStore::new(storage.clone())),
            provider,
            clock.clone(),
            config.to_worker_config(),
        );
        let scheduler =
            Scheduler::new(Arc::new(PostgresSchedulerStore::new(storage.clone())), clock);

        Self {
            storage,
            worker: Arc::new(worker),
            scheduler: Arc::new(scheduler),
            scheduler_token: config.scheduler_token.clone(),
        }
    }
}
