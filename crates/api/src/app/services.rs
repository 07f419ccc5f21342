use std::sync::Arc;

use anyhow::Context;

use wms_core::SystemClock;
use wms_events::InMemoryEventBus;
use wms_infra::projections::{
    AlertSink, InMemoryAlertSink, LowStockAlert, LowStockMonitor, TracingAlertSink,
};
use wms_infra::workers::{SweeperHandle, WorkerHandle};
use wms_infra::{EngineConfig, JsonEnvelope, WarehouseEngine, WarehouseStore, open_store};

pub type ApiBus = Arc<InMemoryEventBus<JsonEnvelope>>;
pub type ApiEngine = WarehouseEngine<Arc<dyn WarehouseStore>, ApiBus>;

/// Logs each low-stock alert and keeps it for `GET /alerts`.
#[derive(Debug, Default)]
pub struct ApiAlertSink {
    recent: InMemoryAlertSink,
}

impl ApiAlertSink {
    pub fn all(&self) -> Vec<LowStockAlert> {
        self.recent.all()
    }
}

impl AlertSink for ApiAlertSink {
    fn raise(&self, alert: LowStockAlert) {
        TracingAlertSink.raise(alert.clone());
        self.recent.raise(alert);
    }
}

/// Shared state behind every handler.
pub struct AppServices {
    pub engine: ApiEngine,
    pub monitor: Arc<LowStockMonitor<ApiAlertSink>>,
}

/// Background tasks started with the services.
pub struct Background {
    monitor: WorkerHandle,
    sweeper: SweeperHandle,
}

impl Background {
    pub async fn shutdown(self) {
        self.sweeper.shutdown().await;
        let monitor = self.monitor;
        if let Err(err) = tokio::task::spawn_blocking(move || monitor.shutdown()).await {
            tracing::warn!(error = %err, "low-stock monitor did not stop cleanly");
        }
    }
}

/// Open the store, build the engine and start the monitor and sweeper.
pub async fn build_services(config: &EngineConfig) -> anyhow::Result<(Arc<AppServices>, Background)> {
    let store = open_store(config)
        .await
        .context("failed to open warehouse store")?;
    let bus: ApiBus = Arc::new(InMemoryEventBus::new());
    let engine = WarehouseEngine::from_config(store, bus, Arc::new(SystemClock), config);

    let (monitor, monitor_worker) = engine
        .spawn_low_stock_monitor(ApiAlertSink::default())
        .await
        .context("failed to start low-stock monitor")?;
    let sweeper = engine.spawn_sweeper(config.sweep_interval);

    Ok((
        Arc::new(AppServices { engine, monitor }),
        Background {
            monitor: monitor_worker,
            sweeper,
        },
    ))
}
