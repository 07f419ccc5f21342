//! Periodic expiry of overdue reservations.
//!
//! Expiry is already enforced by time in every availability computation, so
//! the sweeper only makes the EXPIRED transition durable. Running it late, or
//! not at all, never lets an overdue hold count as held.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wms_events::EventBus;

use crate::publisher::JsonEnvelope;
use crate::services::ReservationManager;
use crate::store::WarehouseStore;

/// Handle to stop a running sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal shutdown and wait for the current cycle to finish.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(err) = self.join.await {
            warn!(error = %err, "expiry sweeper task ended abnormally");
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    pub interval: Duration,
}

impl Default for ExpirySweeper {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

impl ExpirySweeper {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Spawn the sweep loop on the current tokio runtime.
    ///
    /// Failures are logged and the next tick tries again.
    pub fn start<S, B>(&self, reservations: ReservationManager<S, B>) -> SweeperHandle
    where
        S: WarehouseStore + 'static,
        B: EventBus<JsonEnvelope> + 'static,
    {
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);
        let period = self.interval.max(Duration::from_millis(1));

        let join = tokio::spawn(async move {
            info!(interval_ms = period.as_millis() as u64, "expiry sweeper started");

            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = signal.notified() => {
                        info!("expiry sweeper received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        match reservations.sweep_due().await {
                            Ok(report) => debug!(expired = report.expired, skipped = report.skipped, "sweep cycle done"),
                            Err(err) => warn!(error = %err, "expiry sweep failed"),
                        }
                    }
                }
            }
        });

        SweeperHandle { shutdown, join }
    }
}
