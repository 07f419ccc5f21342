use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use wms_catalog::{Product, ProductEvent, ProductId};
use wms_core::AggregateRoot;
use wms_events::StreamCursors;
use wms_ledger::{LedgerEvent, StockKey};

use crate::publisher::{JsonEnvelope, PRODUCT_AGGREGATE, STOCK_AGGREGATE, product_stream};
use crate::store::StockPosition;

/// On-hand for a key dropped to or below its product's reorder threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub key: StockKey,
    pub sku: String,
    pub on_hand: i64,
    pub reorder_threshold: u32,
    pub raised_at: DateTime<Utc>,
}

/// Where low-stock alerts go.
///
/// Alerts are operational signals, not domain events; they are never
/// persisted by the engine.
pub trait AlertSink: Send + Sync + 'static {
    fn raise(&self, alert: LowStockAlert);
}

/// Logs each alert as a warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn raise(&self, alert: LowStockAlert) {
        warn!(
            key = %alert.key,
            sku = %alert.sku,
            on_hand = alert.on_hand,
            reorder_threshold = alert.reorder_threshold,
            "stock below reorder threshold"
        );
    }
}

/// Keeps alerts in memory (dashboard endpoint, tests).
#[derive(Debug, Default)]
pub struct InMemoryAlertSink {
    inner: Mutex<Vec<LowStockAlert>>,
}

impl InMemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<LowStockAlert> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl AlertSink for InMemoryAlertSink {
    fn raise(&self, alert: LowStockAlert) {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(alert);
    }
}

#[derive(Debug, Error)]
pub enum LowStockProjectionError {
    #[error("failed to deserialize {event_type}: {message}")]
    Deserialize { event_type: String, message: String },
}

#[derive(Debug, Clone)]
struct ProductInfo {
    sku: String,
    reorder_threshold: u32,
}

#[derive(Debug, Default)]
struct MonitorState {
    cursors: StreamCursors,
    products: HashMap<ProductId, ProductInfo>,
    on_hand: HashMap<StockKey, i64>,
    /// Keys currently alerted; cleared when the key recovers.
    low: HashSet<StockKey>,
}

/// Low-stock monitor.
///
/// Learns thresholds from catalog events and follows on-hand through
/// `ledger.entry.recorded`. Alerts once per crossing into low stock and
/// re-arms once the key recovers above the threshold. Redelivered envelopes
/// are ignored via per-stream cursors.
///
/// A monitor started against an existing store is first seeded from the
/// stored catalog and key positions; see [`LowStockMonitor::seed`].
#[derive(Debug)]
pub struct LowStockMonitor<A> {
    sink: A,
    state: Mutex<MonitorState>,
}

impl<A> LowStockMonitor<A>
where
    A: AlertSink,
{
    pub fn new(sink: A) -> Self {
        Self {
            sink,
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn sink(&self) -> &A {
        &self.sink
    }

    /// Keys currently below their threshold.
    pub fn low_keys(&self) -> Vec<StockKey> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let mut keys: Vec<StockKey> = state.low.iter().copied().collect();
        keys.sort();
        keys
    }

    /// Load thresholds and on-hand from stored state.
    ///
    /// Cursors start at the stored versions and sequences, so envelopes
    /// already covered by the snapshot are skipped when they arrive. Keys
    /// that are low at seed time raise their alert here.
    pub fn seed(&self, products: &[Product], positions: &[StockPosition], at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        for product in products {
            let product_id = product.id_typed();
            state.products.insert(
                product_id,
                ProductInfo {
                    sku: product.sku().to_string(),
                    reorder_threshold: product.reorder_threshold(),
                },
            );
            state
                .cursors
                .seed(product_stream(product_id), product.version());
        }
        for position in positions {
            state.on_hand.insert(position.key, position.on_hand);
            state
                .cursors
                .seed(position.key.stream_id(), position.last_sequence);
        }
        for position in positions {
            self.evaluate(&mut state, position.key, at);
        }
        debug!(
            products = products.len(),
            keys = positions.len(),
            low = state.low.len(),
            "low-stock monitor seeded"
        );
    }

    pub fn apply_envelope(&self, envelope: &JsonEnvelope) -> Result<(), LowStockProjectionError> {
        let aggregate_type = envelope.aggregate_type();
        if aggregate_type != PRODUCT_AGGREGATE && aggregate_type != STOCK_AGGREGATE {
            return Ok(());
        }

        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.cursors.position(envelope.stream_id()) >= envelope.sequence_number() {
            debug!(stream_id = envelope.stream_id(), "redelivered envelope ignored");
            return Ok(());
        }

        let deserialize_error = |e: serde_json::Error| LowStockProjectionError::Deserialize {
            event_type: envelope.event_type().to_string(),
            message: e.to_string(),
        };

        if aggregate_type == PRODUCT_AGGREGATE {
            let event: ProductEvent =
                serde_json::from_value(envelope.payload().clone()).map_err(deserialize_error)?;
            match event {
                ProductEvent::ProductRegistered(e) => {
                    state.products.insert(
                        e.product_id,
                        ProductInfo {
                            sku: e.sku,
                            reorder_threshold: e.reorder_threshold,
                        },
                    );
                }
                ProductEvent::ReorderThresholdChanged(e) => {
                    if let Some(info) = state.products.get_mut(&e.product_id) {
                        info.reorder_threshold = e.reorder_threshold;
                    }
                    let keys: Vec<StockKey> = state
                        .on_hand
                        .keys()
                        .filter(|k| k.product_id == e.product_id)
                        .copied()
                        .collect();
                    for key in keys {
                        self.evaluate(&mut state, key, e.occurred_at);
                    }
                }
                _ => {}
            }
        } else {
            let event: LedgerEvent =
                serde_json::from_value(envelope.payload().clone()).map_err(deserialize_error)?;
            let LedgerEvent::EntryRecorded(recorded) = event;
            let key = recorded.entry.key;
            state.on_hand.insert(key, recorded.on_hand_after);
            self.evaluate(&mut state, key, recorded.entry.recorded_at);
        }

        state.cursors.advance(envelope);
        Ok(())
    }

    fn evaluate(&self, state: &mut MonitorState, key: StockKey, at: DateTime<Utc>) {
        let Some(info) = state.products.get(&key.product_id) else {
            return;
        };
        let on_hand = state.on_hand.get(&key).copied().unwrap_or(0);
        let is_low = on_hand <= i64::from(info.reorder_threshold);

        if !is_low {
            state.low.remove(&key);
            return;
        }
        if state.low.insert(key) {
            self.sink.raise(LowStockAlert {
                key,
                sku: info.sku.clone(),
                on_hand,
                reorder_threshold: info.reorder_threshold,
                raised_at: at,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    use wms_catalog::{
        Pricing, ProductCategory, ProductCommand, ProductRegistered, RegisterProduct,
        ReorderThresholdChanged, UnitOfMeasure, WarehouseId,
    };
    use wms_core::{Aggregate, AggregateId};
    use wms_events::EventEnvelope;
    use wms_ledger::{EntryId, EntryKind, EntryRecorded, StockEntry};

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn product_envelope(seq: u64, event: ProductEvent) -> JsonEnvelope {
        let product_id = match &event {
            ProductEvent::ProductRegistered(e) => e.product_id,
            ProductEvent::ReorderThresholdChanged(e) => e.product_id,
            _ => unreachable!(),
        };
        EventEnvelope::new(
            Uuid::now_v7(),
            format!("product:{product_id}"),
            PRODUCT_AGGREGATE,
            "catalog.product.test",
            seq,
            test_time(),
            serde_json::to_value(event).unwrap(),
        )
    }

    fn registered(product_id: ProductId, threshold: u32) -> JsonEnvelope {
        product_envelope(
            1,
            ProductEvent::ProductRegistered(ProductRegistered {
                product_id,
                sku: "ELE-00AA11".to_string(),
                name: "Scanner".to_string(),
                category: ProductCategory::Electronics,
                unit: UnitOfMeasure::Each,
                reorder_threshold: threshold,
                pricing: Pricing::default(),
                occurred_at: test_time(),
            }),
        )
    }

    fn entry(key: StockKey, sequence: u64, delta: i64, on_hand_after: i64) -> JsonEnvelope {
        let kind = if delta > 0 {
            EntryKind::Receipt
        } else {
            EntryKind::Shipment
        };
        let event = LedgerEvent::EntryRecorded(EntryRecorded {
            entry: StockEntry {
                entry_id: EntryId::new(AggregateId::new()),
                key,
                delta,
                kind,
                sequence,
                recorded_at: test_time(),
                reason: None,
                reservation_id: None,
            },
            on_hand_after,
        });
        EventEnvelope::new(
            Uuid::now_v7(),
            key.stream_id(),
            STOCK_AGGREGATE,
            "ledger.entry.recorded",
            sequence,
            test_time(),
            serde_json::to_value(event).unwrap(),
        )
    }

    fn key_for(product_id: ProductId) -> StockKey {
        StockKey::new(product_id, WarehouseId::new(AggregateId::new()))
    }

    #[test]
    fn alerts_once_per_crossing_and_rearms_after_recovery() {
        let monitor = LowStockMonitor::new(InMemoryAlertSink::new());
        let product_id = ProductId::new(AggregateId::new());
        let key = key_for(product_id);

        monitor.apply_envelope(&registered(product_id, 5)).unwrap();
        monitor.apply_envelope(&entry(key, 1, 20, 20)).unwrap();
        assert!(monitor.sink().all().is_empty());

        monitor.apply_envelope(&entry(key, 2, -16, 4)).unwrap();
        monitor.apply_envelope(&entry(key, 3, -1, 3)).unwrap();
        assert_eq!(monitor.sink().all().len(), 1);
        assert_eq!(monitor.sink().all()[0].on_hand, 4);
        assert_eq!(monitor.low_keys(), vec![key]);

        monitor.apply_envelope(&entry(key, 4, 10, 13)).unwrap();
        assert!(monitor.low_keys().is_empty());

        monitor.apply_envelope(&entry(key, 5, -9, 4)).unwrap();
        assert_eq!(monitor.sink().all().len(), 2);
    }

    #[test]
    fn redelivered_envelopes_are_ignored() {
        let monitor = LowStockMonitor::new(InMemoryAlertSink::new());
        let product_id = ProductId::new(AggregateId::new());
        let key = key_for(product_id);

        monitor.apply_envelope(&registered(product_id, 5)).unwrap();
        monitor.apply_envelope(&entry(key, 1, 10, 10)).unwrap();
        monitor.apply_envelope(&entry(key, 2, -7, 3)).unwrap();
        // Stale copy of the first entry must not overwrite on-hand.
        monitor.apply_envelope(&entry(key, 1, 10, 10)).unwrap();

        assert_eq!(monitor.sink().all().len(), 1);
        assert_eq!(monitor.low_keys(), vec![key]);
    }

    #[test]
    fn raising_the_threshold_can_trigger_an_alert() {
        let monitor = LowStockMonitor::new(InMemoryAlertSink::new());
        let product_id = ProductId::new(AggregateId::new());
        let key = key_for(product_id);

        monitor.apply_envelope(&registered(product_id, 2)).unwrap();
        monitor.apply_envelope(&entry(key, 1, 8, 8)).unwrap();
        assert!(monitor.sink().all().is_empty());

        monitor
            .apply_envelope(&product_envelope(
                2,
                ProductEvent::ReorderThresholdChanged(ReorderThresholdChanged {
                    product_id,
                    previous: 2,
                    reorder_threshold: 10,
                    occurred_at: test_time(),
                }),
            ))
            .unwrap();

        let alerts = monitor.sink().all();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].reorder_threshold, 10);
    }

    #[test]
    fn seeding_from_the_store_alerts_and_skips_covered_envelopes() {
        let product_id = ProductId::new(AggregateId::new());
        let mut product = Product::empty(product_id);
        product
            .execute(&ProductCommand::RegisterProduct(RegisterProduct {
                product_id,
                sku: "ELE-00AA11".to_string(),
                name: "Scanner".to_string(),
                category: ProductCategory::Electronics,
                unit: UnitOfMeasure::Each,
                reorder_threshold: 5,
                pricing: Pricing::default(),
                occurred_at: test_time(),
            }))
            .unwrap();
        let low = key_for(product_id);
        let healthy = key_for(product_id);
        let positions = [
            StockPosition {
                key: low,
                on_hand: 3,
                last_sequence: 2,
                revision: 4,
            },
            StockPosition {
                key: healthy,
                on_hand: 40,
                last_sequence: 1,
                revision: 1,
            },
        ];

        let monitor = LowStockMonitor::new(InMemoryAlertSink::new());
        monitor.seed(&[product], &positions, test_time());
        assert_eq!(monitor.sink().all().len(), 1);
        assert_eq!(monitor.low_keys(), vec![low]);

        // Already part of the snapshot.
        monitor.apply_envelope(&registered(product_id, 50)).unwrap();
        monitor.apply_envelope(&entry(healthy, 1, 40, 40)).unwrap();
        assert_eq!(monitor.low_keys(), vec![low]);

        monitor.apply_envelope(&entry(healthy, 2, -36, 4)).unwrap();
        let alerts = monitor.sink().all();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[1].key, healthy);
        assert_eq!(alerts[1].reorder_threshold, 5);
    }
}
