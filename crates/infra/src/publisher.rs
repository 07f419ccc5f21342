//! Post-commit event publication.

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::warn;
use uuid::Uuid;

use wms_catalog::{ProductId, WarehouseId};
use wms_events::{Event, EventBus, EventEnvelope};
use wms_orders::OrderId;
use wms_reservations::ReservationId;

pub type JsonEnvelope = EventEnvelope<JsonValue>;

pub const PRODUCT_AGGREGATE: &str = "catalog.product";
pub const WAREHOUSE_AGGREGATE: &str = "catalog.warehouse";
pub const STOCK_AGGREGATE: &str = "ledger.stock";
pub const RESERVATION_AGGREGATE: &str = "reservations.reservation";
pub const ORDER_AGGREGATE: &str = "orders.order";

pub fn product_stream(id: ProductId) -> String {
    format!("product:{id}")
}

pub fn warehouse_stream(id: WarehouseId) -> String {
    format!("warehouse:{id}")
}

pub fn reservation_stream(id: ReservationId) -> String {
    format!("reservation:{id}")
}

pub fn order_stream(id: OrderId) -> String {
    format!("order:{id}")
}

/// Wraps committed domain events in envelopes and fans them out on the bus.
///
/// Must only be called after the store accepted the write: publishing is
/// distribution, never the source of truth. Failures are logged and
/// swallowed because the state change is already durable.
#[derive(Debug)]
pub struct EventPublisher<B> {
    bus: B,
}

impl<B> EventPublisher<B>
where
    B: EventBus<JsonEnvelope>,
{
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Publish `events` as consecutive positions of `stream_id`, the first one
    /// at `first_sequence`.
    pub fn publish<E>(
        &self,
        stream_id: &str,
        aggregate_type: &str,
        first_sequence: u64,
        events: &[E],
    ) where
        E: Event + Serialize,
    {
        for (offset, event) in (0u64..).zip(events) {
            let payload = match serde_json::to_value(event) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(stream_id, event_type = event.event_type(), error = %err, "event serialization failed");
                    continue;
                }
            };

            let envelope = EventEnvelope::new(
                Uuid::now_v7(),
                stream_id,
                aggregate_type,
                event.event_type(),
                first_sequence + offset,
                event.occurred_at(),
                payload,
            );

            if let Err(err) = self.bus.publish(envelope) {
                warn!(stream_id, event_type = event.event_type(), error = ?err, "event publication failed");
            }
        }
    }
}
