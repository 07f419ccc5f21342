use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, instrument, warn};

use wms_core::{Aggregate, AggregateId, AggregateRoot, ExpectedVersion};
use wms_events::EventBus;
use wms_ledger::{EntryKind, StockKey};
use wms_orders::{
    AbortFulfillment, CancelOrder, CompleteFulfillment, DateRange, FulfillmentKind,
    FulfillmentReport, LineFailure, LineOutcome, LineResult, MarkReserved, MarkStockReleased,
    NewOrderLine, Order, OrderCommand, OrderEvent, OrderId, OrderStatistics, OrderStatus,
    PlaceOrder, RejectOrder,
};
use wms_reservations::{ReservationId, ReservationStatus};

use crate::error::{EngineError, EngineResult};
use crate::locks::KeyLocks;
use crate::publisher::{JsonEnvelope, ORDER_AGGREGATE, order_stream};
use crate::services::{EngineContext, ReservationManager, StockLedger};
use crate::store::WarehouseStore;

/// Order processor: drives orders through reserve, fulfil and cancel.
///
/// Reservations are taken in line order so contention between orders is
/// deterministic. Operations on one order are serialised in-process; the
/// stored order is additionally guarded by its version.
#[derive(Debug)]
pub struct OrderProcessor<S, B> {
    ctx: EngineContext<S, B>,
    reservations: ReservationManager<S, B>,
    ledger: StockLedger<S, B>,
    order_locks: Arc<KeyLocks<OrderId>>,
}

impl<S, B> Clone for OrderProcessor<S, B> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            reservations: self.reservations.clone(),
            ledger: self.ledger.clone(),
            order_locks: Arc::clone(&self.order_locks),
        }
    }
}

impl<S, B> OrderProcessor<S, B>
where
    S: WarehouseStore,
    B: EventBus<JsonEnvelope>,
{
    pub fn new(
        ctx: EngineContext<S, B>,
        reservations: ReservationManager<S, B>,
        ledger: StockLedger<S, B>,
    ) -> Self {
        Self {
            ctx,
            reservations,
            ledger,
            order_locks: Arc::new(KeyLocks::new()),
        }
    }

    /// Place an order and reserve every line.
    ///
    /// Malformed lines and unknown or disabled products/warehouses fail the
    /// call before anything is stored. A line that cannot be reserved rejects
    /// the order: holds taken for earlier lines are cancelled and the stored
    /// order carries the failing line and its reason.
    #[instrument(skip(self, lines), fields(lines = lines.len()), err)]
    pub async fn submit(
        &self,
        lines: Vec<NewOrderLine>,
        ttl: Option<Duration>,
    ) -> EngineResult<Order> {
        let order_id = OrderId::new(AggregateId::new());
        let mut order = Order::empty(order_id);
        let mut place = PlaceOrder {
            order_id,
            lines,
            unit_prices: Vec::new(),
            occurred_at: self.ctx.now(),
        };
        order.handle(&OrderCommand::PlaceOrder(place.clone()))?;

        for (idx, line) in place.lines.iter().enumerate() {
            let product = self
                .ctx
                .require_active_key(StockKey::new(line.product_id, line.warehouse_id))
                .await
                .map_err(|err| match err {
                    EngineError::Validation(msg) => {
                        EngineError::Validation(format!("line {}: {msg}", idx + 1))
                    }
                    other => other,
                })?;
            place.unit_prices.push(product.pricing().selling_price);
        }
        let events = order.execute(&OrderCommand::PlaceOrder(place))?;

        let _guard = self.order_locks.acquire(&order_id).await;
        self.save(&order, 0, &events).await?;

        let mut held: Vec<ReservationId> = Vec::with_capacity(order.lines().len());
        let mut failure = None;
        for line in order.lines() {
            match self
                .reservations
                .reserve(line.key(), line.quantity, ttl, Some(order_id.0))
                .await
            {
                Ok(reservation) => held.push(reservation.id_typed()),
                Err(err) => {
                    failure = Some(LineFailure {
                        line_no: line.line_no,
                        code: err.code().to_string(),
                        message: err.to_string(),
                    });
                    break;
                }
            }
        }

        let loaded = order.version();
        let mut taken = Vec::new();
        let command = match failure {
            Some(failure) => {
                self.release_holds(order_id, &held).await;
                warn!(
                    order_id = %order_id,
                    line_no = failure.line_no,
                    code = %failure.code,
                    "order rejected"
                );
                OrderCommand::RejectOrder(RejectOrder {
                    order_id,
                    failure,
                    released: held,
                    occurred_at: self.ctx.now(),
                })
            }
            None => {
                taken.clone_from(&held);
                info!(order_id = %order_id, lines = order.lines().len(), "order reserved");
                OrderCommand::MarkReserved(MarkReserved {
                    order_id,
                    reservations: held,
                    occurred_at: self.ctx.now(),
                })
            }
        };

        let events = order.execute(&command)?;
        if let Err(err) = self.save(&order, loaded, &events).await {
            if !taken.is_empty() {
                warn!(order_id = %order_id, error = %err, "order not stored, releasing its holds");
                self.release_holds(order_id, &taken).await;
            }
            return Err(err);
        }
        Ok(order)
    }

    /// Commit every reservation of a RESERVED order, in line order.
    ///
    /// The first failing commit stops the run: its hold and the remaining
    /// ones are released and the order is CANCELLED with a per-line report.
    /// A hold already committed by an interrupted earlier run counts as
    /// committed. Lines committed
    /// before the failure stay shipped; see [`OrderProcessor::release_stock`].
    #[instrument(skip(self), fields(order_id = %id), err)]
    pub async fn fulfill(&self, id: OrderId) -> EngineResult<Order> {
        let _guard = self.order_locks.acquire(&id).await;
        let mut order = self.get(id).await?;
        if order.status() != OrderStatus::Reserved {
            return Err(EngineError::InvariantViolation(format!(
                "cannot fulfil order in status {}",
                order.status().as_str()
            )));
        }

        let mut outcomes = Vec::with_capacity(order.lines().len());
        let mut failed = false;
        for (line, &reservation_id) in order.lines().iter().zip(order.reservations()) {
            let result = if failed {
                self.release_hold(id, reservation_id).await;
                LineResult::Cancelled
            } else {
                match self.commit_line(id, line.key(), reservation_id).await {
                    Ok(entry_sequence) => LineResult::Committed { entry_sequence },
                    Err(err) => {
                        failed = true;
                        self.release_hold(id, reservation_id).await;
                        LineResult::Failed {
                            code: err.code().to_string(),
                            message: err.to_string(),
                        }
                    }
                }
            };
            outcomes.push(LineOutcome {
                line_no: line.line_no,
                reservation_id,
                result,
            });
        }

        let report = FulfillmentReport::from_outcomes(outcomes);
        let kind = report.kind;
        let occurred_at = self.ctx.now();
        let command = if kind == FulfillmentKind::Complete {
            OrderCommand::CompleteFulfillment(CompleteFulfillment {
                order_id: id,
                report,
                occurred_at,
            })
        } else {
            OrderCommand::AbortFulfillment(AbortFulfillment {
                order_id: id,
                report,
                occurred_at,
            })
        };

        let loaded = order.version();
        let events = order.execute(&command)?;
        self.save(&order, loaded, &events).await?;

        match kind {
            FulfillmentKind::Complete => {
                info!(order_id = %id, units = order.total_units(), "order fulfilled")
            }
            _ => warn!(order_id = %id, kind = ?kind, "order fulfilment failed"),
        }
        Ok(order)
    }

    /// Cancel a PENDING or RESERVED order and release its holds.
    ///
    /// Every hold is checked before any is touched; a hold that was already
    /// committed fails the call and leaves the order as it was.
    #[instrument(skip(self), fields(order_id = %id), err)]
    pub async fn cancel(&self, id: OrderId) -> EngineResult<Order> {
        let _guard = self.order_locks.acquire(&id).await;
        let mut order = self.get(id).await?;
        let command = OrderCommand::CancelOrder(CancelOrder {
            order_id: id,
            occurred_at: self.ctx.now(),
        });
        order.handle(&command)?;

        for &reservation_id in order.reservations() {
            let hold = self.reservations.get(reservation_id).await?;
            if hold.status() == ReservationStatus::Committed {
                return Err(EngineError::InvariantViolation(format!(
                    "reservation {reservation_id} of order {id} is already committed"
                )));
            }
        }
        for &reservation_id in order.reservations() {
            self.reservations
                .cancel_for_order(reservation_id, id.0)
                .await?;
        }

        let loaded = order.version();
        let events = order.execute(&command)?;
        self.save(&order, loaded, &events).await?;
        info!(order_id = %id, "order cancelled");
        Ok(order)
    }

    /// Put back the stock shipped for a partially fulfilled, cancelled order.
    ///
    /// One RESERVATION_RELEASE entry per committed line; allowed once. Lines
    /// whose release entry is already in the ledger are not written again, so
    /// a call interrupted halfway can be repeated.
    #[instrument(skip(self), fields(order_id = %id), err)]
    pub async fn release_stock(&self, id: OrderId) -> EngineResult<Order> {
        let _guard = self.order_locks.acquire(&id).await;
        let mut order = self.get(id).await?;
        let command = OrderCommand::MarkStockReleased(MarkStockReleased {
            order_id: id,
            occurred_at: self.ctx.now(),
        });
        order.handle(&command)?;

        let committed: Vec<LineOutcome> = order
            .fulfillment()
            .map(|report| report.committed().cloned().collect())
            .unwrap_or_default();
        for outcome in committed {
            let line = order.line(outcome.line_no).ok_or_else(|| {
                EngineError::InvariantViolation(format!("order has no line {}", outcome.line_no))
            })?;
            let released = self.ledger.entries(line.key()).await?.iter().any(|e| {
                e.kind == EntryKind::ReservationRelease
                    && e.reservation_id == Some(outcome.reservation_id.0)
            });
            if released {
                debug!(order_id = %id, line_no = line.line_no, "line already released");
                continue;
            }
            self.ledger
                .record_entry(
                    line.key(),
                    line.quantity,
                    EntryKind::ReservationRelease,
                    Some(format!("order {id} cancelled after partial shipment")),
                    Some(outcome.reservation_id.0),
                )
                .await?;
        }

        let loaded = order.version();
        let events = order.execute(&command)?;
        self.save(&order, loaded, &events).await?;
        info!(order_id = %id, "shipped stock released");
        Ok(order)
    }

    pub async fn get(&self, id: OrderId) -> EngineResult<Order> {
        self.ctx
            .store
            .load_order(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("order {id}")))
    }

    pub async fn list(&self) -> EngineResult<Vec<Order>> {
        Ok(self.ctx.store.list_orders().await?)
    }

    pub async fn statistics(&self, range: DateRange) -> EngineResult<OrderStatistics> {
        let orders = self.ctx.store.list_orders().await?;
        Ok(OrderStatistics::from_orders(&orders, range))
    }

    /// Commit one line's hold. A hold committed by an earlier, interrupted
    /// run reports the SHIPMENT entry it already produced.
    async fn commit_line(
        &self,
        id: OrderId,
        key: StockKey,
        reservation_id: ReservationId,
    ) -> EngineResult<u64> {
        let hold = self.reservations.get(reservation_id).await?;
        if hold.status() != ReservationStatus::Committed {
            let entry = self
                .reservations
                .commit_for_order(reservation_id, id.0)
                .await?;
            return Ok(entry.sequence);
        }

        self.ledger
            .entries(key)
            .await?
            .iter()
            .find(|e| e.kind == EntryKind::Shipment && e.reservation_id == Some(reservation_id.0))
            .map(|e| e.sequence)
            .ok_or_else(|| {
                EngineError::InvariantViolation(format!(
                    "reservation {reservation_id} is committed but has no shipment"
                ))
            })
    }

    async fn release_hold(&self, order_id: OrderId, reservation_id: ReservationId) {
        if let Err(err) = self
            .reservations
            .cancel_for_order(reservation_id, order_id.0)
            .await
        {
            warn!(
                order_id = %order_id,
                reservation_id = %reservation_id,
                error = %err,
                "could not release hold"
            );
        }
    }

    async fn release_holds(&self, order_id: OrderId, held: &[ReservationId]) {
        for &reservation_id in held {
            self.release_hold(order_id, reservation_id).await;
        }
    }

    async fn save(&self, order: &Order, loaded: u64, events: &[OrderEvent]) -> EngineResult<()> {
        self.ctx
            .store
            .save_order(order, ExpectedVersion::Exact(loaded))
            .await?;
        self.ctx.publisher.publish(
            &order_stream(order.id_typed()),
            ORDER_AGGREGATE,
            loaded + 1,
            events,
        );
        Ok(())
    }
}
