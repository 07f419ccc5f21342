use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use wms_core::{Aggregate, AggregateId, AggregateRoot};
use wms_events::EventBus;
use wms_ledger::{
    EntryId, EntryKind, LedgerCommand, RecordEntry, StockEntry, StockKey, StockStream,
};
use wms_reservations::{
    Availability, CancelReservation, CommitReservation, ExpireReservation, PlaceReservation,
    Reservation, ReservationCommand, ReservationEvent, ReservationId, ReservationStatus,
};

use crate::error::{EngineError, EngineResult};
use crate::publisher::{JsonEnvelope, RESERVATION_AGGREGATE, reservation_stream};
use crate::retry::retry_on_conflict;
use crate::services::EngineContext;
use crate::services::ledger::{publish_entries, recorded_entry};
use crate::store::{ReservationWrite, StockPosition, StockWrite, WarehouseStore};

/// Due reservations fetched per sweep round.
const SWEEP_BATCH: usize = 256;

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub expired: usize,
    /// Reservations that changed concurrently; the next sweep sees them again.
    pub skipped: usize,
}

/// Reservation manager: time-bounded holds on stock, per key.
///
/// Every reservation write goes through the key's [`StockWrite`] so that a
/// hold, its commit entry and the key revision always move together.
#[derive(Debug)]
pub struct ReservationManager<S, B> {
    ctx: EngineContext<S, B>,
}

impl<S, B> Clone for ReservationManager<S, B> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<S, B> ReservationManager<S, B>
where
    S: WarehouseStore,
    B: EventBus<JsonEnvelope>,
{
    pub fn new(ctx: EngineContext<S, B>) -> Self {
        Self { ctx }
    }

    pub fn default_ttl(&self) -> Duration {
        self.ctx.reservation_ttl
    }

    /// Hold `quantity` of `key` until now + ttl.
    ///
    /// The availability check and the insert happen under the key lock and
    /// are written against the revision they were decided on.
    #[instrument(skip(self), fields(key = %key), err)]
    pub async fn reserve(
        &self,
        key: StockKey,
        quantity: i64,
        ttl: Option<Duration>,
        order_id: Option<AggregateId>,
    ) -> EngineResult<Reservation> {
        if quantity <= 0 {
            return Err(EngineError::validation("quantity must be positive"));
        }
        let ttl = ttl.unwrap_or(self.ctx.reservation_ttl);
        if ttl <= Duration::zero() {
            return Err(EngineError::validation("ttl must be positive"));
        }
        self.ctx.require_active_key(key).await?;

        debug!(key = %key, "waiting for stock key lock");
        let _guard = self.ctx.stock_locks.acquire(&key).await;
        let reservation_id = ReservationId::new(AggregateId::new());

        retry_on_conflict(&self.ctx.retry, "reserve", || async move {
            let now = self.ctx.now();
            let (position, active) = self.expire_due_on_key(key, now).await?;

            Availability::compute(key, position.on_hand, &active, now)
                .ensure_can_reserve(quantity)?;

            let mut reservation = Reservation::empty(reservation_id, key);
            let events = reservation.execute(&ReservationCommand::PlaceReservation(
                PlaceReservation {
                    reservation_id,
                    key,
                    quantity,
                    order_id,
                    occurred_at: now,
                    expires_at: now + ttl,
                },
            ))?;

            self.ctx
                .store
                .apply_stock_write(StockWrite {
                    key,
                    expected_revision: position.revision,
                    entry: None,
                    reservation: Some(ReservationWrite::new(reservation.clone(), 0)),
                })
                .await?;
            self.publish(reservation_id, 1, &events);

            info!(
                reservation_id = %reservation_id,
                key = %key,
                quantity,
                expires_at = %reservation.expires_at(),
                "reservation placed"
            );
            Ok(reservation)
        })
        .await
    }

    /// Commit the hold: the SHIPMENT entry and the COMMITTED transition are
    /// one write.
    ///
    /// A hold found past its deadline is persisted as EXPIRED and the call
    /// fails with `ReservationExpired`. Holds taken for an order can only be
    /// committed through that order.
    #[instrument(skip(self), fields(reservation_id = %id), err)]
    pub async fn commit(&self, id: ReservationId) -> EngineResult<StockEntry> {
        self.commit_as(id, None).await
    }

    pub(crate) async fn commit_for_order(
        &self,
        id: ReservationId,
        order_id: AggregateId,
    ) -> EngineResult<StockEntry> {
        self.commit_as(id, Some(order_id)).await
    }

    async fn commit_as(
        &self,
        id: ReservationId,
        owner: Option<AggregateId>,
    ) -> EngineResult<StockEntry> {
        let key = self.get(id).await?.key();
        let _guard = self.ctx.stock_locks.acquire(&key).await;

        retry_on_conflict(&self.ctx.retry, "commit", || async move {
            let now = self.ctx.now();
            let mut reservation = self.get(id).await?;
            ensure_owner(&reservation, owner)?;
            let loaded = reservation.version();
            let position = self.ctx.store.stock_position(key).await?;

            if reservation.status() == ReservationStatus::Active && reservation.is_due_at(now) {
                self.expire(&mut reservation, position.revision, now).await?;
                return Err(EngineError::ReservationExpired);
            }

            let events = reservation.execute(&ReservationCommand::CommitReservation(
                CommitReservation {
                    reservation_id: id,
                    occurred_at: now,
                },
            ))?;

            let stream = StockStream::at_position(key, position.on_hand, position.last_sequence);
            let ledger_events = stream.handle(&LedgerCommand::RecordEntry(RecordEntry {
                entry_id: EntryId::new(AggregateId::new()),
                key,
                delta: -reservation.quantity(),
                kind: EntryKind::Shipment,
                reason: None,
                reservation_id: Some(id.0),
                occurred_at: now,
            }))?;
            let entry = recorded_entry(&ledger_events)?;

            let position = self
                .ctx
                .store
                .apply_stock_write(StockWrite {
                    key,
                    expected_revision: position.revision,
                    entry: Some(entry.clone()),
                    reservation: Some(ReservationWrite::new(reservation.clone(), loaded)),
                })
                .await?;
            self.publish(id, loaded + 1, &events);
            publish_entries(&self.ctx.publisher, &ledger_events);

            info!(
                reservation_id = %id,
                key = %key,
                quantity = reservation.quantity(),
                sequence = entry.sequence,
                on_hand = position.on_hand,
                "reservation committed"
            );
            Ok(entry)
        })
        .await
    }

    /// Release the hold without touching the ledger.
    ///
    /// Idempotent on CANCELLED and EXPIRED; a hold already past its deadline
    /// is recorded as EXPIRED. Order holds are released by cancelling the
    /// order.
    #[instrument(skip(self), fields(reservation_id = %id), err)]
    pub async fn cancel(&self, id: ReservationId) -> EngineResult<Reservation> {
        self.cancel_as(id, None).await
    }

    pub(crate) async fn cancel_for_order(
        &self,
        id: ReservationId,
        order_id: AggregateId,
    ) -> EngineResult<Reservation> {
        self.cancel_as(id, Some(order_id)).await
    }

    async fn cancel_as(
        &self,
        id: ReservationId,
        owner: Option<AggregateId>,
    ) -> EngineResult<Reservation> {
        let key = self.get(id).await?.key();
        let _guard = self.ctx.stock_locks.acquire(&key).await;

        retry_on_conflict(&self.ctx.retry, "cancel_reservation", || async move {
            let now = self.ctx.now();
            let mut reservation = self.get(id).await?;
            ensure_owner(&reservation, owner)?;
            let loaded = reservation.version();
            let events = reservation.execute(&ReservationCommand::CancelReservation(
                CancelReservation {
                    reservation_id: id,
                    occurred_at: now,
                },
            ))?;
            if events.is_empty() {
                debug!(reservation_id = %id, status = reservation.status().as_str(), "reservation already closed");
                return Ok(reservation);
            }

            let position = self.ctx.store.stock_position(key).await?;
            self.write_reservation(&reservation, loaded, position.revision)
                .await?;
            self.publish(id, loaded + 1, &events);

            info!(
                reservation_id = %id,
                key = %key,
                status = reservation.status().as_str(),
                "reservation released"
            );
            Ok(reservation)
        })
        .await
    }

    /// Persist EXPIRED for every ACTIVE reservation due at `now`.
    ///
    /// Conflicting reservations are skipped, not retried.
    #[instrument(skip(self), err)]
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> EngineResult<SweepReport> {
        let mut report = SweepReport::default();

        loop {
            let due = self.ctx.store.due_reservations(now, SWEEP_BATCH).await?;
            let fetched = due.len();
            let expired_before = report.expired;

            for reservation in due {
                let id = reservation.id_typed();
                let key = reservation.key();
                let _guard = self.ctx.stock_locks.acquire(&key).await;

                match self.expire_stored(id, key, now).await {
                    Ok(true) => report.expired += 1,
                    Ok(false) => {}
                    Err(err) if err.is_transient() => {
                        debug!(reservation_id = %id, error = %err, "sweep skipped reservation");
                        report.skipped += 1;
                    }
                    Err(err) => {
                        warn!(reservation_id = %id, error = %err, "sweep failed to expire reservation");
                        report.skipped += 1;
                    }
                }
            }

            if fetched < SWEEP_BATCH || report.expired == expired_before {
                break;
            }
        }

        if report.expired > 0 || report.skipped > 0 {
            info!(expired = report.expired, skipped = report.skipped, "expiry sweep finished");
        } else {
            debug!("expiry sweep found nothing due");
        }
        Ok(report)
    }

    /// Sweep against the engine clock.
    pub async fn sweep_due(&self) -> EngineResult<SweepReport> {
        self.sweep_expired(self.ctx.now()).await
    }

    /// On-hand, held and available for `key` right now.
    pub async fn available(&self, key: StockKey) -> EngineResult<Availability> {
        self.ctx.require_key(key).await?;
        let now = self.ctx.now();
        let position = self.ctx.store.stock_position(key).await?;
        let active = self.ctx.store.active_reservations(key).await?;
        Ok(Availability::compute(key, position.on_hand, &active, now))
    }

    pub async fn get(&self, id: ReservationId) -> EngineResult<Reservation> {
        self.ctx
            .store
            .load_reservation(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("reservation {id}")))
    }

    /// Expire every due hold on `key` before a new claim is evaluated.
    ///
    /// Returns the position after those writes and the holds still active.
    async fn expire_due_on_key(
        &self,
        key: StockKey,
        now: DateTime<Utc>,
    ) -> EngineResult<(StockPosition, Vec<Reservation>)> {
        let mut position = self.ctx.store.stock_position(key).await?;
        let mut active = Vec::new();

        for mut reservation in self.ctx.store.active_reservations(key).await? {
            if reservation.is_due_at(now) {
                position = self.expire(&mut reservation, position.revision, now).await?;
            } else {
                active.push(reservation);
            }
        }
        Ok((position, active))
    }

    /// Sweep path: reload the reservation and expire it if still due.
    async fn expire_stored(
        &self,
        id: ReservationId,
        key: StockKey,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let Some(mut reservation) = self.ctx.store.load_reservation(id).await? else {
            return Ok(false);
        };
        if !reservation.is_due_at(now) {
            return Ok(false);
        }
        let position = self.ctx.store.stock_position(key).await?;
        self.expire(&mut reservation, position.revision, now).await?;
        Ok(true)
    }

    async fn expire(
        &self,
        reservation: &mut Reservation,
        revision: u64,
        now: DateTime<Utc>,
    ) -> EngineResult<StockPosition> {
        let id = reservation.id_typed();
        let loaded = reservation.version();
        let events = reservation.execute(&ReservationCommand::ExpireReservation(
            ExpireReservation {
                reservation_id: id,
                occurred_at: now,
            },
        ))?;

        let position = self
            .write_reservation(reservation, loaded, revision)
            .await?;
        self.publish(id, loaded + 1, &events);

        info!(
            reservation_id = %id,
            key = %reservation.key(),
            quantity = reservation.quantity(),
            "reservation expired"
        );
        Ok(position)
    }

    async fn write_reservation(
        &self,
        reservation: &Reservation,
        loaded: u64,
        revision: u64,
    ) -> EngineResult<StockPosition> {
        Ok(self
            .ctx
            .store
            .apply_stock_write(StockWrite {
                key: reservation.key(),
                expected_revision: revision,
                entry: None,
                reservation: Some(ReservationWrite::new(reservation.clone(), loaded)),
            })
            .await?)
    }

    fn publish(&self, id: ReservationId, first_sequence: u64, events: &[ReservationEvent]) {
        self.ctx.publisher.publish(
            &reservation_stream(id),
            RESERVATION_AGGREGATE,
            first_sequence,
            events,
        );
    }
}

/// The caller acting on a hold must be the order that took it, if any.
fn ensure_owner(reservation: &Reservation, owner: Option<AggregateId>) -> EngineResult<()> {
    match (reservation.order_id(), owner) {
        (held_for, acting) if held_for == acting => Ok(()),
        (Some(order_id), _) => Err(EngineError::InvariantViolation(format!(
            "reservation {} belongs to order {order_id}",
            reservation.id_typed()
        ))),
        (None, _) => Err(EngineError::InvariantViolation(format!(
            "reservation {} was not taken for an order",
            reservation.id_typed()
        ))),
    }
}
