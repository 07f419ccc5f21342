use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use wms_events::Event;
use wms_ledger::StockKey;

/// Reservation identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub AggregateId);

impl ReservationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for ReservationId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Committed,
    Expired,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Committed => "committed",
            ReservationStatus::Expired => "expired",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }
}

impl core::str::FromStr for ReservationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ReservationStatus::Active),
            "committed" => Ok(ReservationStatus::Committed),
            "expired" => Ok(ReservationStatus::Expired),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown reservation status {other:?}"
            ))),
        }
    }
}

/// Aggregate root: Reservation.
///
/// The held quantity is fixed at placement; only the status moves, and only
/// away from ACTIVE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    id: ReservationId,
    key: StockKey,
    quantity: i64,
    status: ReservationStatus,
    order_id: Option<AggregateId>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Reservation {
    pub fn empty(id: ReservationId, key: StockKey) -> Self {
        Self {
            id,
            key,
            quantity: 0,
            status: ReservationStatus::Active,
            order_id: None,
            created_at: DateTime::<Utc>::MIN_UTC,
            expires_at: DateTime::<Utc>::MIN_UTC,
            closed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReservationId {
        self.id
    }

    pub fn key(&self) -> StockKey {
        self.key
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    /// Stored status. See [`Reservation::effective_status`] for the time-aware view.
    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn is_placed(&self) -> bool {
        self.created
    }

    /// ACTIVE and still inside its time window.
    pub fn holds_at(&self, now: DateTime<Utc>) -> bool {
        self.created && self.status == ReservationStatus::Active && now < self.expires_at
    }

    /// ACTIVE but past its deadline; only a persisted transition is missing.
    pub fn is_due_at(&self, now: DateTime<Utc>) -> bool {
        self.created && self.status == ReservationStatus::Active && now >= self.expires_at
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> ReservationStatus {
        if self.is_due_at(now) {
            ReservationStatus::Expired
        } else {
            self.status
        }
    }
}

impl AggregateRoot for Reservation {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceReservation.
///
/// Availability is checked by the caller under the key's transaction; the
/// aggregate only validates the claim itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceReservation {
    pub reservation_id: ReservationId,
    pub key: StockKey,
    pub quantity: i64,
    pub order_id: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReservation {
    pub reservation_id: ReservationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReservation {
    pub reservation_id: ReservationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireReservation {
    pub reservation_id: ReservationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationCommand {
    PlaceReservation(PlaceReservation),
    CommitReservation(CommitReservation),
    CancelReservation(CancelReservation),
    ExpireReservation(ExpireReservation),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPlaced {
    pub reservation_id: ReservationId,
    pub key: StockKey,
    pub quantity: i64,
    pub order_id: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCommitted {
    pub reservation_id: ReservationId,
    pub key: StockKey,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCancelled {
    pub reservation_id: ReservationId,
    pub key: StockKey,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationExpired {
    pub reservation_id: ReservationId,
    pub key: StockKey,
    pub quantity: i64,
    pub expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationEvent {
    ReservationPlaced(ReservationPlaced),
    ReservationCommitted(ReservationCommitted),
    ReservationCancelled(ReservationCancelled),
    ReservationExpired(ReservationExpired),
}

impl Event for ReservationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReservationEvent::ReservationPlaced(_) => "reservations.reservation.placed",
            ReservationEvent::ReservationCommitted(_) => "reservations.reservation.committed",
            ReservationEvent::ReservationCancelled(_) => "reservations.reservation.cancelled",
            ReservationEvent::ReservationExpired(_) => "reservations.reservation.expired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReservationEvent::ReservationPlaced(e) => e.occurred_at,
            ReservationEvent::ReservationCommitted(e) => e.occurred_at,
            ReservationEvent::ReservationCancelled(e) => e.occurred_at,
            ReservationEvent::ReservationExpired(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Reservation {
    type Command = ReservationCommand;
    type Event = ReservationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReservationEvent::ReservationPlaced(e) => {
                self.id = e.reservation_id;
                self.key = e.key;
                self.quantity = e.quantity;
                self.order_id = e.order_id;
                self.created_at = e.occurred_at;
                self.expires_at = e.expires_at;
                self.status = ReservationStatus::Active;
                self.created = true;
            }
            ReservationEvent::ReservationCommitted(e) => {
                self.status = ReservationStatus::Committed;
                self.closed_at = Some(e.occurred_at);
            }
            ReservationEvent::ReservationCancelled(e) => {
                self.status = ReservationStatus::Cancelled;
                self.closed_at = Some(e.occurred_at);
            }
            ReservationEvent::ReservationExpired(e) => {
                self.status = ReservationStatus::Expired;
                self.closed_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReservationCommand::PlaceReservation(cmd) => self.handle_place(cmd),
            ReservationCommand::CommitReservation(cmd) => self.handle_commit(cmd),
            ReservationCommand::CancelReservation(cmd) => self.handle_cancel(cmd),
            ReservationCommand::ExpireReservation(cmd) => self.handle_expire(cmd),
        }
    }
}

impl Reservation {
    fn ensure_exists(&self, reservation_id: ReservationId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("reservation {reservation_id}")));
        }
        if self.id != reservation_id {
            return Err(DomainError::invariant("reservation_id mismatch"));
        }
        Ok(())
    }

    fn expired_event(&self, occurred_at: DateTime<Utc>) -> ReservationEvent {
        ReservationEvent::ReservationExpired(ReservationExpired {
            reservation_id: self.id,
            key: self.key,
            quantity: self.quantity,
            expires_at: self.expires_at,
            occurred_at,
        })
    }

    fn handle_place(&self, cmd: &PlaceReservation) -> Result<Vec<ReservationEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("reservation already exists"));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if cmd.expires_at <= cmd.occurred_at {
            return Err(DomainError::validation("ttl must be positive"));
        }

        Ok(vec![ReservationEvent::ReservationPlaced(ReservationPlaced {
            reservation_id: cmd.reservation_id,
            key: cmd.key,
            quantity: cmd.quantity,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
            expires_at: cmd.expires_at,
        })])
    }

    fn handle_commit(
        &self,
        cmd: &CommitReservation,
    ) -> Result<Vec<ReservationEvent>, DomainError> {
        self.ensure_exists(cmd.reservation_id)?;

        match self.effective_status(cmd.occurred_at) {
            ReservationStatus::Active => {
                Ok(vec![ReservationEvent::ReservationCommitted(ReservationCommitted {
                    reservation_id: self.id,
                    key: self.key,
                    quantity: self.quantity,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ReservationStatus::Expired => Err(DomainError::ReservationExpired),
            status => Err(DomainError::not_active(status)),
        }
    }

    fn handle_cancel(
        &self,
        cmd: &CancelReservation,
    ) -> Result<Vec<ReservationEvent>, DomainError> {
        self.ensure_exists(cmd.reservation_id)?;

        // A hold past its deadline has already lapsed; record that instead.
        if self.is_due_at(cmd.occurred_at) {
            return Ok(vec![self.expired_event(cmd.occurred_at)]);
        }

        match self.status {
            ReservationStatus::Active => {
                Ok(vec![ReservationEvent::ReservationCancelled(ReservationCancelled {
                    reservation_id: self.id,
                    key: self.key,
                    quantity: self.quantity,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ReservationStatus::Cancelled | ReservationStatus::Expired => Ok(vec![]),
            ReservationStatus::Committed => Err(DomainError::not_active(self.status)),
        }
    }

    fn handle_expire(
        &self,
        cmd: &ExpireReservation,
    ) -> Result<Vec<ReservationEvent>, DomainError> {
        self.ensure_exists(cmd.reservation_id)?;

        if self.is_due_at(cmd.occurred_at) {
            Ok(vec![self.expired_event(cmd.occurred_at)])
        } else {
            Ok(vec![])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use wms_catalog::{ProductId, WarehouseId};

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn key() -> StockKey {
        StockKey::new(
            ProductId::new(AggregateId::new()),
            WarehouseId::new(AggregateId::new()),
        )
    }

    fn placed(quantity: i64, ttl: Duration) -> Reservation {
        let id = ReservationId::new(AggregateId::new());
        let key = key();
        let mut reservation = Reservation::empty(id, key);
        reservation
            .execute(&ReservationCommand::PlaceReservation(PlaceReservation {
                reservation_id: id,
                key,
                quantity,
                order_id: None,
                occurred_at: test_time(),
                expires_at: test_time() + ttl,
            }))
            .unwrap();
        reservation
    }

    fn commit(r: &Reservation, at: DateTime<Utc>) -> ReservationCommand {
        ReservationCommand::CommitReservation(CommitReservation {
            reservation_id: r.id_typed(),
            occurred_at: at,
        })
    }

    fn cancel(r: &Reservation, at: DateTime<Utc>) -> ReservationCommand {
        ReservationCommand::CancelReservation(CancelReservation {
            reservation_id: r.id_typed(),
            occurred_at: at,
        })
    }

    #[test]
    fn place_rejects_non_positive_quantity() {
        let id = ReservationId::new(AggregateId::new());
        let key = key();
        let cmd = ReservationCommand::PlaceReservation(PlaceReservation {
            reservation_id: id,
            key,
            quantity: 0,
            order_id: None,
            occurred_at: test_time(),
            expires_at: test_time() + Duration::seconds(30),
        });

        match Reservation::empty(id, key).handle(&cmd) {
            Err(DomainError::Validation(msg)) if msg.contains("quantity") => {}
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn place_rejects_zero_ttl() {
        let id = ReservationId::new(AggregateId::new());
        let key = key();
        let cmd = ReservationCommand::PlaceReservation(PlaceReservation {
            reservation_id: id,
            key,
            quantity: 1,
            order_id: None,
            occurred_at: test_time(),
            expires_at: test_time(),
        });

        assert!(matches!(
            Reservation::empty(id, key).handle(&cmd),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn commit_within_window_transitions_to_committed() {
        let mut r = placed(4, Duration::seconds(60));
        r.execute(&commit(&r, test_time() + Duration::seconds(59)))
            .unwrap();

        assert_eq!(r.status(), ReservationStatus::Committed);
        assert!(!r.holds_at(test_time()));
    }

    #[test]
    fn commit_after_deadline_fails_with_expired() {
        let r = placed(4, Duration::seconds(1));

        match r.handle(&commit(&r, test_time() + Duration::seconds(2))) {
            Err(DomainError::ReservationExpired) => {}
            other => panic!("expected ReservationExpired, got {other:?}"),
        }
        // Deadline is exclusive.
        assert!(matches!(
            r.handle(&commit(&r, test_time() + Duration::seconds(1))),
            Err(DomainError::ReservationExpired)
        ));
    }

    #[test]
    fn commit_of_cancelled_reservation_is_not_active() {
        let mut r = placed(4, Duration::seconds(60));
        r.execute(&cancel(&r, test_time())).unwrap();

        match r.handle(&commit(&r, test_time())) {
            Err(DomainError::ReservationNotActive(status)) if status == "cancelled" => {}
            other => panic!("expected ReservationNotActive, got {other:?}"),
        }
    }

    #[test]
    fn cancel_twice_yields_same_terminal_state() {
        let mut r = placed(4, Duration::seconds(60));
        let first = r.execute(&cancel(&r, test_time())).unwrap();
        let state = r.clone();
        let second = r.execute(&cancel(&r, test_time())).unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(r, state);
        assert_eq!(r.status(), ReservationStatus::Cancelled);
    }

    #[test]
    fn cancel_of_committed_reservation_fails() {
        let mut r = placed(4, Duration::seconds(60));
        r.execute(&commit(&r, test_time())).unwrap();

        assert!(matches!(
            r.handle(&cancel(&r, test_time())),
            Err(DomainError::ReservationNotActive(_))
        ));
    }

    #[test]
    fn cancel_after_deadline_records_expiry() {
        let mut r = placed(4, Duration::seconds(1));
        r.execute(&cancel(&r, test_time() + Duration::seconds(5)))
            .unwrap();

        assert_eq!(r.status(), ReservationStatus::Expired);
    }

    #[test]
    fn expire_is_a_no_op_before_deadline_and_after_close() {
        let mut r = placed(4, Duration::seconds(10));
        let expire = |at| {
            ReservationCommand::ExpireReservation(ExpireReservation {
                reservation_id: r.id_typed(),
                occurred_at: at,
            })
        };
        let early = expire(test_time() + Duration::seconds(9));
        let late = expire(test_time() + Duration::seconds(10));

        assert!(r.handle(&early).unwrap().is_empty());
        assert_eq!(r.execute(&late).unwrap().len(), 1);
        assert!(r.handle(&late).unwrap().is_empty());
        assert_eq!(r.status(), ReservationStatus::Expired);
    }

    #[test]
    fn expiry_is_a_pure_function_of_time() {
        let r = placed(4, Duration::seconds(10));

        assert!(r.holds_at(test_time() + Duration::seconds(9)));
        assert!(!r.holds_at(test_time() + Duration::seconds(10)));
        assert_eq!(
            r.effective_status(test_time() + Duration::seconds(10)),
            ReservationStatus::Expired
        );
        assert_eq!(r.status(), ReservationStatus::Active);
    }
}
