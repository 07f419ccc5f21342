use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_core::DomainError;
use wms_ledger::StockKey;

use crate::reservation::Reservation;

/// On-hand, held and available quantities for one key at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub on_hand: i64,
    pub held: i64,
    pub available: i64,
}

impl Availability {
    /// Held counts only reservations for `key` that are ACTIVE and not past
    /// their deadline at `now`.
    pub fn compute<'a>(
        key: StockKey,
        on_hand: i64,
        reservations: impl IntoIterator<Item = &'a Reservation>,
        now: DateTime<Utc>,
    ) -> Self {
        let held = reservations
            .into_iter()
            .filter(|r| r.key() == key && r.holds_at(now))
            .map(Reservation::quantity)
            .sum::<i64>();
        Self {
            on_hand,
            held,
            available: on_hand - held,
        }
    }

    pub fn ensure_can_reserve(&self, requested: i64) -> Result<(), DomainError> {
        if requested > self.available {
            return Err(DomainError::InsufficientAvailable {
                available: self.available,
                requested,
            });
        }
        Ok(())
    }

    /// A debit may not strand active holds: on-hand after it must still cover `held`.
    pub fn ensure_can_debit(&self, delta: i64) -> Result<(), DomainError> {
        if delta < 0 && self.on_hand + delta < self.held {
            return Err(DomainError::InsufficientAvailable {
                available: self.available,
                requested: -delta,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use wms_catalog::{ProductId, WarehouseId};
    use wms_core::{Aggregate, AggregateId};

    use crate::reservation::{
        CancelReservation, CommitReservation, PlaceReservation, ReservationCommand, ReservationId,
    };

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn key() -> StockKey {
        StockKey::new(
            ProductId::new(AggregateId::new()),
            WarehouseId::new(AggregateId::new()),
        )
    }

    fn place(key: StockKey, quantity: i64, at: DateTime<Utc>, ttl: Duration) -> Reservation {
        let id = ReservationId::new(AggregateId::new());
        let mut r = Reservation::empty(id, key);
        r.execute(&ReservationCommand::PlaceReservation(PlaceReservation {
            reservation_id: id,
            key,
            quantity,
            order_id: None,
            occurred_at: at,
            expires_at: at + ttl,
        }))
        .unwrap();
        r
    }

    #[test]
    fn scenario_reserve_cancel_reserve() {
        let key = key();
        let now = test_time();
        let mut first = place(key, 7, now, Duration::minutes(15));

        let availability = Availability::compute(key, 10, [&first], now);
        assert_eq!(availability.available, 3);
        match availability.ensure_can_reserve(5) {
            Err(DomainError::InsufficientAvailable {
                available: 3,
                requested: 5,
            }) => {}
            other => panic!("expected InsufficientAvailable, got {other:?}"),
        }

        first
            .execute(&ReservationCommand::CancelReservation(CancelReservation {
                reservation_id: first.id_typed(),
                occurred_at: now,
            }))
            .unwrap();
        let availability = Availability::compute(key, 10, [&first], now);
        assert_eq!(availability.available, 10);
        assert!(availability.ensure_can_reserve(5).is_ok());
    }

    #[test]
    fn expired_holds_do_not_count_even_before_sweep() {
        let key = key();
        let now = test_time();
        let r = place(key, 4, now, Duration::seconds(1));

        let later = now + Duration::seconds(2);
        let availability = Availability::compute(key, 10, [&r], later);
        assert_eq!(availability.held, 0);
        assert_eq!(availability.available, 10);
    }

    #[test]
    fn holds_on_other_keys_are_ignored() {
        let now = test_time();
        let other = place(key(), 9, now, Duration::minutes(1));
        let availability = Availability::compute(key(), 10, [&other], now);
        assert_eq!(availability.available, 10);
    }

    #[test]
    fn debit_may_not_strand_holds() {
        let key = key();
        let now = test_time();
        let r = place(key, 6, now, Duration::minutes(1));
        let availability = Availability::compute(key, 10, [&r], now);

        assert!(availability.ensure_can_debit(-4).is_ok());
        assert!(matches!(
            availability.ensure_can_debit(-5),
            Err(DomainError::InsufficientAvailable { available: 4, requested: 5 })
        ));
        assert!(availability.ensure_can_debit(3).is_ok());
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use wms_ledger::{EntryId, EntryKind, LedgerCommand, RecordEntry, StockStream};

        #[derive(Debug, Clone)]
        enum Op {
            Receive(i64),
            Reserve(i64, i64),
            Commit(usize),
            Cancel(usize),
            Tick(i64),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (1i64..20).prop_map(Op::Receive),
                (1i64..15, 1i64..30).prop_map(|(q, ttl)| Op::Reserve(q, ttl)),
                (0usize..16).prop_map(Op::Commit),
                (0usize..16).prop_map(Op::Cancel),
                (1i64..10).prop_map(Op::Tick),
            ]
        }

        fn record(stream: &mut StockStream, kind: EntryKind, delta: i64, at: DateTime<Utc>) {
            stream
                .execute(&LedgerCommand::RecordEntry(RecordEntry {
                    entry_id: EntryId::new(AggregateId::new()),
                    key: stream.key(),
                    delta,
                    kind,
                    reason: None,
                    reservation_id: None,
                    occurred_at: at,
                }))
                .unwrap();
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: whatever the interleaving of receipts, holds, commits,
            /// cancels and elapsed time, live holds never exceed on-hand and
            /// every commit finds enough stock to ship.
            #[test]
            fn holds_never_exceed_on_hand(ops in proptest::collection::vec(op(), 1..80)) {
                let key = key();
                let mut now = test_time();
                let mut stream = StockStream::empty(key);
                let mut reservations: Vec<Reservation> = Vec::new();

                for op in ops {
                    match op {
                        Op::Receive(q) => record(&mut stream, EntryKind::Receipt, q, now),
                        Op::Reserve(q, ttl) => {
                            let availability =
                                Availability::compute(key, stream.on_hand(), &reservations, now);
                            if availability.ensure_can_reserve(q).is_ok() {
                                reservations.push(place(key, q, now, Duration::seconds(ttl)));
                            }
                        }
                        Op::Commit(i) => {
                            if let Some(r) = reservations.get_mut(i) {
                                let cmd = ReservationCommand::CommitReservation(CommitReservation {
                                    reservation_id: r.id_typed(),
                                    occurred_at: now,
                                });
                                if r.execute(&cmd).is_ok() {
                                    let q = r.quantity();
                                    record(&mut stream, EntryKind::Shipment, -q, now);
                                }
                            }
                        }
                        Op::Cancel(i) => {
                            if let Some(r) = reservations.get_mut(i) {
                                let cmd = ReservationCommand::CancelReservation(CancelReservation {
                                    reservation_id: r.id_typed(),
                                    occurred_at: now,
                                });
                                let _ = r.execute(&cmd);
                            }
                        }
                        Op::Tick(secs) => now += Duration::seconds(secs),
                    }

                    let availability =
                        Availability::compute(key, stream.on_hand(), &reservations, now);
                    prop_assert!(stream.on_hand() >= 0);
                    prop_assert!(availability.held <= stream.on_hand());
                    prop_assert!(availability.available >= 0);
                }
            }
        }
    }
}
