use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use wms_events::Event;

use crate::entry::{EntryId, EntryKind, StockEntry, StockKey};

/// Aggregate root: the ledger stream of one (Product, Warehouse) key.
///
/// Holds the checked position (on-hand and last sequence) and decides whether
/// a new entry may be appended. Version equals the number of entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockStream {
    key: StockKey,
    on_hand: i64,
    last_sequence: u64,
    version: u64,
}

impl StockStream {
    pub fn empty(key: StockKey) -> Self {
        Self {
            key,
            on_hand: 0,
            last_sequence: 0,
            version: 0,
        }
    }

    /// Rehydrate from a materialised position instead of replaying entries.
    pub fn at_position(key: StockKey, on_hand: i64, last_sequence: u64) -> Self {
        Self {
            key,
            on_hand,
            last_sequence,
            version: last_sequence,
        }
    }

    /// Rebuild the stream from its entries, checking every ledger invariant.
    pub fn replay<'a>(
        key: StockKey,
        entries: impl IntoIterator<Item = &'a StockEntry>,
    ) -> Result<Self, DomainError> {
        let mut stream = Self::empty(key);
        for entry in entries {
            if entry.key != key {
                return Err(DomainError::invariant(format!(
                    "entry {} belongs to {}, not {}",
                    entry.entry_id, entry.key, key
                )));
            }
            if entry.sequence <= stream.last_sequence {
                return Err(DomainError::invariant(format!(
                    "sequence {} does not follow {}",
                    entry.sequence, stream.last_sequence
                )));
            }
            entry
                .kind
                .validate_delta(entry.delta)
                .map_err(|e| DomainError::invariant(format!("sequence {}: {e}", entry.sequence)))?;

            let on_hand_after = stream.on_hand + entry.delta;
            if entry.kind.requires_non_negative(entry.delta) && on_hand_after < 0 {
                return Err(DomainError::invariant(format!(
                    "on-hand negative ({on_hand_after}) at sequence {}",
                    entry.sequence
                )));
            }

            stream.apply(&LedgerEvent::EntryRecorded(EntryRecorded {
                entry: entry.clone(),
                on_hand_after,
            }));
        }
        Ok(stream)
    }

    pub fn key(&self) -> StockKey {
        self.key
    }

    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }
}

impl AggregateRoot for StockStream {
    type Id = StockKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub entry_id: EntryId,
    pub key: StockKey,
    pub delta: i64,
    pub kind: EntryKind,
    pub reason: Option<String>,
    pub reservation_id: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    RecordEntry(RecordEntry),
}

/// Event: EntryRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecorded {
    pub entry: StockEntry,
    pub on_hand_after: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    EntryRecorded(EntryRecorded),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::EntryRecorded(_) => "ledger.entry.recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::EntryRecorded(e) => e.entry.recorded_at,
        }
    }
}

impl Aggregate for StockStream {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        let LedgerEvent::EntryRecorded(e) = event;
        self.on_hand += e.entry.delta;
        self.last_sequence = e.entry.sequence;
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let LedgerCommand::RecordEntry(cmd) = command;
        self.handle_record(cmd)
    }
}

impl StockStream {
    fn handle_record(&self, cmd: &RecordEntry) -> Result<Vec<LedgerEvent>, DomainError> {
        if cmd.key != self.key {
            return Err(DomainError::invariant("stock key mismatch"));
        }
        cmd.kind.validate_delta(cmd.delta)?;

        let reason = cmd
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        if cmd.kind == EntryKind::Adjustment && reason.is_none() {
            return Err(DomainError::validation("adjustment requires a reason"));
        }

        let on_hand_after = self
            .on_hand
            .checked_add(cmd.delta)
            .ok_or_else(|| DomainError::validation("delta overflows on-hand"))?;
        if cmd.kind.requires_non_negative(cmd.delta) && on_hand_after < 0 {
            return Err(DomainError::InsufficientStock {
                on_hand: self.on_hand,
                delta: cmd.delta,
            });
        }

        let entry = StockEntry {
            entry_id: cmd.entry_id,
            key: cmd.key,
            delta: cmd.delta,
            kind: cmd.kind,
            sequence: self.last_sequence + 1,
            recorded_at: cmd.occurred_at,
            reason,
            reservation_id: cmd.reservation_id,
        };

        Ok(vec![LedgerEvent::EntryRecorded(EntryRecorded {
            entry,
            on_hand_after,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wms_catalog::{ProductId, WarehouseId};

    fn key() -> StockKey {
        StockKey::new(
            ProductId::new(AggregateId::new()),
            WarehouseId::new(AggregateId::new()),
        )
    }

    fn record(key: StockKey, kind: EntryKind, delta: i64) -> LedgerCommand {
        LedgerCommand::RecordEntry(RecordEntry {
            entry_id: EntryId::new(AggregateId::new()),
            key,
            delta,
            kind,
            reason: (kind == EntryKind::Adjustment).then(|| "cycle count".to_string()),
            reservation_id: None,
            occurred_at: Utc::now(),
        })
    }

    fn recorded(events: &[LedgerEvent]) -> &StockEntry {
        let LedgerEvent::EntryRecorded(e) = &events[0];
        &e.entry
    }

    #[test]
    fn receipt_assigns_next_sequence() {
        let key = key();
        let mut stream = StockStream::empty(key);

        let first = stream.execute(&record(key, EntryKind::Receipt, 10)).unwrap();
        let second = stream.execute(&record(key, EntryKind::Receipt, 5)).unwrap();

        assert_eq!(recorded(&first).sequence, 1);
        assert_eq!(recorded(&second).sequence, 2);
        assert_eq!(stream.on_hand(), 15);
        assert_eq!(stream.version(), 2);
    }

    #[test]
    fn shipment_cannot_drive_on_hand_negative() {
        let key = key();
        let mut stream = StockStream::empty(key);
        stream.execute(&record(key, EntryKind::Receipt, 3)).unwrap();

        match stream.handle(&record(key, EntryKind::Shipment, -4)) {
            Err(DomainError::InsufficientStock { on_hand: 3, delta: -4 }) => {}
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(stream.on_hand(), 3);
    }

    #[test]
    fn adjustment_debit_is_checked_but_credit_is_not() {
        let key = key();
        let stream = StockStream::empty(key);

        assert!(matches!(
            stream.handle(&record(key, EntryKind::Adjustment, -1)),
            Err(DomainError::InsufficientStock { .. })
        ));
        assert!(stream.handle(&record(key, EntryKind::Adjustment, 2)).is_ok());
    }

    #[test]
    fn adjustment_without_reason_is_rejected() {
        let key = key();
        let stream = StockStream::empty(key);
        let cmd = LedgerCommand::RecordEntry(RecordEntry {
            entry_id: EntryId::new(AggregateId::new()),
            key,
            delta: 4,
            kind: EntryKind::Adjustment,
            reason: Some("   ".to_string()),
            reservation_id: None,
            occurred_at: Utc::now(),
        });

        match stream.handle(&cmd) {
            Err(DomainError::Validation(msg)) if msg.contains("reason") => {}
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn release_is_never_refused_for_stock() {
        let key = key();
        let stream = StockStream::at_position(key, 0, 7);
        let events = stream
            .handle(&record(key, EntryKind::ReservationRelease, 4))
            .unwrap();
        assert_eq!(recorded(&events).sequence, 8);
    }

    #[test]
    fn foreign_key_is_an_invariant_violation() {
        let stream = StockStream::empty(key());
        assert!(matches!(
            stream.handle(&record(key(), EntryKind::Receipt, 1)),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn replay_rejects_out_of_order_sequences() {
        let key = key();
        let mut stream = StockStream::empty(key);
        let a = recorded(&stream.execute(&record(key, EntryKind::Receipt, 2)).unwrap()).clone();
        let b = recorded(&stream.execute(&record(key, EntryKind::Receipt, 3)).unwrap()).clone();

        match StockStream::replay(key, [&b, &a]) {
            Err(DomainError::InvariantViolation(msg)) if msg.contains("does not follow") => {}
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn replay_rejects_negative_prefix() {
        let key = key();
        let entry = StockEntry {
            entry_id: EntryId::new(AggregateId::new()),
            key,
            delta: -1,
            kind: EntryKind::Shipment,
            sequence: 1,
            recorded_at: Utc::now(),
            reason: None,
            reservation_id: None,
        };

        assert!(matches!(
            StockStream::replay(key, [&entry]),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn op() -> impl Strategy<Value = (EntryKind, i64)> {
            prop_oneof![
                (1i64..50).prop_map(|q| (EntryKind::Receipt, q)),
                (1i64..50).prop_map(|q| (EntryKind::Shipment, -q)),
                (-50i64..50)
                    .prop_filter("non-zero", |q| *q != 0)
                    .prop_map(|q| (EntryKind::Adjustment, q)),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: on-hand equals the sum of accepted deltas and is never
            /// negative at any prefix; replaying the accepted entries agrees.
            #[test]
            fn replay_matches_sum_of_deltas(ops in proptest::collection::vec(op(), 0..64)) {
                let key = key();
                let mut stream = StockStream::empty(key);
                let mut accepted = Vec::new();

                for (kind, delta) in ops {
                    match stream.execute(&record(key, kind, delta)) {
                        Ok(events) => accepted.push(recorded(&events).clone()),
                        Err(DomainError::InsufficientStock { .. }) => {}
                        Err(other) => return Err(TestCaseError::fail(format!("{other:?}"))),
                    }
                    prop_assert!(stream.on_hand() >= 0);
                }

                let sum: i64 = accepted.iter().map(|e| e.delta).sum();
                prop_assert_eq!(stream.on_hand(), sum);

                let replayed = StockStream::replay(key, &accepted).unwrap();
                prop_assert_eq!(replayed.on_hand(), sum);
                prop_assert_eq!(replayed.last_sequence(), accepted.len() as u64);
                prop_assert_eq!(&replayed, &stream);
            }
        }
    }
}
