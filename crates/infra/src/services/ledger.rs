use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use wms_core::{Aggregate, AggregateId};
use wms_events::EventBus;
use wms_ledger::{
    EntryId, EntryKind, LedgerCommand, LedgerEvent, RecordEntry, StockEntry, StockKey,
    StockStream,
};
use wms_reservations::Availability;

use crate::error::{EngineError, EngineResult};
use crate::publisher::{EventPublisher, JsonEnvelope, STOCK_AGGREGATE};
use crate::retry::retry_on_conflict;
use crate::services::EngineContext;
use crate::store::{StockPosition, StockWrite, WarehouseStore};

/// Result of replaying a key's entries against its materialised position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub key: StockKey,
    pub on_hand: i64,
    pub replayed_on_hand: i64,
    pub last_sequence: u64,
    pub entries: usize,
    pub consistent: bool,
}

/// Stock ledger: append-only entries per key, on-hand derived from them.
#[derive(Debug)]
pub struct StockLedger<S, B> {
    ctx: EngineContext<S, B>,
}

impl<S, B> Clone for StockLedger<S, B> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<S, B> StockLedger<S, B>
where
    S: WarehouseStore,
    B: EventBus<JsonEnvelope>,
{
    pub fn new(ctx: EngineContext<S, B>) -> Self {
        Self { ctx }
    }

    pub async fn receive(
        &self,
        key: StockKey,
        quantity: i64,
        reason: Option<String>,
    ) -> EngineResult<StockEntry> {
        if quantity <= 0 {
            return Err(EngineError::validation("receipt quantity must be positive"));
        }
        self.record_entry(key, quantity, EntryKind::Receipt, reason, None)
            .await
    }

    pub async fn adjust(
        &self,
        key: StockKey,
        delta: i64,
        reason: impl Into<String>,
    ) -> EngineResult<StockEntry> {
        self.record_entry(key, delta, EntryKind::Adjustment, Some(reason.into()), None)
            .await
    }

    /// Append one entry for `key`.
    ///
    /// Debits are checked twice: on-hand may not go negative (the stream
    /// decides that) and may not drop below what active reservations hold.
    #[instrument(skip(self, reason), fields(key = %key, kind = kind.as_str()), err)]
    pub async fn record_entry(
        &self,
        key: StockKey,
        delta: i64,
        kind: EntryKind,
        reason: Option<String>,
        reservation_id: Option<AggregateId>,
    ) -> EngineResult<StockEntry> {
        self.ctx.require_key(key).await?;
        let _guard = self.ctx.stock_locks.acquire(&key).await;

        let reason = &reason;
        retry_on_conflict(&self.ctx.retry, "record_entry", || async move {
            let now = self.ctx.now();
            let position = self.ctx.store.stock_position(key).await?;
            let stream =
                StockStream::at_position(key, position.on_hand, position.last_sequence);

            let command = LedgerCommand::RecordEntry(RecordEntry {
                entry_id: EntryId::new(AggregateId::new()),
                key,
                delta,
                kind,
                reason: reason.clone(),
                reservation_id,
                occurred_at: now,
            });
            let events = stream.handle(&command)?;

            if delta < 0 {
                let active = self.ctx.store.active_reservations(key).await?;
                Availability::compute(key, position.on_hand, &active, now)
                    .ensure_can_debit(delta)?;
            }

            let entry = recorded_entry(&events)?;
            let position = self
                .ctx
                .store
                .apply_stock_write(StockWrite {
                    key,
                    expected_revision: position.revision,
                    entry: Some(entry.clone()),
                    reservation: None,
                })
                .await?;

            publish_entries(&self.ctx.publisher, &events);
            info!(
                key = %key,
                kind = kind.as_str(),
                delta,
                sequence = entry.sequence,
                on_hand = position.on_hand,
                "ledger entry recorded"
            );
            Ok(entry)
        })
        .await
    }

    pub async fn on_hand(&self, key: StockKey) -> EngineResult<i64> {
        Ok(self.position(key).await?.on_hand)
    }

    pub async fn position(&self, key: StockKey) -> EngineResult<StockPosition> {
        self.ctx.require_key(key).await?;
        Ok(self.ctx.store.stock_position(key).await?)
    }

    pub async fn entries(&self, key: StockKey) -> EngineResult<Vec<StockEntry>> {
        self.ctx.require_key(key).await?;
        Ok(self.ctx.store.load_entries(key).await?)
    }

    /// Replay the stored entries and compare with the materialised position.
    ///
    /// A replay that breaks a ledger rule is reported as `InvariantViolation`.
    pub async fn verify(&self, key: StockKey) -> EngineResult<LedgerAudit> {
        self.ctx.require_key(key).await?;
        let position = self.ctx.store.stock_position(key).await?;
        let entries = self.ctx.store.load_entries(key).await?;
        let replayed = StockStream::replay(key, &entries)?;

        let consistent = replayed.on_hand() == position.on_hand
            && replayed.last_sequence() == position.last_sequence;
        debug!(key = %key, consistent, entries = entries.len(), "ledger verified");

        Ok(LedgerAudit {
            key,
            on_hand: position.on_hand,
            replayed_on_hand: replayed.on_hand(),
            last_sequence: position.last_sequence,
            entries: entries.len(),
            consistent,
        })
    }
}

/// The entry a successful `RecordEntry` produced.
pub(crate) fn recorded_entry(events: &[LedgerEvent]) -> EngineResult<StockEntry> {
    match events.first() {
        Some(LedgerEvent::EntryRecorded(recorded)) => Ok(recorded.entry.clone()),
        None => Err(EngineError::InvariantViolation(
            "ledger command produced no entry".to_string(),
        )),
    }
}

/// Publish ledger events, each at its entry's sequence on the key stream.
pub(crate) fn publish_entries<B>(publisher: &EventPublisher<B>, events: &[LedgerEvent])
where
    B: EventBus<JsonEnvelope>,
{
    for event in events {
        let LedgerEvent::EntryRecorded(recorded) = event;
        publisher.publish(
            &recorded.entry.key.stream_id(),
            STOCK_AGGREGATE,
            recorded.entry.sequence,
            std::slice::from_ref(event),
        );
    }
}
