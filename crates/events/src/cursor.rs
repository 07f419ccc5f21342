//! Per-stream progress tracking for idempotent consumers.
//!
//! The bus delivers at-least-once, so a consumer may see the same envelope
//! twice. Remembering the highest sequence applied per stream is enough to
//! turn redeliveries into no-ops.

use std::collections::HashMap;

use crate::EventEnvelope;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamCursors {
    last: HashMap<String, u64>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last applied sequence for `stream_id` (0 when nothing was applied).
    pub fn position(&self, stream_id: &str) -> u64 {
        self.last.get(stream_id).copied().unwrap_or(0)
    }

    /// Returns `true` if the envelope is new and records it as applied.
    pub fn advance<E>(&mut self, envelope: &EventEnvelope<E>) -> bool {
        let seq = envelope.sequence_number();
        let last = self.last.entry(envelope.stream_id().to_string()).or_insert(0);
        if seq <= *last {
            return false;
        }
        *last = seq;
        true
    }

    /// Start `stream_id` at a position known from a snapshot. Never moves a
    /// cursor backwards.
    pub fn seed(&mut self, stream_id: impl Into<String>, position: u64) {
        let last = self.last.entry(stream_id.into()).or_insert(0);
        *last = (*last).max(position);
    }

    pub fn clear(&mut self) {
        self.last.clear();
    }
}
