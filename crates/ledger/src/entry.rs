use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_catalog::{ProductId, WarehouseId};
use wms_core::{AggregateId, DomainError};

/// Ledger entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub AggregateId);

impl EntryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for EntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The (Product, Warehouse) pair every stock quantity is scoped to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
}

impl StockKey {
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId) -> Self {
        Self {
            product_id,
            warehouse_id,
        }
    }

    /// Event stream name for this key.
    pub fn stream_id(&self) -> String {
        format!("stock:{}:{}", self.product_id, self.warehouse_id)
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.warehouse_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Receipt,
    Shipment,
    Adjustment,
    ReservationRelease,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Receipt => "receipt",
            EntryKind::Shipment => "shipment",
            EntryKind::Adjustment => "adjustment",
            EntryKind::ReservationRelease => "reservation_release",
        }
    }

    /// Sign rules: inbound kinds are positive, shipments negative, adjustments either way.
    pub fn validate_delta(self, delta: i64) -> Result<(), DomainError> {
        if delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        match self {
            EntryKind::Receipt | EntryKind::ReservationRelease if delta < 0 => Err(
                DomainError::validation(format!("{} delta must be positive", self.as_str())),
            ),
            EntryKind::Shipment if delta > 0 => Err(DomainError::validation(
                "shipment delta must be negative",
            )),
            _ => Ok(()),
        }
    }

    /// Whether an entry of this kind must leave on-hand non-negative.
    ///
    /// Receipts and reservation releases only ever add stock and are never
    /// refused on this ground.
    pub fn requires_non_negative(self, delta: i64) -> bool {
        match self {
            EntryKind::Shipment => true,
            EntryKind::Adjustment => delta < 0,
            EntryKind::Receipt | EntryKind::ReservationRelease => false,
        }
    }
}

impl core::str::FromStr for EntryKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receipt" => Ok(EntryKind::Receipt),
            "shipment" => Ok(EntryKind::Shipment),
            "adjustment" => Ok(EntryKind::Adjustment),
            "reservation_release" => Ok(EntryKind::ReservationRelease),
            other => Err(DomainError::validation(format!("unknown entry kind {other:?}"))),
        }
    }
}

/// One immutable ledger line. Corrections are new entries, never edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub entry_id: EntryId,
    pub key: StockKey,
    pub delta: i64,
    pub kind: EntryKind,
    /// Strictly increasing per key; the sole replay ordering.
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub reason: Option<String>,
    /// Reservation whose commit (or compensation) produced this entry.
    pub reservation_id: Option<AggregateId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipts_must_be_positive() {
        assert!(EntryKind::Receipt.validate_delta(5).is_ok());
        match EntryKind::Receipt.validate_delta(-5) {
            Err(DomainError::Validation(msg)) if msg.contains("receipt") => {}
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn zero_delta_is_rejected_for_every_kind() {
        for kind in [
            EntryKind::Receipt,
            EntryKind::Shipment,
            EntryKind::Adjustment,
            EntryKind::ReservationRelease,
        ] {
            assert!(kind.validate_delta(0).is_err(), "{kind:?}");
        }
    }

    #[test]
    fn only_debits_require_non_negative_result() {
        assert!(EntryKind::Shipment.requires_non_negative(-1));
        assert!(EntryKind::Adjustment.requires_non_negative(-1));
        assert!(!EntryKind::Adjustment.requires_non_negative(1));
        assert!(!EntryKind::Receipt.requires_non_negative(1));
        assert!(!EntryKind::ReservationRelease.requires_non_negative(1));
    }

    #[test]
    fn kind_names_parse_back() {
        for kind in [
            EntryKind::Receipt,
            EntryKind::Shipment,
            EntryKind::Adjustment,
            EntryKind::ReservationRelease,
        ] {
            assert_eq!(kind.as_str().parse::<EntryKind>().unwrap(), kind);
        }
    }
}
