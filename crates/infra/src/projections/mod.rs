//! Projections: read models built from published envelopes.
//!
//! Projections are disposable and idempotent under at-least-once delivery.

pub mod low_stock;

pub use low_stock::{
    AlertSink, InMemoryAlertSink, LowStockAlert, LowStockMonitor, LowStockProjectionError,
    TracingAlertSink,
};
