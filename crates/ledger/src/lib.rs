//! Stock ledger domain module.
//!
//! The ledger is an append-only sequence of [`StockEntry`] values per
//! (Product, Warehouse) [`StockKey`]. On-hand is never stored as a free-floating
//! counter: it is the sum of the key's deltas, kept as a checked position on
//! the [`StockStream`] aggregate and reproducible by [`StockStream::replay`].

pub mod entry;
pub mod stream;

pub use entry::{EntryId, EntryKind, StockEntry, StockKey};
pub use stream::{EntryRecorded, LedgerCommand, LedgerEvent, RecordEntry, StockStream};
