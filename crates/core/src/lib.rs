//! `wms-core`: domain foundation building blocks for the warehouse engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the aggregate execution contract, the domain error model and
//! the clock abstraction through which time enters the system.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod time;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::AggregateId;
pub use time::{Clock, ManualClock, SystemClock};
