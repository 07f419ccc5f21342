//! Background workers: bus-driven projections and the reservation expiry sweeper.

pub mod expiry_sweeper;
pub mod projection_worker;

pub use expiry_sweeper::{ExpirySweeper, SweeperHandle};
pub use projection_worker::{ProjectionWorker, WorkerHandle};
