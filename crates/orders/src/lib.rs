//! Orders domain module (event-sourced).
//!
//! An order walks PENDING → RESERVED → FULFILLED, or ends REJECTED/CANCELLED.
//! The aggregate records what the processor decided (which reservations back
//! which line, how each commit went); it never talks to the ledger itself.

pub mod fulfillment;
pub mod order;
pub mod statistics;

pub use fulfillment::{FulfillmentKind, FulfillmentReport, LineFailure, LineOutcome, LineResult};
pub use order::{
    AbortFulfillment, CancelOrder, CompleteFulfillment, MarkReserved, MarkStockReleased,
    NewOrderLine, Order, OrderCancelled, OrderCommand, OrderEvent, OrderFulfilled,
    OrderFulfillmentFailed, OrderId, OrderLine, OrderPlaced, OrderRejected, OrderReserved,
    OrderStatus, OrderStockReleased, PlaceOrder, RejectOrder,
};
pub use statistics::{DateRange, OrderStatistics};
