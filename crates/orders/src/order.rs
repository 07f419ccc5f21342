use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_catalog::{ProductId, WarehouseId};
use wms_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use wms_events::Event;
use wms_ledger::StockKey;
use wms_reservations::ReservationId;

use crate::fulfillment::{FulfillmentKind, FulfillmentReport, LineFailure};

/// Order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for OrderId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Order status lifecycle. FULFILLED, REJECTED and CANCELLED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Reserved,
    Fulfilled,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Reserved => "reserved",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Fulfilled | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }
}

/// Order line as submitted. The warehouse is chosen per line by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
}

/// Order line: product, warehouse, quantity and the selling price captured
/// at placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: u64,
}

impl OrderLine {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.warehouse_id)
    }

    pub fn amount(&self) -> u64 {
        u64::try_from(self.quantity)
            .unwrap_or(0)
            .saturating_mul(self.unit_price)
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    /// One per line, in line order, once RESERVED.
    reservations: Vec<ReservationId>,
    rejection: Option<LineFailure>,
    fulfillment: Option<FulfillmentReport>,
    stock_released: bool,
    placed_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
    created: bool,
}

impl Order {
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            status: OrderStatus::Pending,
            lines: Vec::new(),
            reservations: Vec::new(),
            rejection: None,
            fulfillment: None,
            stock_released: false,
            placed_at: DateTime::<Utc>::MIN_UTC,
            updated_at: DateTime::<Utc>::MIN_UTC,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn reservations(&self) -> &[ReservationId] {
        &self.reservations
    }

    pub fn rejection(&self) -> Option<&LineFailure> {
        self.rejection.as_ref()
    }

    pub fn fulfillment(&self) -> Option<&FulfillmentReport> {
        self.fulfillment.as_ref()
    }

    pub fn stock_released(&self) -> bool {
        self.stock_released
    }

    pub fn placed_at(&self) -> DateTime<Utc> {
        self.placed_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_placed(&self) -> bool {
        self.created
    }

    pub fn total_units(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Order value at placement prices.
    pub fn total_amount(&self) -> u64 {
        self.lines
            .iter()
            .fold(0u64, |acc, l| acc.saturating_add(l.amount()))
    }

    /// Units that actually left the warehouse for this order.
    pub fn shipped_units(&self) -> i64 {
        match (&self.fulfillment, self.stock_released) {
            (Some(report), false) => report
                .committed()
                .filter_map(|o| self.line(o.line_no))
                .map(|l| l.quantity)
                .sum(),
            _ => 0,
        }
    }

    pub fn line(&self, line_no: u32) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    /// Whether a partially shipped, cancelled order still owes a stock release.
    pub fn needs_stock_release(&self) -> bool {
        self.status == OrderStatus::Cancelled
            && !self.stock_released
            && self
                .fulfillment
                .as_ref()
                .is_some_and(|r| r.kind == FulfillmentKind::Partial)
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub lines: Vec<NewOrderLine>,
    /// Selling price per line, in line order. Empty leaves the order unpriced.
    #[serde(default)]
    pub unit_prices: Vec<u64>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReserved {
    pub order_id: OrderId,
    pub reservations: Vec<ReservationId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectOrder {
    pub order_id: OrderId,
    pub failure: LineFailure,
    /// Reservations made for earlier lines and cancelled again.
    pub released: Vec<ReservationId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteFulfillment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteFulfillment {
    pub order_id: OrderId,
    pub report: FulfillmentReport,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AbortFulfillment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortFulfillment {
    pub order_id: OrderId,
    pub report: FulfillmentReport,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkStockReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkStockReleased {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    MarkReserved(MarkReserved),
    RejectOrder(RejectOrder),
    CompleteFulfillment(CompleteFulfillment),
    AbortFulfillment(AbortFulfillment),
    CancelOrder(CancelOrder),
    MarkStockReleased(MarkStockReleased),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub lines: Vec<OrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReserved {
    pub order_id: OrderId,
    pub reservations: Vec<ReservationId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRejected {
    pub order_id: OrderId,
    pub failure: LineFailure,
    pub released: Vec<ReservationId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderFulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFulfilled {
    pub order_id: OrderId,
    pub report: FulfillmentReport,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderFulfillmentFailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFulfillmentFailed {
    pub order_id: OrderId,
    pub report: FulfillmentReport,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderStockReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStockReleased {
    pub order_id: OrderId,
    pub line_nos: Vec<u32>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderReserved(OrderReserved),
    OrderRejected(OrderRejected),
    OrderFulfilled(OrderFulfilled),
    OrderFulfillmentFailed(OrderFulfillmentFailed),
    OrderCancelled(OrderCancelled),
    OrderStockReleased(OrderStockReleased),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::OrderReserved(_) => "orders.order.reserved",
            OrderEvent::OrderRejected(_) => "orders.order.rejected",
            OrderEvent::OrderFulfilled(_) => "orders.order.fulfilled",
            OrderEvent::OrderFulfillmentFailed(_) => "orders.order.fulfillment_failed",
            OrderEvent::OrderCancelled(_) => "orders.order.cancelled",
            OrderEvent::OrderStockReleased(_) => "orders.order.stock_released",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderReserved(e) => e.occurred_at,
            OrderEvent::OrderRejected(e) => e.occurred_at,
            OrderEvent::OrderFulfilled(e) => e.occurred_at,
            OrderEvent::OrderFulfillmentFailed(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
            OrderEvent::OrderStockReleased(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.status = OrderStatus::Pending;
                self.lines = e.lines.clone();
                self.placed_at = e.occurred_at;
                self.created = true;
            }
            OrderEvent::OrderReserved(e) => {
                self.status = OrderStatus::Reserved;
                self.reservations = e.reservations.clone();
            }
            OrderEvent::OrderRejected(e) => {
                self.status = OrderStatus::Rejected;
                self.rejection = Some(e.failure.clone());
                self.reservations = e.released.clone();
            }
            OrderEvent::OrderFulfilled(e) => {
                self.status = OrderStatus::Fulfilled;
                self.fulfillment = Some(e.report.clone());
            }
            OrderEvent::OrderFulfillmentFailed(e) => {
                self.status = OrderStatus::Cancelled;
                self.fulfillment = Some(e.report.clone());
            }
            OrderEvent::OrderCancelled(_) => {
                self.status = OrderStatus::Cancelled;
            }
            OrderEvent::OrderStockReleased(_) => {
                self.stock_released = true;
            }
        }

        self.updated_at = event.occurred_at();
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::MarkReserved(cmd) => self.handle_mark_reserved(cmd),
            OrderCommand::RejectOrder(cmd) => self.handle_reject(cmd),
            OrderCommand::CompleteFulfillment(cmd) => self.handle_complete(cmd),
            OrderCommand::AbortFulfillment(cmd) => self.handle_abort(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            OrderCommand::MarkStockReleased(cmd) => self.handle_mark_released(cmd),
        }
    }
}

impl Order {
    fn ensure_exists(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("order {order_id}")));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: OrderStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::invariant(format!(
                "cannot {action} order in status {}",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn ensure_report_matches(&self, report: &FulfillmentReport) -> Result<(), DomainError> {
        let matches = report.lines.len() == self.lines.len()
            && report
                .lines
                .iter()
                .zip(self.lines.iter().zip(&self.reservations))
                .all(|(o, (l, r))| o.line_no == l.line_no && o.reservation_id == *r);
        if !matches {
            return Err(DomainError::invariant(
                "fulfillment report does not match order lines",
            ));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("order must have at least one line"));
        }
        if !cmd.unit_prices.is_empty() && cmd.unit_prices.len() != cmd.lines.len() {
            return Err(DomainError::invariant(format!(
                "expected {} unit prices, got {}",
                cmd.lines.len(),
                cmd.unit_prices.len()
            )));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, line) in cmd.lines.iter().enumerate() {
            let line_no = u32::try_from(idx + 1)
                .map_err(|_| DomainError::validation("too many order lines"))?;
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: quantity must be positive"
                )));
            }
            lines.push(OrderLine {
                line_no,
                product_id: line.product_id,
                warehouse_id: line.warehouse_id,
                quantity: line.quantity,
                unit_price: cmd.unit_prices.get(idx).copied().unwrap_or(0),
            });
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_reserved(&self, cmd: &MarkReserved) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(OrderStatus::Pending, "reserve")?;
        if cmd.reservations.len() != self.lines.len() {
            return Err(DomainError::invariant(format!(
                "expected {} reservations, got {}",
                self.lines.len(),
                cmd.reservations.len()
            )));
        }

        Ok(vec![OrderEvent::OrderReserved(OrderReserved {
            order_id: cmd.order_id,
            reservations: cmd.reservations.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(OrderStatus::Pending, "reject")?;
        if self.line(cmd.failure.line_no).is_none() {
            return Err(DomainError::invariant(format!(
                "order has no line {}",
                cmd.failure.line_no
            )));
        }

        Ok(vec![OrderEvent::OrderRejected(OrderRejected {
            order_id: cmd.order_id,
            failure: cmd.failure.clone(),
            released: cmd.released.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(
        &self,
        cmd: &CompleteFulfillment,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(OrderStatus::Reserved, "fulfil")?;
        self.ensure_report_matches(&cmd.report)?;
        if cmd.report.kind != FulfillmentKind::Complete {
            return Err(DomainError::invariant(
                "order can only be fulfilled when every line committed",
            ));
        }

        Ok(vec![OrderEvent::OrderFulfilled(OrderFulfilled {
            order_id: cmd.order_id,
            report: cmd.report.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_abort(&self, cmd: &AbortFulfillment) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.ensure_status(OrderStatus::Reserved, "abort fulfilment of")?;
        self.ensure_report_matches(&cmd.report)?;
        if cmd.report.kind == FulfillmentKind::Complete {
            return Err(DomainError::invariant(
                "a complete fulfilment cannot be recorded as failed",
            ));
        }

        Ok(vec![OrderEvent::OrderFulfillmentFailed(
            OrderFulfillmentFailed {
                order_id: cmd.order_id,
                report: cmd.report.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "order is {} and cannot be cancelled",
                self.status.as_str()
            )));
        }

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_released(
        &self,
        cmd: &MarkStockReleased,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        if !self.needs_stock_release() {
            return Err(DomainError::invariant(
                "only a cancelled, partially shipped order can release stock, and only once",
            ));
        }
        let line_nos = self
            .fulfillment
            .iter()
            .flat_map(|r| r.committed())
            .map(|o| o.line_no)
            .collect();

        Ok(vec![OrderEvent::OrderStockReleased(OrderStockReleased {
            order_id: cmd.order_id,
            line_nos,
            occurred_at: cmd.occurred_at,
        })])
    }
}
