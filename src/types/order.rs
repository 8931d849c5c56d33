use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "Market",
            OrderType::Limit => "Limit",
        }
    }
}

/// Hedge-mode position slot selector: 0 = one-way mode, 1 = long side, 2 = short side.
pub type PositionIdx = u8;

/// Intent submitted to the venue. `client_order_id` is the sole idempotency key across retries;
/// the Order Manager assigns one if the caller leaves it empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub reduce_only: bool,
    pub position_idx: PositionIdx,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: Side, quantity: Decimal, reduce_only: bool) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_loss: None,
            take_profit: None,
            reduce_only,
            position_idx: 0,
        }
    }

    pub fn with_client_order_id(mut self, client_order_id: impl Into<String>) -> Self {
        self.client_order_id = client_order_id.into();
        self
    }

    pub fn with_stops(mut self, stop_loss: Option<Decimal>, take_profit: Option<Decimal>) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }
}

/// Local shadow of a live order. `pending_create -> open -> partially_filled -> done`, or
/// `pending_create -> done` on submit failure, or `open -> pending_cancel -> done` on cancel.
/// `done` is a terminal state: an `InFlightOrder` reaches it at most once and never leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InFlightStatus {
    PendingCreate,
    Open,
    PartiallyFilled,
    PendingCancel,
    Done,
}

impl InFlightStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InFlightStatus::Done)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InFlightOrder {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub status: InFlightStatus,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub average_fill_price: Option<Decimal>,
    pub fee: Decimal,
    pub reduce_only: bool,
    pub strategy_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InFlightOrder {
    pub fn new(request: &OrderRequest, strategy_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            client_order_id: request.client_order_id.clone(),
            exchange_order_id: None,
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            status: InFlightStatus::PendingCreate,
            quantity: request.quantity,
            filled_quantity: Decimal::ZERO,
            average_fill_price: None,
            fee: Decimal::ZERO,
            reduce_only: request.reduce_only,
            strategy_name: strategy_name.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    pub fn touch(&mut self, status: InFlightStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Venue acknowledgement merged into an [`InFlightOrder`] by `update_from_exchange`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub exchange_order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub status: ExchangeOrderStatus,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub average_fill_price: Option<Decimal>,
    pub fee: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeOrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}
