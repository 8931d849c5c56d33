use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::PositionIdx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
    None,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
            PositionSide::None => "none",
        }
    }
}

/// Venue-confirmed position. Invariant enforced by [`crate::positions::PositionManager`]:
/// a symbol appears in the position map iff `size > 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub liquidation_price: Option<Decimal>,
    pub leverage: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub position_idx: PositionIdx,
    /// When this process first observed the position open; drives the max-hold exit guard.
    #[serde(default = "Utc::now")]
    pub first_seen_at: DateTime<Utc>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.size > Decimal::ZERO
    }

    pub fn notional_value(&self) -> Decimal {
        self.mark_price * self.size
    }

    pub fn unrealized_pnl_pct_of_equity(&self, equity: Decimal) -> Decimal {
        if equity.is_zero() {
            return Decimal::ZERO;
        }
        self.unrealized_pnl / equity
    }
}
