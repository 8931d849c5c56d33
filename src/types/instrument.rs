use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cached per-symbol instrument rules used to clamp/truncate orders before submission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub qty_step: Decimal,
    pub tick_size: Decimal,
    pub max_leverage: Decimal,
}

impl InstrumentInfo {
    /// `q := min(q, max_qty)` then `q := floor(q / step) * step`.
    pub fn normalize_quantity(&self, quantity: Decimal) -> Decimal {
        let capped = quantity.min(self.max_qty);
        if self.qty_step.is_zero() {
            return capped;
        }
        (capped / self.qty_step).floor() * self.qty_step
    }
}

/// `current_equity`, `peak_equity` (monotonic non-decreasing), `daily_start_equity`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityState {
    pub current_equity: Decimal,
    pub peak_equity: Decimal,
    pub daily_start_equity: Decimal,
}

impl EquityState {
    pub fn new(starting_equity: Decimal) -> Self {
        Self {
            current_equity: starting_equity,
            peak_equity: starting_equity,
            daily_start_equity: starting_equity,
        }
    }

    /// Updates current equity and advances `peak_equity` if a new high was reached. Returns the
    /// resulting drawdown fraction `(peak - current) / peak`.
    pub fn update(&mut self, new_equity: Decimal) -> Decimal {
        self.current_equity = new_equity;
        if new_equity > self.peak_equity {
            self.peak_equity = new_equity;
        }
        self.drawdown_pct()
    }

    pub fn drawdown_pct(&self) -> Decimal {
        if self.peak_equity.is_zero() {
            return Decimal::ZERO;
        }
        ((self.peak_equity - self.current_equity) / self.peak_equity).max(Decimal::ZERO)
    }

    pub fn daily_loss_pct(&self) -> Decimal {
        if self.daily_start_equity.is_zero() {
            return Decimal::ZERO;
        }
        ((self.daily_start_equity - self.current_equity) / self.daily_start_equity).max(Decimal::ZERO)
    }

    pub fn reset_daily(&mut self) {
        self.daily_start_equity = self.current_equity;
    }
}
