use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Direction;

/// A strategy's verdict for a symbol on one window. Strategies produce at most one of these
/// per call and never perform I/O while building it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: Direction,
    pub confidence: f64,
    pub strategy_name: String,
    pub entry_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    /// Heterogeneous numeric telemetry (spread_bps, liquidity_score, MTF features, ...).
    pub metadata: HashMap<String, f64>,
}

impl Signal {
    pub fn new(symbol: impl Into<String>, direction: Direction, strategy_name: impl Into<String>, confidence: f64) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            confidence: confidence.clamp(0.0, 1.0),
            strategy_name: strategy_name.into(),
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_levels(mut self, entry_price: Decimal, stop_loss: Decimal, take_profit: Decimal) -> Self {
        self.entry_price = Some(entry_price);
        self.stop_loss = Some(stop_loss);
        self.take_profit = Some(take_profit);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn metadata_get(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).copied()
    }

    /// Builds the synthetic signal the reconciler emits when it detects an externally-closed
    /// position; it carries no entry/stop levels since it only ever drives the close path.
    pub fn exchange_close(symbol: impl Into<String>, direction: Direction) -> Self {
        Self::new(symbol, direction, "exchange_close", 1.0)
    }
}

/// The risk manager's verdict for a candidate [`Signal`]. Invariant: when `approved` is true,
/// `quantity > 0` and `stop_loss > 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecision {
    pub approved: bool,
    pub quantity: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub reason: String,
}

impl RiskDecision {
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            quantity: Decimal::ZERO,
            stop_loss: None,
            take_profit: None,
            reason: reason.into(),
        }
    }

    pub fn approve(quantity: Decimal, stop_loss: Option<Decimal>, take_profit: Option<Decimal>, reason: impl Into<String>) -> Self {
        Self {
            approved: true,
            quantity,
            stop_loss,
            take_profit,
            reason: reason.into(),
        }
    }
}
