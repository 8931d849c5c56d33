use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TimeFrame;

/// An immutable closed (or provisional) candle. Keyed by `(symbol, open_time)` within a
/// timeframe by the candle buffer, which deduplicates re-emissions sharing an `open_time`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub is_closed: bool,
}

impl Candle {
    pub fn body_size(&self) -> Decimal {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn typical_price(&self) -> Decimal {
        (self.high + self.low + self.close) / Decimal::from(3)
    }

    pub fn change_percentage(&self) -> Decimal {
        if self.open.is_zero() {
            return Decimal::ZERO;
        }
        ((self.close - self.open) / self.open) * Decimal::from(100)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub volume_24h: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    pub fn spread_bps(&self) -> Decimal {
        if self.bid.is_zero() {
            return Decimal::ZERO;
        }
        (self.spread() / self.bid) * Decimal::from(10_000)
    }

    pub fn mid_price(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::from(2)
    }
}

/// A funding-rate observation for one symbol at one settlement timestamp.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FundingRateSample {
    pub rate: Decimal,
    pub timestamp: DateTime<Utc>,
}
