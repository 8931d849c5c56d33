#![allow(dead_code)]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side on the venue, as opposed to [`Direction`] which is the strategy's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl TimeFrame {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::M1 => "1",
            TimeFrame::M5 => "5",
            TimeFrame::M15 => "15",
            TimeFrame::H1 => "60",
            TimeFrame::H4 => "240",
            TimeFrame::D1 => "D",
        }
    }

    pub fn to_minutes(&self) -> u64 {
        match self {
            TimeFrame::M1 => 1,
            TimeFrame::M5 => 5,
            TimeFrame::M15 => 15,
            TimeFrame::H1 => 60,
            TimeFrame::H4 => 240,
            TimeFrame::D1 => 1440,
        }
    }

    pub fn to_milliseconds(&self) -> i64 {
        self.to_minutes() as i64 * 60 * 1000
    }

    /// The higher timeframe used by the multi-timeframe confirmer for a given base timeframe.
    pub fn higher(&self) -> TimeFrame {
        match self {
            TimeFrame::M1 | TimeFrame::M5 | TimeFrame::M15 => TimeFrame::H1,
            TimeFrame::H1 => TimeFrame::H4,
            TimeFrame::H4 | TimeFrame::D1 => TimeFrame::D1,
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    Paper,
    Live,
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Paper => write!(f, "paper"),
            TradingMode::Live => write!(f, "live"),
        }
    }
}

/// A strategy's verdict for a symbol on a single window. See `Signal` for the full record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
    CloseLong,
    CloseShort,
    Neutral,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
            Direction::CloseLong => "close_long",
            Direction::CloseShort => "close_short",
            Direction::Neutral => "neutral",
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, Direction::Long | Direction::Short)
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Direction::CloseLong | Direction::CloseShort)
    }

    /// Maps a direction onto the order side and reduce-only flag the orchestrator submits.
    pub fn to_order_params(&self) -> (Side, bool) {
        match self {
            Direction::Long => (Side::Buy, false),
            Direction::Short => (Side::Sell, false),
            Direction::CloseLong => (Side::Sell, true),
            Direction::CloseShort => (Side::Buy, true),
            Direction::Neutral => (Side::Buy, false),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Market-regime classification used by the strategy selector to pick eligible strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketRegime {
    HighVolTrend,
    LowVolTrend,
    HighVolRange,
    LowVolRange,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::HighVolTrend => "high_vol_trend",
            MarketRegime::LowVolTrend => "low_vol_trend",
            MarketRegime::HighVolRange => "high_vol_range",
            MarketRegime::LowVolRange => "low_vol_range",
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
