//! Multi-timeframe confirmation: gates an entry signal against the higher-timeframe trend
//! before it reaches the risk manager.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::candles::CandleBuffer;
use crate::indicators::{Indicator, ADX, EMA};
use crate::types::{Direction, TimeFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MtfVerdict {
    Confirmed,
    Rejected,
    /// Not enough higher-timeframe history yet; the caller's policy decides whether that
    /// blocks or passes the signal.
    InsufficientData,
}

/// Confirms a directional signal against EMA50/EMA200 alignment and an ADX floor on the
/// symbol's higher timeframe. The ADX floor relaxes (×0.8, never below 10) once the EMA
/// alignment itself already agrees with the signal's direction, so a clean trend isn't
/// rejected purely for modest strength.
pub struct MtfConfirmer {
    higher_timeframe: TimeFrame,
    adx_min: Decimal,
    min_bars: usize,
}

impl MtfConfirmer {
    pub fn new(higher_timeframe: TimeFrame, adx_min: Decimal, min_bars: usize) -> Self {
        Self { higher_timeframe, adx_min, min_bars }
    }

    pub fn higher_timeframe(&self) -> TimeFrame {
        self.higher_timeframe
    }

    pub async fn confirm(&self, symbol: &str, direction: Direction, higher_candles: &CandleBuffer) -> MtfVerdict {
        let series = higher_candles.get(symbol).await;
        if series.len() < self.min_bars {
            return MtfVerdict::InsufficientData;
        }

        let mut ema50 = EMA::new(50);
        let mut ema200 = EMA::new(200.min(self.min_bars));
        let mut adx = ADX::new(14);
        for c in &series {
            ema50.update(c.close);
            ema200.update(c.close);
            adx.update(c.high, c.low, c.close);
        }

        let (fast, slow, adx_val) = match (ema50.value(), ema200.value(), adx.value()) {
            (Some(f), Some(s), Some(a)) => (f, s, a),
            _ => return MtfVerdict::InsufficientData,
        };

        let aligned = match direction {
            Direction::Long => fast > slow,
            Direction::Short => fast < slow,
            Direction::CloseLong | Direction::CloseShort | Direction::Neutral => return MtfVerdict::Confirmed,
        };

        let floor = if aligned {
            (self.adx_min * dec!(0.8)).max(dec!(10))
        } else {
            self.adx_min
        };

        if aligned && adx_val >= floor {
            MtfVerdict::Confirmed
        } else {
            MtfVerdict::Rejected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn trending_candles(n: usize, start: Decimal, step: Decimal) -> Vec<crate::types::Candle> {
        let mut out = Vec::with_capacity(n);
        let mut price = start;
        let mut t = Utc::now();
        for _ in 0..n {
            out.push(crate::types::Candle {
                symbol: "BTCUSDT".to_string(),
                timeframe: TimeFrame::H1,
                open_time: t,
                close_time: t + Duration::hours(1),
                open: price,
                high: price + dec!(5),
                low: price - dec!(5),
                close: price,
                volume: dec!(100),
                is_closed: true,
            });
            price += step;
            t += Duration::hours(1);
        }
        out
    }

    #[tokio::test]
    async fn insufficient_data_when_below_min_bars() {
        let confirmer = MtfConfirmer::new(TimeFrame::H1, dec!(20), 220);
        let buffer = CandleBuffer::new(300);
        buffer.initialize("BTCUSDT", trending_candles(50, dec!(100), dec!(1))).await;
        let verdict = confirmer.confirm("BTCUSDT", Direction::Long, &buffer).await;
        assert_eq!(verdict, MtfVerdict::InsufficientData);
    }

    #[tokio::test]
    async fn confirms_aligned_uptrend() {
        let confirmer = MtfConfirmer::new(TimeFrame::H1, dec!(20), 220);
        let buffer = CandleBuffer::new(300);
        buffer.initialize("BTCUSDT", trending_candles(250, dec!(100), dec!(2))).await;
        let verdict = confirmer.confirm("BTCUSDT", Direction::Long, &buffer).await;
        assert_eq!(verdict, MtfVerdict::Confirmed);
    }

    #[tokio::test]
    async fn rejects_counter_trend_direction() {
        let confirmer = MtfConfirmer::new(TimeFrame::H1, dec!(20), 220);
        let buffer = CandleBuffer::new(300);
        buffer.initialize("BTCUSDT", trending_candles(250, dec!(100), dec!(2))).await;
        let verdict = confirmer.confirm("BTCUSDT", Direction::Short, &buffer).await;
        assert_eq!(verdict, MtfVerdict::Rejected);
    }
}
