use rust_decimal_macros::dec;

use crate::candles::CandleBuffer;
use crate::indicators::{Indicator, ATR};
use crate::types::{Direction, FundingRateSample, Signal};

use super::Strategy;

/// Trades breaks above/below the recent consolidation range. Paired with
/// trend_following and momentum in the high_vol_trend regime.
pub struct BreakoutStrategy {
    lookback: usize,
    atr_period: usize,
}

impl BreakoutStrategy {
    pub fn new() -> Self {
        Self {
            lookback: 20,
            atr_period: 14,
        }
    }
}

impl Default for BreakoutStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Strategy for BreakoutStrategy {
    fn name(&self) -> &str {
        "breakout"
    }

    fn min_candles_required(&self) -> usize {
        self.lookback + self.atr_period
    }

    async fn generate_signal(
        &self,
        symbol: &str,
        candles: &CandleBuffer,
        _funding: Option<&[FundingRateSample]>,
    ) -> Option<Signal> {
        let series = candles.get(symbol).await;
        if series.len() < self.min_candles_required() {
            return None;
        }

        let mut atr = ATR::new(self.atr_period);
        for c in &series {
            atr.update(c.high, c.low, c.close);
        }
        if !atr.is_ready() {
            return None;
        }
        let atr_val = atr.value()?;

        let current = series.last()?;
        let window = &series[series.len() - self.lookback - 1..series.len() - 1];
        let highest = window.iter().map(|c| c.high).max()?;
        let lowest = window.iter().map(|c| c.low).min()?;

        let direction = if current.close > highest {
            Direction::Long
        } else if current.close < lowest {
            Direction::Short
        } else {
            return None;
        };

        let price = current.close;
        let threshold = atr_val * dec!(1.5);
        let (stop_loss, take_profit) = match direction {
            Direction::Long => (highest - threshold, price + threshold * dec!(2)),
            Direction::Short => (lowest + threshold, price - threshold * dec!(2)),
            _ => unreachable!(),
        };

        Some(
            Signal::new(symbol, direction, self.name(), 0.65)
                .with_levels(price, stop_loss, take_profit),
        )
    }
}
