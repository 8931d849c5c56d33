use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::candles::CandleBuffer;
use crate::indicators::{stddev, Indicator, ATR};
use crate::types::{Direction, FundingRateSample, Signal};

use super::Strategy;

/// Places counter-trend entries at the edges of a detected trading range, sized off
/// recent volatility rather than a fixed band. Best suited to the range regimes, where
/// trend-following strategies whipsaw.
pub struct GridTradingStrategy {
    range_period: usize,
    atr_period: usize,
    grid_spacing_atr_mult: Decimal,
}

impl GridTradingStrategy {
    pub fn new() -> Self {
        Self {
            range_period: 40,
            atr_period: 14,
            grid_spacing_atr_mult: dec!(1.0),
        }
    }
}

impl Default for GridTradingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Strategy for GridTradingStrategy {
    fn name(&self) -> &str {
        "grid_trading"
    }

    fn min_candles_required(&self) -> usize {
        self.range_period + self.atr_period
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

        let window = &series[series.len() - self.range_period..];
        let closes: Vec<Decimal> = window.iter().map(|c| c.close).collect();
        let mean = closes.iter().sum::<Decimal>() / Decimal::from(closes.len() as u32);
        let std_dev = stddev(&closes, self.range_period)?;

        // Require the range to actually be a range: volatility small relative to price.
        if !mean.is_zero() && (std_dev / mean) > dec!(0.04) {
            return None;
        }

        let price = series.last()?.close;
        let grid_step = atr_val * self.grid_spacing_atr_mult;
        let lower_rail = mean - std_dev;
        let upper_rail = mean + std_dev;

        let direction = if price <= lower_rail {
            Direction::Long
        } else if price >= upper_rail {
            Direction::Short
        } else {
            return None;
        };

        let (stop_loss, take_profit) = match direction {
            Direction::Long => (price - grid_step, mean),
            Direction::Short => (price + grid_step, mean),
            _ => unreachable!(),
        };

        Some(
            Signal::new(symbol, direction, self.name(), 0.6)
                .with_levels(price, stop_loss, take_profit),
        )
    }
}
