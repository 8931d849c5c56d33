use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::candles::CandleBuffer;
use crate::indicators::{Indicator, ATR, DoubleEMA, MACD};
use crate::types::{Direction, FundingRateSample, Signal};

use super::Strategy;

/// Captures sustained directional moves using EMA crossovers confirmed by MACD.
/// Best suited to the high_vol_trend and low_vol_trend regimes.
pub struct TrendFollowingStrategy {
    fast_period: usize,
    slow_period: usize,
    atr_period: usize,
    min_trend_strength_pct: Decimal,
}

impl TrendFollowingStrategy {
    pub fn new() -> Self {
        Self {
            fast_period: 9,
            slow_period: 21,
            atr_period: 14,
            min_trend_strength_pct: dec!(0.5),
        }
    }
}

impl Default for TrendFollowingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Strategy for TrendFollowingStrategy {
    fn name(&self) -> &str {
        "trend_following"
    }

    fn min_candles_required(&self) -> usize {
        self.slow_period + 30
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

        let mut ema = DoubleEMA::new(self.fast_period, self.slow_period);
        let mut macd = MACD::default_params();
        let mut atr = ATR::new(self.atr_period);
        for c in &series {
            ema.update(c.close);
            macd.update(c.close);
            atr.update(c.high, c.low, c.close);
        }

        if !ema.is_ready() || !macd.is_ready() || !atr.is_ready() {
            return None;
        }

        let price = series.last()?.close;
        let fast = ema.fast_value()?;
        let slow = ema.slow_value()?;
        let spread_pct = ema.spread_percentage()?;
        let atr_val = atr.value()?;
        let trend = macd.trend()?;

        if spread_pct.abs() < self.min_trend_strength_pct {
            return None;
        }

        let is_bullish = fast > slow;
        let macd_confirms = if is_bullish { trend.is_bullish() } else { trend.is_bearish() };
        if !macd_confirms {
            return None;
        }

        let direction = if is_bullish { Direction::Long } else { Direction::Short };
        let confidence = (0.5 + spread_pct.abs().to_f64().unwrap_or(0.0) / 100.0).min(0.95);

        let (stop_loss, take_profit) = if is_bullish {
            (price - atr_val * dec!(1.5), price + atr_val * dec!(3.0))
        } else {
            (price + atr_val * dec!(1.5), price - atr_val * dec!(3.0))
        };

        Some(
            Signal::new(symbol, direction, self.name(), confidence)
                .with_levels(price, stop_loss, take_profit),
        )
    }
}
