use rust_decimal_macros::dec;

use crate::candles::CandleBuffer;
use crate::indicators::{DoubleEMA, Indicator};
use crate::types::{Direction, FundingRateSample, Signal};

use super::Strategy;

/// Plain fast/slow EMA crossover, no MACD confirmation — the lighter-weight companion to
/// trend_following for the low_vol_trend regime, where a grinding trend needs a lower bar
/// to enter than the strong-momentum setups.
pub struct EmaCrossoverStrategy {
    fast_period: usize,
    slow_period: usize,
}

impl EmaCrossoverStrategy {
    pub fn new() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
        }
    }
}

impl Default for EmaCrossoverStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Strategy for EmaCrossoverStrategy {
    fn name(&self) -> &str {
        "ema_crossover"
    }

    fn min_candles_required(&self) -> usize {
        self.slow_period + 5
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
        for c in &series {
            ema.update(c.close);
        }

        let crossover = ema.crossover()?;
        let price = series.last()?.close;
        let spread_pct = ema.spread_percentage()?.abs();
        if spread_pct < dec!(0.1) {
            return None;
        }

        let direction = if crossover { Direction::Long } else { Direction::Short };

        let stop_pct = dec!(0.01);
        let take_pct = dec!(0.02);
        let (stop_loss, take_profit) = match direction {
            Direction::Long => (price * (dec!(1) - stop_pct), price * (dec!(1) + take_pct)),
            Direction::Short => (price * (dec!(1) + stop_pct), price * (dec!(1) - take_pct)),
            _ => unreachable!(),
        };

        Some(
            Signal::new(symbol, direction, self.name(), 0.55)
                .with_levels(price, stop_loss, take_profit),
        )
    }
}
