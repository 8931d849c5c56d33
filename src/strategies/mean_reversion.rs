use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::candles::CandleBuffer;
use crate::indicators::{Indicator, ATR, BollingerBands, RSI};
use crate::types::{Direction, FundingRateSample, Signal};

use super::Strategy;

/// Trades reversals when price extends too far from the mean. Best suited to the
/// high_vol_range and low_vol_range regimes.
pub struct MeanReversionStrategy {
    bb_period: usize,
    rsi_period: usize,
    atr_period: usize,
    rsi_oversold: Decimal,
    rsi_overbought: Decimal,
}

impl MeanReversionStrategy {
    pub fn new() -> Self {
        Self {
            bb_period: 20,
            rsi_period: 14,
            atr_period: 14,
            rsi_oversold: dec!(30),
            rsi_overbought: dec!(70),
        }
    }
}

impl Default for MeanReversionStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Strategy for MeanReversionStrategy {
    fn name(&self) -> &str {
        "mean_reversion"
    }

    fn min_candles_required(&self) -> usize {
        self.bb_period + 20
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

        let mut bb = BollingerBands::new(self.bb_period, dec!(2));
        let mut rsi = RSI::new(self.rsi_period);
        let mut atr = ATR::new(self.atr_period);
        for c in &series {
            bb.update(c.close);
            rsi.update(c.close);
            atr.update(c.high, c.low, c.close);
        }

        if !bb.is_ready() || !rsi.is_ready() || !atr.is_ready() {
            return None;
        }

        let price = series.last()?.close;
        let upper = bb.upper()?;
        let lower = bb.lower()?;
        let middle = bb.middle()?;
        let rsi_val = rsi.value()?;
        let atr_val = atr.value()?;

        let at_lower = price <= lower;
        let at_upper = price >= upper;
        let oversold = rsi_val <= self.rsi_oversold;
        let overbought = rsi_val >= self.rsi_overbought;

        let (direction, confidence) = if at_lower && oversold {
            (Direction::Long, 0.8)
        } else if at_upper && overbought {
            (Direction::Short, 0.8)
        } else {
            return None;
        };

        let (stop_loss, take_profit) = match direction {
            Direction::Long => (lower - atr_val, middle + (upper - middle) * dec!(0.5)),
            Direction::Short => (upper + atr_val, middle - (middle - lower) * dec!(0.5)),
            _ => unreachable!(),
        };

        Some(
            Signal::new(symbol, direction, self.name(), confidence)
                .with_levels(price, stop_loss, take_profit),
        )
    }
}
