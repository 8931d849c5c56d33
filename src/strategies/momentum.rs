use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::candles::CandleBuffer;
use crate::indicators::volume::OBV;
use crate::indicators::{Indicator, ATR, EMA, RSI};
use crate::types::{Direction, FundingRateSample, Signal};

use super::Strategy;

/// Captures strong directional moves confirmed by volume flow (OBV). Best suited to the
/// high_vol_trend regime, where a grinding trend isn't enough but a volume-backed impulse is.
pub struct MomentumStrategy {
    rsi_period: usize,
    fast_ema: usize,
    slow_ema: usize,
    atr_period: usize,
}

impl MomentumStrategy {
    pub fn new() -> Self {
        Self {
            rsi_period: 14,
            fast_ema: 9,
            slow_ema: 21,
            atr_period: 14,
        }
    }
}

impl Default for MomentumStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Strategy for MomentumStrategy {
    fn name(&self) -> &str {
        "momentum"
    }

    fn min_candles_required(&self) -> usize {
        self.slow_ema + 20
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

        let mut rsi = RSI::new(self.rsi_period);
        let mut ema_fast = EMA::new(self.fast_ema);
        let mut ema_slow = EMA::new(self.slow_ema);
        let mut atr = ATR::new(self.atr_period);
        let mut obv = OBV::new();
        let mut prev_obv = Decimal::ZERO;

        for c in &series {
            rsi.update(c.close);
            ema_fast.update(c.close);
            ema_slow.update(c.close);
            atr.update(c.high, c.low, c.close);
            prev_obv = obv.value();
            obv.update(c.close, c.volume);
        }

        if !rsi.is_ready() || !ema_fast.is_ready() || !ema_slow.is_ready() || !atr.is_ready() {
            return None;
        }

        let price = series.last()?.close;
        let rsi_val = rsi.value()?;
        let fast = ema_fast.value()?;
        let slow = ema_slow.value()?;
        let atr_val = atr.value()?;

        let price_above_both = price > fast && price > slow && fast > slow;
        let price_below_both = price < fast && price < slow && fast < slow;
        let obv_rising = obv.value() > prev_obv;

        let direction = if price_above_both && rsi_val > dec!(55) && rsi_val < dec!(80) && obv_rising {
            Direction::Long
        } else if price_below_both && rsi_val < dec!(45) && rsi_val > dec!(20) && !obv_rising {
            Direction::Short
        } else {
            return None;
        };

        let confidence = 0.65;
        let (stop_loss, take_profit) = match direction {
            Direction::Long => (price - atr_val * dec!(2.4), price + atr_val * dec!(4.8)),
            Direction::Short => (price + atr_val * dec!(2.4), price - atr_val * dec!(4.8)),
            _ => unreachable!(),
        };

        Some(
            Signal::new(symbol, direction, self.name(), confidence)
                .with_levels(price, stop_loss, take_profit),
        )
    }
}
