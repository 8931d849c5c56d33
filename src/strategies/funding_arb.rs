use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::candles::CandleBuffer;
use crate::types::{Direction, FundingRateSample, Signal};

use super::Strategy;

/// Takes the side that collects funding when the rate has been persistently skewed: a
/// strongly positive funding rate means longs pay shorts, so this strategy goes short to
/// collect it (and the reverse for a strongly negative rate). Reserved for the range
/// regimes where directional strategies have no edge and funding carry dominates PnL.
pub struct FundingRateArbStrategy {
    lookback_samples: usize,
    entry_threshold: Decimal,
    catastrophe_stop_pct: Decimal,
}

impl FundingRateArbStrategy {
    pub fn new() -> Self {
        Self {
            lookback_samples: 9,
            entry_threshold: dec!(0.0003),
            catastrophe_stop_pct: dec!(0.02),
        }
    }
}

impl Default for FundingRateArbStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Strategy for FundingRateArbStrategy {
    fn name(&self) -> &str {
        "funding_rate_arb"
    }

    fn min_candles_required(&self) -> usize {
        1
    }

    async fn generate_signal(
        &self,
        symbol: &str,
        candles: &CandleBuffer,
        funding: Option<&[FundingRateSample]>,
    ) -> Option<Signal> {
        let samples = funding?;
        if samples.len() < self.lookback_samples {
            return None;
        }

        let recent = &samples[samples.len() - self.lookback_samples..];
        let avg_rate: Decimal =
            recent.iter().map(|s| s.rate).sum::<Decimal>() / Decimal::from(recent.len() as u32);

        if avg_rate.abs() < self.entry_threshold {
            return None;
        }

        let direction = if avg_rate > Decimal::ZERO { Direction::Short } else { Direction::Long };
        let series = candles.get(symbol).await;
        let price = series.last()?.close;

        let ratio: Decimal = (avg_rate.abs() / self.entry_threshold).min(dec!(3));
        let confidence = (0.55 + ratio.to_f64().unwrap_or(1.0) * 0.1).min(0.9);

        // No take-profit target: this is a carry position closed by the exit-guard's
        // max-hold rule or a reversal of the funding skew, not a price-level exit. It
        // still carries a wide catastrophe stop so the risk manager can size and gate it.
        let stop_distance = price * self.catastrophe_stop_pct;
        let stop_loss = match direction {
            Direction::Long => price - stop_distance,
            _ => price + stop_distance,
        };

        let mut signal = Signal::new(symbol, direction, self.name(), confidence);
        signal.entry_price = Some(price);
        signal.stop_loss = Some(stop_loss);
        signal = signal.with_metadata("funding_rate_avg", avg_rate.to_f64().unwrap_or(0.0));
        Some(signal)
    }
}
