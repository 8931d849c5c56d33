use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::{PositionSizingMethod, RiskSettings};

/// Translates a risk budget into an order quantity under one of three sizing methods, always
/// capped by the account's leverage limit.
pub struct PositionSizer {
    method: PositionSizingMethod,
    max_risk_per_trade: Decimal,
    max_leverage: Decimal,
}

impl PositionSizer {
    pub fn new(risk: &RiskSettings) -> Self {
        Self {
            method: risk.sizing_method,
            max_risk_per_trade: risk.max_risk_per_trade,
            max_leverage: risk.max_leverage,
        }
    }

    /// Returns the quantity to trade, or `Decimal::ZERO` if no safe size exists (e.g. the
    /// stop distance is zero, or equity/price are non-positive).
    pub fn size(
        &self,
        equity: Decimal,
        entry_price: Decimal,
        stop_loss: Decimal,
        win_rate: Option<Decimal>,
        winloss_ratio: Option<Decimal>,
        atr: Option<Decimal>,
    ) -> Decimal {
        if equity <= Decimal::ZERO || entry_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let stop_distance = match self.method {
            PositionSizingMethod::Volatility => {
                let atr = atr.unwrap_or(Decimal::ZERO);
                if atr <= Decimal::ZERO {
                    (entry_price - stop_loss).abs()
                } else {
                    atr * dec!(2)
                }
            }
            _ => (entry_price - stop_loss).abs(),
        };

        if stop_distance <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let risk_fraction = match self.method {
            PositionSizingMethod::HalfKelly => self.half_kelly_fraction(win_rate, winloss_ratio),
            PositionSizingMethod::FixedFractional | PositionSizingMethod::Volatility => {
                self.max_risk_per_trade
            }
        };

        let risk_amount = equity * risk_fraction;
        let qty = risk_amount / stop_distance;

        let max_qty_by_leverage = (equity * self.max_leverage) / entry_price;
        qty.min(max_qty_by_leverage).max(Decimal::ZERO)
    }

    /// `kelly = win_rate - (1 - win_rate) / winloss_ratio`, clamped to `[0, 0.25]` and halved.
    /// Falls back to the fixed-fractional risk amount when win-rate history is unavailable.
    fn half_kelly_fraction(&self, win_rate: Option<Decimal>, winloss_ratio: Option<Decimal>) -> Decimal {
        let (win_rate, winloss_ratio) = match (win_rate, winloss_ratio) {
            (Some(w), Some(r)) if r > Decimal::ZERO => (w, r),
            _ => return self.max_risk_per_trade,
        };

        let kelly = win_rate - (Decimal::ONE - win_rate) / winloss_ratio;
        let clamped = kelly.max(Decimal::ZERO).min(dec!(0.25));
        clamped / dec!(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(method: PositionSizingMethod) -> RiskSettings {
        let mut s = RiskSettings::default();
        s.sizing_method = method;
        s.max_risk_per_trade = dec!(0.02);
        s.max_leverage = dec!(3.0);
        s
    }

    #[test]
    fn fixed_fractional_sizes_by_risk_amount_over_stop_distance() {
        let sizer = PositionSizer::new(&settings(PositionSizingMethod::FixedFractional));
        let qty = sizer.size(dec!(10000), dec!(100), dec!(98), None, None, None);
        // risk_amount = 10000 * 0.02 = 200; stop_distance = 2 -> qty = 100
        assert_eq!(qty, dec!(100));
    }

    #[test]
    fn fixed_fractional_caps_at_leverage_limit() {
        let sizer = PositionSizer::new(&settings(PositionSizingMethod::FixedFractional));
        // tiny stop distance would otherwise produce a huge quantity
        let qty = sizer.size(dec!(10000), dec!(100), dec!(99.99), None, None, None);
        let max_qty = (dec!(10000) * dec!(3.0)) / dec!(100);
        assert_eq!(qty, max_qty);
    }

    #[test]
    fn half_kelly_falls_back_without_history() {
        let sizer = PositionSizer::new(&settings(PositionSizingMethod::HalfKelly));
        let qty = sizer.size(dec!(10000), dec!(100), dec!(98), None, None, None);
        assert_eq!(qty, dec!(100));
    }

    #[test]
    fn half_kelly_scales_with_edge() {
        let sizer = PositionSizer::new(&settings(PositionSizingMethod::HalfKelly));
        // win_rate 0.6, winloss_ratio 2 -> kelly = 0.6 - 0.4/2 = 0.4, clamp 0.25, half = 0.125
        let qty = sizer.size(dec!(10000), dec!(100), dec!(98), Some(dec!(0.6)), Some(dec!(2)), None);
        let expected = (dec!(10000) * dec!(0.125)) / dec!(2);
        assert_eq!(qty, expected);
    }

    #[test]
    fn zero_stop_distance_yields_zero_quantity() {
        let sizer = PositionSizer::new(&settings(PositionSizingMethod::FixedFractional));
        let qty = sizer.size(dec!(10000), dec!(100), dec!(100), None, None, None);
        assert_eq!(qty, Decimal::ZERO);
    }
}
