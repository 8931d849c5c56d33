use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::config::RiskSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    MaxDrawdown,
    DailyLoss,
}

#[derive(Debug)]
struct State {
    peak_equity: Decimal,
    daily_start_equity: Decimal,
    halt: Option<HaltReason>,
    halt_detail: String,
    soft_stopped: bool,
}

/// Tracks monotonic peak equity and the daily baseline; halts trading on a hard drawdown or
/// daily-loss breach, and soft-stops (raising the confidence bar) before that.
pub struct DrawdownMonitor {
    max_drawdown_pct: Decimal,
    max_daily_loss_pct: Decimal,
    soft_stop_threshold_pct: Decimal,
    state: RwLock<State>,
}

impl DrawdownMonitor {
    pub fn new(risk: &RiskSettings, starting_equity: Decimal) -> Self {
        Self {
            max_drawdown_pct: risk.max_drawdown_pct,
            max_daily_loss_pct: risk.max_daily_loss_pct,
            soft_stop_threshold_pct: risk.soft_stop_threshold_pct,
            state: RwLock::new(State {
                peak_equity: starting_equity,
                daily_start_equity: starting_equity,
                halt: None,
                halt_detail: String::new(),
                soft_stopped: false,
            }),
        }
    }

    /// Updates peak equity (if `equity` is a new high) and recomputes drawdown/daily-loss,
    /// halting or soft-stopping as needed. Returns the current drawdown percentage.
    pub async fn update_equity(&self, equity: Decimal) -> Decimal {
        let mut state = self.state.write().await;
        if equity > state.peak_equity {
            state.peak_equity = equity;
        }

        let drawdown_pct = if state.peak_equity.is_zero() {
            Decimal::ZERO
        } else {
            (state.peak_equity - equity) / state.peak_equity
        };

        let daily_loss_pct = if state.daily_start_equity.is_zero() {
            Decimal::ZERO
        } else {
            ((state.daily_start_equity - equity) / state.daily_start_equity).max(Decimal::ZERO)
        };

        if drawdown_pct >= self.max_drawdown_pct {
            state.halt = Some(HaltReason::MaxDrawdown);
            state.halt_detail = format!("max_drawdown_breached: {:.4} >= {}", drawdown_pct, self.max_drawdown_pct);
        } else if daily_loss_pct >= self.max_daily_loss_pct {
            state.halt = Some(HaltReason::DailyLoss);
            state.halt_detail = format!("daily_loss_breached: {:.4} >= {}", daily_loss_pct, self.max_daily_loss_pct);
        }

        state.soft_stopped = daily_loss_pct >= self.soft_stop_threshold_pct * self.max_daily_loss_pct;

        drawdown_pct
    }

    pub async fn is_halted(&self) -> bool {
        self.state.read().await.halt.is_some()
    }

    pub async fn halt_kind(&self) -> Option<HaltReason> {
        self.state.read().await.halt
    }

    /// Machine-readable detail string for the active halt, e.g. `"max_drawdown_breached: 0.1600 >= 0.15"`.
    pub async fn halt_reason(&self) -> Option<String> {
        let state = self.state.read().await;
        state.halt.map(|_| state.halt_detail.clone())
    }

    pub async fn is_soft_stopped(&self) -> bool {
        self.state.read().await.soft_stopped
    }

    /// Clears the daily-only halt and both equity baselines; called at the start of a new
    /// trading day.
    pub async fn reset_daily(&self, equity: Decimal) {
        let mut state = self.state.write().await;
        state.daily_start_equity = equity;
        state.soft_stopped = false;
        if state.halt == Some(HaltReason::DailyLoss) {
            state.halt = None;
            state.halt_detail.clear();
        }
    }

    /// Clears every halt reason. Operational override, not part of the automatic gate flow.
    pub async fn resume_trading(&self) {
        let mut state = self.state.write().await;
        state.halt = None;
        state.halt_detail.clear();
        state.soft_stopped = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn settings() -> RiskSettings {
        let mut s = RiskSettings::default();
        s.max_drawdown_pct = dec!(0.15);
        s.max_daily_loss_pct = dec!(0.05);
        s.soft_stop_threshold_pct = dec!(0.8);
        s
    }

    #[tokio::test]
    async fn halts_on_max_drawdown_breach() {
        let monitor = DrawdownMonitor::new(&settings(), dec!(10000));
        monitor.update_equity(dec!(10000)).await;
        monitor.update_equity(dec!(8400)).await;
        assert!(monitor.is_halted().await);
        assert_eq!(monitor.halt_kind().await, Some(HaltReason::MaxDrawdown));
        assert!(monitor.halt_reason().await.unwrap().contains("max_drawdown_breached"));
    }

    #[tokio::test]
    async fn soft_stop_precedes_hard_halt() {
        let monitor = DrawdownMonitor::new(&settings(), dec!(10000));
        // daily loss of 4.2% crosses 0.8 * 5% = 4% soft-stop floor but not the 5% hard cap.
        monitor.update_equity(dec!(9580)).await;
        assert!(!monitor.is_halted().await);
        assert!(monitor.is_soft_stopped().await);
    }

    #[tokio::test]
    async fn resume_trading_clears_halt() {
        let monitor = DrawdownMonitor::new(&settings(), dec!(10000));
        monitor.update_equity(dec!(8000)).await;
        assert!(monitor.is_halted().await);
        monitor.resume_trading().await;
        assert!(!monitor.is_halted().await);
    }
}
