use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::RiskSettings;
use crate::types::{Direction, Position, PositionSide, RiskDecision, Signal};

use super::{CircuitBreaker, DrawdownMonitor, ExposureManager, PositionSizer};

/// Per-call inputs the gate pipeline needs beyond the signal itself. Built fresh by the
/// orchestrator from the position/equity snapshot before each `evaluate` call.
pub struct RiskContext<'a> {
    pub positions: &'a HashMap<String, Position>,
    pub equity: Decimal,
    pub win_rate: Option<Decimal>,
    pub winloss_ratio: Option<Decimal>,
    pub atr: Option<Decimal>,
}

/// Evaluates candidate signals against a fixed-order gate pipeline: the first failing
/// gate short-circuits with a machine-readable `reason`. Close signals take a dedicated path
/// that bypasses every gate so a symbol can always be flattened.
pub struct RiskManager {
    settings: RiskSettings,
    drawdown: DrawdownMonitor,
    circuit_breaker: CircuitBreaker,
    exposure: ExposureManager,
    sizer: PositionSizer,
}

impl RiskManager {
    pub fn new(settings: RiskSettings, starting_equity: Decimal) -> Self {
        Self {
            drawdown: DrawdownMonitor::new(&settings, starting_equity),
            circuit_breaker: CircuitBreaker::new(
                settings.circuit_breaker_consecutive_losses,
                settings.circuit_breaker_cooldown_hours,
            ),
            exposure: ExposureManager::new(&settings),
            sizer: PositionSizer::new(&settings),
            settings,
        }
    }

    pub fn drawdown_monitor(&self) -> &DrawdownMonitor {
        &self.drawdown
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub fn exposure_manager(&self) -> &ExposureManager {
        &self.exposure
    }

    /// Called once per closed trade to update the circuit breaker's loss streak and the
    /// symbol's cooldown window.
    pub async fn record_trade_result(&self, symbol: &str, was_win: bool) {
        self.circuit_breaker.record_trade(was_win).await;
        self.exposure.record_symbol_result(symbol, was_win).await;
    }

    pub async fn evaluate(&self, signal: &Signal, ctx: &RiskContext<'_>) -> RiskDecision {
        if signal.direction.is_close() {
            return self.evaluate_close(signal, ctx.positions);
        }

        self.drawdown.update_equity(ctx.equity).await;

        if signal.direction == Direction::Neutral {
            return RiskDecision::reject("neutral_signal");
        }

        if let Some(detail) = self.drawdown.halt_reason().await {
            return RiskDecision::reject(detail);
        }

        if self.circuit_breaker.is_tripped().await {
            return RiskDecision::reject("circuit_breaker_tripped");
        }

        if self.settings.enable_symbol_cooldown && self.exposure.is_symbol_cooling_down(&signal.symbol).await {
            return RiskDecision::reject("symbol_cooldown_active");
        }

        let stop_loss = match signal.stop_loss {
            Some(sl) if sl > Decimal::ZERO => sl,
            _ => return RiskDecision::reject("missing_stop_loss"),
        };

        if let Some(spread_bps) = signal.metadata_get("spread_bps") {
            let spread_bps = Decimal::try_from(spread_bps).unwrap_or_default();
            if spread_bps > self.settings.max_spread_bps {
                return RiskDecision::reject("spread_too_wide");
            }
        }
        if let Some(liquidity_score) = signal.metadata_get("liquidity_score") {
            if liquidity_score < self.settings.min_liquidity_score {
                return RiskDecision::reject("liquidity_too_low");
            }
        }

        let entry_price = match signal.entry_price {
            Some(p) if p > Decimal::ZERO => p,
            _ => return RiskDecision::reject("invalid_entry_price"),
        };

        if self.drawdown.is_soft_stopped().await && signal.confidence < self.settings.soft_stop_min_confidence {
            return RiskDecision::reject("soft_stop_confidence_floor");
        }

        let quantity = self.sizer.size(
            ctx.equity,
            entry_price,
            stop_loss,
            ctx.win_rate,
            ctx.winloss_ratio,
            ctx.atr,
        );
        if quantity <= Decimal::ZERO {
            return RiskDecision::reject("position_size_zero");
        }

        let is_funding_arb = signal.strategy_name == "funding_rate_arb";
        let new_notional = quantity * entry_price;

        if let Err(reason) = self.exposure.check_position_limits(
            ctx.positions,
            ctx.equity,
            new_notional,
            self.settings.max_leverage,
            is_funding_arb,
        ) {
            return RiskDecision::reject(reason);
        }

        let side = match signal.direction {
            Direction::Long => PositionSide::Long,
            _ => PositionSide::Short,
        };

        if self.settings.enable_directional_exposure_limit {
            if let Err(reason) =
                self.exposure.check_directional_exposure(ctx.positions, ctx.equity, side, new_notional)
            {
                return RiskDecision::reject(reason);
            }
        }

        if let Err(reason) = self.exposure.check_side_balance(ctx.positions, ctx.equity, side).await {
            return RiskDecision::reject(reason);
        }

        if let Err(reason) = self.exposure.check_portfolio_heat(ctx.positions, ctx.equity, new_notional) {
            return RiskDecision::reject(reason);
        }

        self.exposure.record_entry_side(side).await;
        info!(symbol = %signal.symbol, %quantity, "risk manager approved entry");

        RiskDecision::approve(quantity, Some(stop_loss), signal.take_profit, "entry_approved")
    }

    fn evaluate_close(&self, signal: &Signal, positions: &HashMap<String, Position>) -> RiskDecision {
        match positions.get(&signal.symbol) {
            Some(position) if position.size > Decimal::ZERO => {
                RiskDecision::approve(position.size, position.stop_loss, position.take_profit, "exit_signal")
            }
            _ => {
                warn!(symbol = %signal.symbol, "close signal with no matching open position");
                RiskDecision::reject("no_matching_position")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn settings() -> RiskSettings {
        RiskSettings::default()
    }

    fn ctx(positions: &HashMap<String, Position>, equity: Decimal) -> RiskContext<'_> {
        RiskContext { positions, equity, win_rate: None, winloss_ratio: None, atr: None }
    }

    fn long_signal() -> Signal {
        let mut s = Signal::new("BTCUSDT", Direction::Long, "trend_following", 0.8);
        s.entry_price = Some(dec!(100));
        s.stop_loss = Some(dec!(98));
        s
    }

    #[tokio::test]
    async fn rejects_neutral_signal() {
        let manager = RiskManager::new(settings(), dec!(10000));
        let positions = HashMap::new();
        let signal = Signal::new("BTCUSDT", Direction::Neutral, "trend_following", 0.5);
        let decision = manager.evaluate(&signal, &ctx(&positions, dec!(10000))).await;
        assert!(!decision.approved);
        assert_eq!(decision.reason, "neutral_signal");
    }

    #[tokio::test]
    async fn rejects_missing_stop_loss() {
        let manager = RiskManager::new(settings(), dec!(10000));
        let positions = HashMap::new();
        let mut signal = long_signal();
        signal.stop_loss = None;
        let decision = manager.evaluate(&signal, &ctx(&positions, dec!(10000))).await;
        assert_eq!(decision.reason, "missing_stop_loss");
    }

    #[tokio::test]
    async fn approves_well_formed_entry() {
        let manager = RiskManager::new(settings(), dec!(10000));
        let positions = HashMap::new();
        let decision = manager.evaluate(&long_signal(), &ctx(&positions, dec!(10000))).await;
        assert!(decision.approved);
        assert!(decision.quantity > Decimal::ZERO);
    }

    #[tokio::test]
    async fn rejects_when_drawdown_halted() {
        let manager = RiskManager::new(settings(), dec!(10000));
        manager.drawdown_monitor().update_equity(dec!(5000)).await;
        let positions = HashMap::new();
        let decision = manager.evaluate(&long_signal(), &ctx(&positions, dec!(5000))).await;
        assert!(decision.reason.contains("max_drawdown_breached"));
    }

    #[tokio::test]
    async fn close_signal_bypasses_gates_and_uses_position_size() {
        let manager = RiskManager::new(settings(), dec!(10000));
        let mut positions = HashMap::new();
        positions.insert(
            "BTCUSDT".to_string(),
            Position {
                symbol: "BTCUSDT".to_string(),
                side: PositionSide::Long,
                size: dec!(1.5),
                entry_price: dec!(100),
                mark_price: dec!(105),
                liquidation_price: None,
                leverage: dec!(3),
                unrealized_pnl: dec!(7.5),
                realized_pnl: Decimal::ZERO,
                stop_loss: Some(dec!(98)),
                take_profit: None,
                position_idx: 0,
                first_seen_at: chrono::Utc::now(),
            },
        );
        let signal = Signal::new("BTCUSDT", Direction::CloseLong, "exchange_close", 1.0);
        let decision = manager.evaluate(&signal, &ctx(&positions, dec!(10000))).await;
        assert!(decision.approved);
        assert_eq!(decision.quantity, dec!(1.5));
        assert_eq!(decision.reason, "exit_signal");
    }

    #[tokio::test]
    async fn close_signal_without_position_is_rejected() {
        let manager = RiskManager::new(settings(), dec!(10000));
        let positions = HashMap::new();
        let signal = Signal::new("BTCUSDT", Direction::CloseLong, "exchange_close", 1.0);
        let decision = manager.evaluate(&signal, &ctx(&positions, dec!(10000))).await;
        assert!(!decision.approved);
        assert_eq!(decision.reason, "no_matching_position");
    }
}
