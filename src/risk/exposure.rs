use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::config::RiskSettings;
use crate::types::{Position, PositionSide};

#[derive(Debug, Default)]
struct SideState {
    current_side_streak: u32,
    last_side: Option<PositionSide>,
}

/// Tracks per-symbol loss cooldowns and the consecutive-same-side entry streak the MTF
/// confirmer's ADX-floor relaxation reads (§4.3), alongside the position/leverage/notional
/// exposure checks gates 10-13 run.
pub struct ExposureManager {
    max_concurrent_positions: usize,
    max_leverage: Decimal,
    max_directional_exposure_pct: Decimal,
    portfolio_heat_limit_pct: Decimal,
    funding_arb_max_allocation: Decimal,
    side_balancer_streak_threshold: u32,
    side_balancer_imbalance_pct: Decimal,
    symbol_cooldown: chrono::Duration,
    cooldowns: RwLock<HashMap<String, DateTime<Utc>>>,
    side_state: RwLock<SideState>,
}

impl ExposureManager {
    pub fn new(risk: &RiskSettings) -> Self {
        Self {
            max_concurrent_positions: risk.max_concurrent_positions,
            max_leverage: risk.max_leverage,
            max_directional_exposure_pct: risk.max_directional_exposure_pct,
            portfolio_heat_limit_pct: risk.portfolio_heat_limit_pct,
            funding_arb_max_allocation: risk.funding_arb_max_allocation,
            side_balancer_streak_threshold: risk.side_balancer_streak_threshold,
            side_balancer_imbalance_pct: risk.side_balancer_imbalance_pct,
            symbol_cooldown: chrono::Duration::minutes(risk.symbol_cooldown_minutes),
            cooldowns: RwLock::new(HashMap::new()),
            side_state: RwLock::new(SideState::default()),
        }
    }

    pub async fn is_symbol_cooling_down(&self, symbol: &str) -> bool {
        let cooldowns = self.cooldowns.read().await;
        match cooldowns.get(symbol) {
            Some(until) => Utc::now() < *until,
            None => false,
        }
    }

    /// A symbol loss starts its cooldown; a symbol win clears it.
    pub async fn record_symbol_result(&self, symbol: &str, was_win: bool) {
        let mut cooldowns = self.cooldowns.write().await;
        if was_win {
            cooldowns.remove(symbol);
        } else {
            cooldowns.insert(symbol.to_string(), Utc::now() + self.symbol_cooldown);
        }
    }

    pub async fn record_entry_side(&self, side: PositionSide) {
        let mut state = self.side_state.write().await;
        if state.last_side == Some(side) {
            state.current_side_streak += 1;
        } else {
            state.current_side_streak = 1;
            state.last_side = Some(side);
        }
    }

    pub async fn current_side_streak(&self) -> (Option<PositionSide>, u32) {
        let state = self.side_state.read().await;
        (state.last_side, state.current_side_streak)
    }

    /// Gate 10: position count / leverage / notional-vs-equity exposure checks.
    /// `is_funding_arb` bypasses the position-count cap per spec.
    pub fn check_position_limits(
        &self,
        positions: &HashMap<String, Position>,
        equity: Decimal,
        new_notional: Decimal,
        requested_leverage: Decimal,
        is_funding_arb: bool,
    ) -> Result<(), &'static str> {
        if !is_funding_arb && positions.len() >= self.max_concurrent_positions {
            return Err("max_concurrent_positions");
        }
        if requested_leverage > self.max_leverage {
            return Err("max_leverage_exceeded");
        }
        let total_notional: Decimal = positions.values().map(|p| p.notional_value()).sum();
        if !equity.is_zero() && (total_notional + new_notional) > equity * self.max_leverage {
            return Err("total_notional_exceeds_leverage_cap");
        }
        if is_funding_arb && !equity.is_zero() {
            let funding_allocation = (total_notional + new_notional) / equity;
            if funding_allocation > self.funding_arb_max_allocation {
                return Err("funding_arb_allocation_exceeded");
            }
        }
        Ok(())
    }

    /// Gate 11: rejects adding to a side that already exceeds its directional exposure cap.
    pub fn check_directional_exposure(
        &self,
        positions: &HashMap<String, Position>,
        equity: Decimal,
        side: PositionSide,
        new_notional: Decimal,
    ) -> Result<(), &'static str> {
        if equity.is_zero() {
            return Ok(());
        }
        let side_notional: Decimal = positions
            .values()
            .filter(|p| p.side == side)
            .map(|p| p.notional_value())
            .sum();
        if (side_notional + new_notional) / equity > self.max_directional_exposure_pct {
            return Err("directional_exposure_exceeded");
        }
        Ok(())
    }

    /// Gate 12: after N consecutive same-side entries with a sufficient notional imbalance,
    /// refuses another entry on that side.
    pub async fn check_side_balance(
        &self,
        positions: &HashMap<String, Position>,
        equity: Decimal,
        side: PositionSide,
    ) -> Result<(), &'static str> {
        let (last_side, streak) = self.current_side_streak().await;
        if last_side != Some(side) || streak < self.side_balancer_streak_threshold {
            return Ok(());
        }
        if equity.is_zero() {
            return Ok(());
        }
        let long_notional: Decimal = positions
            .values()
            .filter(|p| p.side == PositionSide::Long)
            .map(|p| p.notional_value())
            .sum();
        let short_notional: Decimal = positions
            .values()
            .filter(|p| p.side == PositionSide::Short)
            .map(|p| p.notional_value())
            .sum();
        let imbalance = ((long_notional - short_notional).abs()) / equity;
        if imbalance >= self.side_balancer_imbalance_pct {
            return Err("side_balance_refused");
        }
        Ok(())
    }

    /// Gate 13: total notional (existing + new) over equity must stay under the heat limit.
    pub fn check_portfolio_heat(
        &self,
        positions: &HashMap<String, Position>,
        equity: Decimal,
        new_notional: Decimal,
    ) -> Result<(), &'static str> {
        if equity.is_zero() {
            return Ok(());
        }
        let total_notional: Decimal = positions.values().map(|p| p.notional_value()).sum();
        if (total_notional + new_notional) / equity > self.portfolio_heat_limit_pct {
            return Err("portfolio_heat_exceeded");
        }
        Ok(())
    }
}
