use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{GuardSettings, TradingSettings, TradingStopSettings};
use crate::exchange::Exchange;
use crate::orders::OrderManager;
use crate::positions::PositionManager;
use crate::types::{Direction, OrderRequest, Position, PositionIdx, PositionSide, Side, Signal};

/// Events the reconciler surfaces to the orchestrator for journaling and notification;
/// it never mutates strategy/journal state directly.
#[derive(Debug, Clone)]
pub enum ReconcileEvent {
    ExternalClose { signal: Signal, closed_size: Decimal },
    ExitGuardTriggered { symbol: String, reason: ExitReason, signal: Signal },
    TradingStopConfirmed { symbol: String },
    TradingStopFailed { symbol: String },
    ReduceOnlyRaceRequiresIntervention { symbol: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    MaxHold,
    PnlThreshold,
    TrailingStop,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::MaxHold => "max_hold",
            ExitReason::PnlThreshold => "pnl_threshold",
            ExitReason::TrailingStop => "trailing_stop",
        }
    }
}

#[derive(Debug, Clone)]
struct PendingTradingStop {
    expected_sl: Option<Decimal>,
    expected_tp: Option<Decimal>,
    attempts: u32,
    first_queued_ms: i64,
    next_retry_ms: i64,
    last_error: Option<String>,
    alerted_failed: bool,
}

/// Detects externally-closed positions, enforces the exit guards, and drives the TP/SL
/// trading-stop retry machine. This is the subtlest component in the system: most
/// of its logic exists to avoid mistaking a partial venue snapshot for a closed position.
pub struct Reconciler {
    exchange: Arc<dyn Exchange>,
    orders: Arc<OrderManager>,
    positions: Arc<PositionManager>,
    guards: GuardSettings,
    trading: TradingSettings,
    trading_stop: TradingStopSettings,
    previously_open: RwLock<HashMap<String, Position>>,
    missing_counts: RwLock<HashMap<String, u32>>,
    close_dedup: RwLock<HashMap<String, DateTime<Utc>>>,
    peak_pnl: RwLock<HashMap<String, Decimal>>,
    pending_stops: RwLock<HashMap<String, PendingTradingStop>>,
}

impl Reconciler {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        orders: Arc<OrderManager>,
        positions: Arc<PositionManager>,
        guards: GuardSettings,
        trading: TradingSettings,
        trading_stop: TradingStopSettings,
    ) -> Self {
        Self {
            exchange,
            orders,
            positions,
            guards,
            trading,
            trading_stop,
            previously_open: RwLock::new(HashMap::new()),
            missing_counts: RwLock::new(HashMap::new()),
            close_dedup: RwLock::new(HashMap::new()),
            peak_pnl: RwLock::new(HashMap::new()),
            pending_stops: RwLock::new(HashMap::new()),
        }
    }

    /// Runs external-close detection against the current position snapshot, then the exit
    /// guards against whatever remains open. `observed_symbols = None` means the caller did
    /// a full sync this tick; `Some(scope)` means only those symbols were refreshed.
    pub async fn reconcile_tick(&self, equity: Decimal, observed_symbols: Option<&[String]>) -> Vec<ReconcileEvent> {
        let current = self.positions.snapshot().await;
        let mut events = self.detect_external_closes(&current, observed_symbols).await;
        events.extend(self.run_exit_guards(&current, equity).await);
        events
    }

    async fn detect_external_closes(&self, current: &HashMap<String, Position>, observed_symbols: Option<&[String]>) -> Vec<ReconcileEvent> {
        let mut events = Vec::new();
        let mut previously_open = self.previously_open.write().await;
        let mut missing_counts = self.missing_counts.write().await;
        let mut dedup = self.close_dedup.write().await;
        let now = Utc::now();

        dedup.retain(|_, ts| now.signed_duration_since(*ts) < Duration::seconds(self.trading.close_dedup_ttl_sec));

        let mut next_previously_open = HashMap::new();

        for (symbol, prior) in previously_open.iter() {
            if let Some(p) = current.get(symbol) {
                next_previously_open.insert(symbol.clone(), p.clone());
                missing_counts.remove(symbol);
                continue;
            }

            let in_scope = observed_symbols.map(|scope| scope.iter().any(|s| s == symbol)).unwrap_or(true);
            if !in_scope {
                // Partial sync never saw this symbol; cannot conclude it closed.
                next_previously_open.insert(symbol.clone(), prior.clone());
                continue;
            }

            let count = missing_counts.entry(symbol.clone()).or_insert(0);
            *count += 1;

            if *count < self.trading.close_missing_confirmations {
                next_previously_open.insert(symbol.clone(), prior.clone());
                continue;
            }

            let time_bucket = now.timestamp() / self.trading.close_dedup_ttl_sec.max(1);
            let dedup_key = format!("{}|{}|{}|{}|{}", symbol, prior.side.as_str(), prior.entry_price, prior.size, time_bucket);
            if dedup.contains_key(&dedup_key) {
                missing_counts.remove(symbol);
                continue;
            }
            dedup.insert(dedup_key, now);
            missing_counts.remove(symbol);

            let direction = match prior.side {
                PositionSide::Long => Direction::CloseLong,
                PositionSide::Short => Direction::CloseShort,
                PositionSide::None => continue,
            };
            let signal = Signal::exchange_close(symbol.clone(), direction);
            info!(symbol = %symbol, size = %prior.size, "external close confirmed");
            events.push(ReconcileEvent::ExternalClose { signal, closed_size: prior.size });
        }

        for (symbol, p) in current.iter() {
            if !next_previously_open.contains_key(symbol) {
                next_previously_open.insert(symbol.clone(), p.clone());
                missing_counts.remove(symbol);
            }
        }

        *previously_open = next_previously_open;
        events
    }

    async fn run_exit_guards(&self, current: &HashMap<String, Position>, equity: Decimal) -> Vec<ReconcileEvent> {
        let mut events = Vec::new();
        let mut peak_pnl = self.peak_pnl.write().await;

        for (symbol, position) in current.iter() {
            let peak = peak_pnl.entry(symbol.clone()).or_insert(Decimal::ZERO);
            if position.unrealized_pnl > *peak {
                *peak = position.unrealized_pnl;
            }

            if let Some(reason) = self.check_exit_guard(position, equity, *peak) {
                let direction = match position.side {
                    PositionSide::Long => Direction::CloseLong,
                    PositionSide::Short => Direction::CloseShort,
                    PositionSide::None => continue,
                };
                let signal = Signal::exchange_close(symbol.clone(), direction);
                warn!(symbol = %symbol, reason = reason.as_str(), "exit guard triggered");
                events.push(ReconcileEvent::ExitGuardTriggered { symbol: symbol.clone(), reason, signal });
                peak_pnl.remove(symbol);
            }
        }

        events
    }

    /// First matching reason wins, checked in priority order: max-hold, PnL threshold,
    /// trailing stop.
    fn check_exit_guard(&self, position: &Position, equity: Decimal, peak_pnl: Decimal) -> Option<ExitReason> {
        if self.guards.enable_max_hold_exit {
            let held_minutes = Utc::now().signed_duration_since(position.first_seen_at).num_minutes();
            if held_minutes >= self.guards.max_hold_minutes {
                return Some(ExitReason::MaxHold);
            }
        }

        if self.guards.enable_pnl_pct_exit && !equity.is_zero() {
            let pnl_pct = position.unrealized_pnl / equity;
            if pnl_pct <= -self.guards.stop_loss_pct || pnl_pct >= self.guards.take_profit_pct {
                return Some(ExitReason::PnlThreshold);
            }
        } else if self.guards.enable_pnl_usdt_exit
            && (position.unrealized_pnl <= -self.guards.stop_loss_usdt || position.unrealized_pnl >= self.guards.take_profit_usdt)
        {
            return Some(ExitReason::PnlThreshold);
        }

        if self.guards.enable_trailing_stop_exit && !equity.is_zero() {
            let min_peak = equity * self.guards.trailing_stop_min_peak_pct;
            if peak_pnl >= min_peak {
                let retrace = peak_pnl - position.unrealized_pnl;
                if retrace >= self.guards.trailing_stop_pct * peak_pnl {
                    return Some(ExitReason::TrailingStop);
                }
            }
        }

        None
    }

    /// Submits the reduce-only close and polls up to 3 times (400ms apart) for the size
    /// to move. Returns the events raised along the way plus the quantity actually confirmed
    /// closed — zero if the venue never reflected the reduction within the retry window, in
    /// which case the caller should not account a trade result for a close that was never
    /// actually observed.
    pub async fn submit_close(&self, symbol: &str, side: Side, quantity: Decimal) -> (Vec<ReconcileEvent>, Decimal) {
        let request = OrderRequest::market(symbol, side, quantity, true);
        if let Err(e) = self.orders.submit_order(request, "reconciler").await {
            if matches!(e, crate::orders::OrderManagerError::Exchange(crate::exchange::ExchangeError::InvalidOrder(_))) {
                return (self.handle_reduce_only_race(symbol).await, Decimal::ZERO);
            }
            warn!(symbol = %symbol, error = %e, "close submission failed");
            return (Vec::new(), Decimal::ZERO);
        }

        let before = self.positions.get(symbol).await.map(|p| p.size).unwrap_or(Decimal::ZERO);
        for _ in 0..3 {
            tokio::time::sleep(std::time::Duration::from_millis(400)).await;
            let scope = vec![symbol.to_string()];
            if self.positions.sync_positions(Some(&scope)).await.is_err() {
                continue;
            }
            let after = self.positions.get(symbol).await.map(|p| p.size).unwrap_or(Decimal::ZERO);
            if after < before {
                info!(symbol = %symbol, "close observed via partial sync");
                return (Vec::new(), quantity.min(before - after));
            }
        }

        warn!(symbol = %symbol, "close submitted but size unchanged after retries; leaving for next cycle");
        (Vec::new(), Decimal::ZERO)
    }

    /// Called when the venue rejects a reduce-only close as invalid — either the position
    /// already closed out from under us, or it's still open and something is wrong with the
    /// order itself. Distinguishing the two requires a fresh partial sync.
    async fn handle_reduce_only_race(&self, symbol: &str) -> Vec<ReconcileEvent> {
        let scope = vec![symbol.to_string()];
        let _ = self.positions.sync_positions(Some(&scope)).await;
        match self.positions.get(symbol).await {
            None => {
                info!(symbol = %symbol, "reduce-only race: position already gone, reconciled silently");
                Vec::new()
            }
            Some(_) => {
                warn!(symbol = %symbol, "reduce-only race: position still reported open, needs operator intervention");
                vec![ReconcileEvent::ReduceOnlyRaceRequiresIntervention { symbol: symbol.to_string() }]
            }
        }
    }

    /// Queues a TP/SL confirmation for a freshly-opened position and fires the first
    /// attempt immediately.
    pub async fn queue_trading_stop(&self, symbol: &str, position_idx: PositionIdx, stop_loss: Option<Decimal>, take_profit: Option<Decimal>) {
        let now_ms = Utc::now().timestamp_millis();
        let _ = self.exchange.set_position_trading_stop(symbol, position_idx, stop_loss, take_profit).await;
        self.pending_stops.write().await.insert(
            symbol.to_string(),
            PendingTradingStop {
                expected_sl: stop_loss,
                expected_tp: take_profit,
                attempts: 1,
                first_queued_ms: now_ms,
                next_retry_ms: now_ms + (self.trading_stop.retry_interval_sec * 1000.0) as i64,
                last_error: None,
                alerted_failed: false,
            },
        );
    }

    /// Periodic task: partial-syncs each pending symbol, checks whether the venue already
    /// reflects the expected TP/SL within tolerance, and retries the set-trading-stop call
    /// otherwise. Timeout/max-attempts produce a one-time alert but retries continue.
    pub async fn process_trading_stop_retries(&self, position_idx: PositionIdx) -> Vec<ReconcileEvent> {
        let mut events = Vec::new();
        let now_ms = Utc::now().timestamp_millis();
        let symbols: Vec<String> = self.pending_stops.read().await.keys().cloned().collect();

        for symbol in symbols {
            let due = {
                let pending = self.pending_stops.read().await;
                pending.get(&symbol).map(|p| p.next_retry_ms <= now_ms).unwrap_or(false)
            };
            if !due {
                continue;
            }

            let scope = vec![symbol.clone()];
            let _ = self.positions.sync_positions(Some(&scope)).await;
            let position = self.positions.get(&symbol).await;

            let mut pending_stops = self.pending_stops.write().await;
            let Some(pending) = pending_stops.get_mut(&symbol) else { continue };

            if let Some(position) = &position {
                if Self::stop_matches(position.stop_loss, pending.expected_sl) && Self::stop_matches(position.take_profit, pending.expected_tp) {
                    pending_stops.remove(&symbol);
                    events.push(ReconcileEvent::TradingStopConfirmed { symbol: symbol.clone() });
                    continue;
                }
            }

            let timed_out = now_ms - pending.first_queued_ms >= self.trading_stop.confirm_timeout_sec * 1000;
            let exhausted = pending.attempts >= self.trading_stop.retry_max_attempts;
            if (timed_out || exhausted) && !pending.alerted_failed {
                pending.alerted_failed = true;
                events.push(ReconcileEvent::TradingStopFailed { symbol: symbol.clone() });
            }

            match self.exchange.set_position_trading_stop(&symbol, position_idx, pending.expected_sl, pending.expected_tp).await {
                Ok(()) => pending.last_error = None,
                Err(e) => pending.last_error = Some(e.to_string()),
            }
            pending.attempts += 1;
            pending.next_retry_ms = now_ms + (self.trading_stop.retry_interval_sec * 1000.0) as i64;
        }

        events
    }

    fn stop_matches(actual: Option<Decimal>, expected: Option<Decimal>) -> bool {
        match (actual, expected) {
            (None, None) => true,
            (Some(a), Some(e)) => {
                let tolerance = Decimal::new(1, 4).max(e.abs() * Decimal::new(1, 3));
                (a - e).abs() <= tolerance
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use crate::types::{Candle, ExchangeOrderStatus, FundingRateSample, InstrumentInfo, OrderResult, Ticker, TimeFrame};
    use crate::exchange::ExchangeError;

    struct StubExchange;

    #[async_trait]
    impl Exchange for StubExchange {
        async fn fetch_ohlcv(&self, _s: &str, _t: TimeFrame, _l: u32) -> Result<Vec<Candle>, ExchangeError> {
            Ok(vec![])
        }
        async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
            Ok(Ticker { symbol: symbol.to_string(), price: dec!(100), bid: dec!(99.9), ask: dec!(100.1), volume_24h: dec!(1000), timestamp: Utc::now() })
        }
        async fn fetch_funding_rate(&self, _s: &str) -> Result<FundingRateSample, ExchangeError> {
            Ok(FundingRateSample { rate: Decimal::ZERO, timestamp: Utc::now() })
        }
        async fn fetch_positions(&self, _s: Option<&[String]>) -> Result<Vec<Position>, ExchangeError> {
            Ok(vec![])
        }
        async fn fetch_balance(&self, _a: &str) -> Result<Decimal, ExchangeError> {
            Ok(dec!(10000))
        }
        async fn fetch_instrument_info(&self, _s: &str) -> Result<InstrumentInfo, ExchangeError> {
            Ok(InstrumentInfo { min_qty: dec!(0.001), max_qty: dec!(1000), qty_step: dec!(0.001), tick_size: dec!(0.1), max_leverage: dec!(10) })
        }
        async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult, ExchangeError> {
            Ok(OrderResult {
                exchange_order_id: "EX-1".to_string(),
                client_order_id: request.client_order_id.clone(),
                symbol: request.symbol.clone(),
                side: request.side,
                status: ExchangeOrderStatus::Filled,
                quantity: request.quantity,
                filled_quantity: request.quantity,
                average_fill_price: Some(dec!(100)),
                fee: Decimal::ZERO,
            })
        }
        async fn cancel_order(&self, _o: &str, _s: &str) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn cancel_all_orders(&self, _s: &str) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn set_leverage(&self, _s: &str, _l: Decimal) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn set_position_trading_stop(&self, _s: &str, _p: PositionIdx, _sl: Option<Decimal>, _tp: Option<Decimal>) -> Result<(), ExchangeError> {
            Ok(())
        }
        async fn server_time(&self) -> Result<i64, ExchangeError> {
            Ok(0)
        }
    }

    fn open_position(symbol: &str) -> Position {
        Position {
            symbol: symbol.to_string(),
            side: PositionSide::Long,
            size: dec!(1),
            entry_price: dec!(100),
            mark_price: dec!(100),
            liquidation_price: None,
            leverage: dec!(3),
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            stop_loss: None,
            take_profit: None,
            position_idx: 0,
            first_seen_at: Utc::now(),
        }
    }

    fn build(guards: GuardSettings, trading: TradingSettings) -> (Reconciler, Arc<PositionManager>) {
        let exchange: Arc<dyn Exchange> = Arc::new(StubExchange);
        let orders = Arc::new(OrderManager::new(exchange.clone()));
        let positions = Arc::new(PositionManager::new(exchange.clone()));
        let reconciler = Reconciler::new(exchange, orders, positions.clone(), guards, trading, TradingStopSettings::default());
        (reconciler, positions)
    }

    #[tokio::test]
    async fn external_close_requires_k_consecutive_full_syncs() {
        let trading = TradingSettings { close_missing_confirmations: 2, ..Default::default() };
        let (reconciler, positions) = build(GuardSettings::default(), trading);
        positions.update_position(open_position("BTCUSDT")).await;

        let current = positions.snapshot().await;
        reconciler.detect_external_closes(&current, None).await;

        // Symbol vanishes from now on.
        positions.remove("BTCUSDT").await;
        let current = positions.snapshot().await;

        let first = reconciler.detect_external_closes(&current, None).await;
        assert!(first.is_empty(), "first miss should not yet confirm the close");

        let second = reconciler.detect_external_closes(&current, None).await;
        assert_eq!(second.len(), 1);
        assert!(matches!(second[0], ReconcileEvent::ExternalClose { .. }));
    }

    #[tokio::test]
    async fn partial_sync_never_evicts_out_of_scope_symbol() {
        let (reconciler, positions) = build(GuardSettings::default(), TradingSettings { close_missing_confirmations: 1, ..Default::default() });
        positions.update_position(open_position("BTCUSDT")).await;

        let current = positions.snapshot().await;
        reconciler.detect_external_closes(&current, None).await;

        positions.remove("BTCUSDT").await;
        let current = positions.snapshot().await;
        let scope = vec!["ETHUSDT".to_string()];
        let events = reconciler.detect_external_closes(&current, Some(&scope)).await;

        assert!(events.is_empty(), "BTCUSDT was outside the partial sync scope and must not be evicted");
    }

    #[tokio::test]
    async fn max_hold_guard_triggers_after_threshold() {
        let guards = GuardSettings { max_hold_minutes: 0, enable_pnl_pct_exit: false, enable_trailing_stop_exit: false, ..GuardSettings::default() };
        let (reconciler, positions) = build(guards, TradingSettings::default());
        let mut position = open_position("BTCUSDT");
        position.first_seen_at = Utc::now() - Duration::minutes(5);
        positions.update_position(position).await;

        let current = positions.snapshot().await;
        let events = reconciler.run_exit_guards(&current, dec!(10000)).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ReconcileEvent::ExitGuardTriggered { reason: ExitReason::MaxHold, .. }));
    }

    #[tokio::test]
    async fn pnl_pct_guard_triggers_on_stop_loss_breach() {
        let guards = GuardSettings { enable_max_hold_exit: false, enable_trailing_stop_exit: false, stop_loss_pct: dec!(0.01), ..GuardSettings::default() };
        let (reconciler, positions) = build(guards, TradingSettings::default());
        let mut position = open_position("BTCUSDT");
        position.unrealized_pnl = dec!(-200);
        positions.update_position(position).await;

        let current = positions.snapshot().await;
        let events = reconciler.run_exit_guards(&current, dec!(10000)).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ReconcileEvent::ExitGuardTriggered { reason: ExitReason::PnlThreshold, .. }));
    }

    #[tokio::test]
    async fn stop_matches_respects_tolerance_floor() {
        assert!(Reconciler::stop_matches(Some(dec!(100.00005)), Some(dec!(100.0))));
        assert!(!Reconciler::stop_matches(Some(dec!(100.5)), Some(dec!(100.0))));
        assert!(Reconciler::stop_matches(None, None));
        assert!(!Reconciler::stop_matches(Some(dec!(100.0)), None));
    }
}
