//! Owns every component and drives the single event loop that turns kline events into
//! orders, runs the periodic reconciliation/maintenance tasks, and tears everything down
//! cleanly on shutdown. Mirrors the teacher's `main.rs` trading loop pattern —
//! one `tokio::select!` loop over a websocket `mpsc::Receiver`, plus `tokio::spawn`ed
//! periodic jobs — generalized from candle-only events to the full pipeline.

pub mod events;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::candles::CandleBuffer;
use crate::config::AppSettings;
use crate::exchange::{BybitWebSocket, Exchange, MarketEvent};
use crate::funding::FundingRateFeeder;
use crate::indicators::ATR;
use crate::journal::{new_session_id, JournalWriter};
use crate::mtf::{MtfConfirmer, MtfVerdict};
use crate::notifications::{self, AlertType, NotificationManager, TelegramSink};
use crate::orders::OrderManager;
use crate::positions::PositionManager;
use crate::reconcile::{ExitReason, ReconcileEvent, Reconciler};
use crate::risk::{RiskContext, RiskManager};
use crate::strategies::StrategySelector;
use crate::types::{EquityState, OrderRequest, Position, PositionSide, Side};

use events::EventBus;

const EQUITY_SNAPSHOT_INTERVAL_SECS: u64 = 60;
const HEALTH_CHECK_INTERVAL_SECS: u64 = 60;
const FUNDING_REFRESH_INTERVAL_SECS: u64 = 300;
const TRADING_STOP_RETRY_INTERVAL_SECS: u64 = 2;
const DAILY_RESET_CHECK_INTERVAL_SECS: u64 = 3600;
const ENTRY_FRAME_MIN_CANDLES: usize = 60;
const QUOTE_ASSET: &str = "USDT";
const MAIN_POSITION_IDX: crate::types::PositionIdx = 0;

/// Owns every long-lived component: each is held behind its own `Arc` and
/// mutated only through its own accessors, never reached into directly by another
/// component. The orchestrator's only direct state is equity, the pause flag, and the
/// shutdown signal.
pub struct TradingCore {
    settings: Arc<AppSettings>,
    session_id: String,
    exchange: Arc<dyn Exchange>,
    candles: Arc<CandleBuffer>,
    higher_candles: Arc<CandleBuffer>,
    selector: Arc<StrategySelector>,
    mtf: Arc<MtfConfirmer>,
    risk: Arc<RiskManager>,
    orders: Arc<OrderManager>,
    positions: Arc<PositionManager>,
    reconciler: Arc<Reconciler>,
    funding: Arc<FundingRateFeeder>,
    journal: Arc<JournalWriter>,
    notifications: Arc<NotificationManager>,
    event_bus: Arc<EventBus>,
    equity: RwLock<EquityState>,
    is_running: AtomicBool,
    trading_paused: AtomicBool,
    shutdown: Notify,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TradingCore {
    /// Ambient bootstrap: opens the journal, builds the notification sink, fetches the
    /// starting balance, and constructs every component that needs it (the risk manager's
    /// `DrawdownMonitor` in particular). Does not touch the network beyond the balance
    /// fetch — transport connection and position/candle backfill happen in [`Self::start`].
    pub async fn new(settings: AppSettings, exchange: Arc<dyn Exchange>) -> Result<Self> {
        let settings = Arc::new(settings);
        let session_id = new_session_id(Utc::now());
        info!(session_id = %session_id, "bootstrapping trading core");

        let journal = Arc::new(JournalWriter::new(&settings.journal.database_path).await?);

        let telegram = settings.telegram.enabled.then(|| TelegramSink::new(&settings.telegram));
        let notifications = Arc::new(NotificationManager::new(Some(Arc::clone(&journal)), telegram, session_id.clone()));

        let starting_equity = exchange.fetch_balance(QUOTE_ASSET).await?;
        info!(equity = %starting_equity, "starting balance fetched");

        let risk = Arc::new(RiskManager::new(settings.risk.clone(), starting_equity));
        let orders = Arc::new(OrderManager::new(Arc::clone(&exchange)));
        let positions = Arc::new(PositionManager::new(Arc::clone(&exchange)));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&exchange),
            Arc::clone(&orders),
            Arc::clone(&positions),
            settings.guards.clone(),
            settings.trading.clone(),
            settings.trading_stop,
        ));
        let funding = Arc::new(FundingRateFeeder::new(Arc::clone(&exchange)));

        Ok(Self {
            candles: Arc::new(CandleBuffer::new(settings.trading.candle_buffer_size)),
            higher_candles: Arc::new(CandleBuffer::new(settings.trading.mtf_confirm_min_bars.max(300))),
            selector: Arc::new(StrategySelector::new()),
            mtf: Arc::new(MtfConfirmer::new(settings.trading.mtf_confirm_tf, settings.trading.mtf_confirm_adx_min, settings.trading.mtf_confirm_min_bars)),
            equity: RwLock::new(EquityState::new(starting_equity)),
            settings,
            session_id,
            exchange,
            risk,
            orders,
            positions,
            reconciler,
            funding,
            journal,
            notifications,
            event_bus: Arc::new(EventBus::new()),
            is_running: AtomicBool::new(false),
            trading_paused: AtomicBool::new(false),
            shutdown: Notify::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Initial position sync, candle backfill, websocket connection, and periodic task
    /// scheduling. Idempotent guard: calling twice on an already-running core is an error.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("trading core already running"));
        }

        self.positions.sync_positions(None).await?;

        for symbol in &self.settings.trading.enabled_symbols {
            let candles = self
                .exchange
                .fetch_ohlcv(symbol, self.settings.trading.default_timeframe, self.settings.trading.candle_buffer_size as u32)
                .await?;
            self.candles.initialize(symbol, candles).await;

            if self.settings.trading.enable_mtf_confirm {
                let higher = self
                    .exchange
                    .fetch_ohlcv(symbol, self.mtf.higher_timeframe(), self.settings.trading.mtf_confirm_min_bars as u32)
                    .await?;
                self.higher_candles.initialize(symbol, higher).await;
            }
        }

        self.funding.refresh(&self.settings.trading.enabled_symbols).await;

        let mut ws = BybitWebSocket::new(self.settings.exchange.use_testnet);
        if !self.settings.exchange.api_key.is_empty() {
            ws = ws.with_private_auth(self.settings.exchange.api_key.clone(), self.settings.exchange.api_secret.clone());
        }
        for symbol in &self.settings.trading.enabled_symbols {
            ws = ws.subscribe_kline(symbol, self.settings.trading.default_timeframe);
        }
        let mut event_rx = ws.connect().await?;

        self.notifications.notify(AlertType::BotStarted).await;

        let core = Arc::clone(self);
        let main_loop = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = core.shutdown.notified() => {
                        info!("main event loop received shutdown signal");
                        break;
                    }
                    event = event_rx.recv() => {
                        match event {
                            Some(event) => {
                                core.event_bus.publish(event.clone()).await;
                                core.handle_market_event(event).await;
                            }
                            None => {
                                warn!("market event channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.push(main_loop);
        tasks.push(self.spawn_periodic(EQUITY_SNAPSHOT_INTERVAL_SECS, |core| Box::pin(core.equity_snapshot_tick())));
        tasks.push(self.spawn_periodic(HEALTH_CHECK_INTERVAL_SECS, |core| Box::pin(core.health_check_tick())));
        tasks.push(self.spawn_periodic(FUNDING_REFRESH_INTERVAL_SECS, |core| Box::pin(core.funding_refresh_tick())));
        tasks.push(self.spawn_periodic(TRADING_STOP_RETRY_INTERVAL_SECS, |core| Box::pin(core.trading_stop_retry_tick())));
        tasks.push(self.spawn_periodic(DAILY_RESET_CHECK_INTERVAL_SECS, |core| Box::pin(core.daily_reset_tick())));
        drop(tasks);

        info!("trading core started");
        Ok(())
    }

    /// Cancels every periodic task (awaiting their exit), then tears down the websocket,
    /// event bus, and transport. The journal is the last thing to go since shutdown itself
    /// is journalled.
    pub async fn stop(&self) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.shutdown.notify_waiters();

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = tokio::time::timeout(std::time::Duration::from_secs(30), task).await;
        }

        self.notifications.notify(AlertType::BotStopped).await;
        info!("trading core stopped");
    }

    /// Blocks kline-driven signal generation only; reconciliation, exit guards, and TP/SL
    /// retries keep running regardless.
    pub fn pause_trading(&self) {
        self.trading_paused.store(true, Ordering::SeqCst);
        info!("trading paused");
    }

    pub fn resume_trading(&self) {
        self.trading_paused.store(false, Ordering::SeqCst);
        info!("trading resumed");
    }

    pub fn is_trading_paused(&self) -> bool {
        self.trading_paused.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    fn spawn_periodic<F>(self: &Arc<Self>, interval_secs: u64, job: F) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync + 'static,
    {
        let core = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = core.shutdown.notified() => break,
                    _ = ticker.tick() => job(Arc::clone(&core)).await,
                }
            }
        })
    }

    async fn handle_market_event(self: &Arc<Self>, event: MarketEvent) {
        match event {
            MarketEvent::Kline(candle) => {
                if candle.is_closed {
                    let symbol = candle.symbol.clone();
                    self.handle_kline(&symbol, candle).await;
                }
            }
            MarketEvent::OrderFilled(result) | MarketEvent::OrderPartiallyFilled(result) => {
                self.orders.update_from_exchange(&result).await;
            }
            MarketEvent::PositionUpdated(position) => {
                let symbol = position.symbol.clone();
                self.positions.update_position(position).await;
                self.run_reconcile_tick(Some(&[symbol])).await;
            }
            MarketEvent::PortfolioUpdate(equity) => {
                self.equity.write().await.update(equity);
            }
            MarketEvent::Disconnected => {
                self.notifications.notify(AlertType::ConnectionLost { service: "bybit_websocket".to_string() }).await;
            }
            MarketEvent::Error(detail) => {
                warn!(detail = %detail, "market event stream reported an error");
            }
        }
    }

    /// The kline pipeline: buffer update, regime classification, strategy selection,
    /// MTF confirmation on entries, risk evaluation, journalling, and — if approved —
    /// order submission with a queued TP/SL.
    async fn handle_kline(self: &Arc<Self>, symbol: &str, candle: crate::types::Candle) {
        self.candles.update(symbol, candle).await;

        if !self.candles.has_enough(symbol, ENTRY_FRAME_MIN_CANDLES).await {
            return;
        }
        if self.is_trading_paused() {
            return;
        }

        let snapshot = self.candles.get(symbol).await;
        let Some(regime) = self.selector.detect_regime(&snapshot) else { return };

        let funding_history = self.funding.history(symbol).await;
        let signals = self.selector.generate_signals(symbol, regime, &self.candles, funding_history.as_deref()).await;
        let Some(signal) = StrategySelector::best_signal(signals) else { return };

        if signal.direction.is_entry() && self.settings.trading.enable_mtf_confirm {
            let verdict = self.mtf.confirm(symbol, signal.direction, &self.higher_candles).await;
            let passes = match verdict {
                MtfVerdict::Confirmed => true,
                MtfVerdict::Rejected => false,
                // Not enough higher-timeframe history yet: treat like any other
                // unconfirmed entry and hold off rather than trade blind.
                MtfVerdict::InsufficientData => false,
            };
            if !passes {
                if let Err(e) = self
                    .journal
                    .log_signal(&self.session_id, symbol, signal.direction, signal.confidence, &signal.strategy_name, signal.entry_price, signal.stop_loss, signal.take_profit, false, "mtf_not_confirmed")
                    .await
                {
                    error!(error = %e, "failed to journal mtf-rejected signal");
                }
                return;
            }
        }

        let equity = self.equity.read().await.current_equity;
        let positions = self.positions.snapshot().await;
        let atr = Self::latest_atr(&snapshot);
        let ctx = RiskContext { positions: &positions, equity, win_rate: None, winloss_ratio: None, atr };
        let decision = self.risk.evaluate(&signal, &ctx).await;

        if let Err(e) = self
            .journal
            .log_signal(&self.session_id, symbol, signal.direction, signal.confidence, &signal.strategy_name, signal.entry_price, decision.stop_loss, decision.take_profit, decision.approved, &decision.reason)
            .await
        {
            error!(error = %e, "failed to journal signal");
        }

        if !decision.approved {
            if let Err(e) = self.journal.log_risk_event(&self.session_id, symbol, &decision.reason, None).await {
                error!(error = %e, "failed to journal risk event");
            }
            return;
        }

        self.execute_decision(symbol, &signal, &decision, &positions, equity).await;
    }

    fn latest_atr(candles: &[crate::types::Candle]) -> Option<Decimal> {
        if candles.len() < 15 {
            return None;
        }
        let mut atr = ATR::new(14);
        let mut value = None;
        for c in candles {
            value = atr.update(c.high, c.low, c.close);
        }
        value
    }

    async fn execute_decision(
        self: &Arc<Self>,
        symbol: &str,
        signal: &crate::types::Signal,
        decision: &crate::types::RiskDecision,
        positions: &std::collections::HashMap<String, Position>,
        equity: Decimal,
    ) {
        let direction = signal.direction;
        let (side, reduce_only) = direction.to_order_params();
        let request = OrderRequest::market(symbol, side, decision.quantity, reduce_only).with_stops(decision.stop_loss, decision.take_profit);

        let order = match self.orders.submit_order(request, &signal.strategy_name).await {
            Ok(order) => order,
            Err(e) => {
                error!(symbol = %symbol, error = %e, "order submission failed");
                self.notifications.notify(AlertType::Error { component: "order_manager".to_string(), message: e.to_string() }).await;
                return;
            }
        };

        if let Err(e) = self.journal.log_order(&self.session_id, &order.client_order_id, order.exchange_order_id.as_deref(), &order.symbol, order.side, order.quantity, order.status).await {
            error!(error = %e, "failed to journal order");
        }

        if direction.is_entry() {
            let entry_price = order.average_fill_price.or(signal.entry_price).unwrap_or_default();
            self.notifications.notify(notifications::position_opened(symbol, order.side.as_str(), order.quantity, entry_price)).await;
            if decision.stop_loss.is_some() || decision.take_profit.is_some() {
                self.reconciler.queue_trading_stop(symbol, MAIN_POSITION_IDX, decision.stop_loss, decision.take_profit).await;
            }
        } else {
            let pnl = positions.get(symbol).map(|p| p.unrealized_pnl).unwrap_or_default();
            let pnl_pct = positions.get(symbol).map(|p| p.unrealized_pnl_pct_of_equity(equity)).unwrap_or_default();
            self.notifications.notify(notifications::position_closed(symbol, pnl, pnl_pct, "signal_close")).await;
        }
    }

    async fn run_reconcile_tick(self: &Arc<Self>, observed_symbols: Option<&[String]>) {
        let equity = self.equity.read().await.current_equity;
        let events = self.reconciler.reconcile_tick(equity, observed_symbols).await;
        for event in events {
            self.handle_reconcile_event(event).await;
        }
    }

    async fn handle_reconcile_event(self: &Arc<Self>, event: ReconcileEvent) {
        match event {
            ReconcileEvent::ExternalClose { signal, closed_size } => {
                if let Some(position) = self.positions.get(&signal.symbol).await {
                    let exit_price = signal.entry_price.unwrap_or(position.mark_price);
                    self.record_trade_closed(&signal.symbol, &position, closed_size, exit_price, &signal.strategy_name, "external_close").await;
                }
                if let Err(e) = self.journal.log_risk_event(&self.session_id, &signal.symbol, "external_close", Some(&closed_size.to_string())).await {
                    error!(error = %e, "failed to journal external close");
                }
                self.notifications
                    .notify(AlertType::ExternalCloseDetected { symbol: signal.symbol.clone(), size: closed_size.to_string() })
                    .await;
                self.positions.remove(&signal.symbol).await;
            }
            ReconcileEvent::ExitGuardTriggered { symbol, reason, signal } => {
                let (side, position) = match self.positions.get(&symbol).await {
                    Some(position) => {
                        let (side, _) = signal.direction.to_order_params();
                        (side, position)
                    }
                    None => return,
                };
                if reason == ExitReason::TrailingStop {
                    self.notifications
                        .notify(AlertType::TrailingStopActivated { symbol: symbol.clone(), peak_pnl: String::new(), trigger_pnl: String::new() })
                        .await;
                }
                let (events, closed_qty) = self.reconciler.submit_close(&symbol, side, position.size).await;
                for event in events {
                    if let ReconcileEvent::ReduceOnlyRaceRequiresIntervention { symbol } = event {
                        self.notifications.notify(AlertType::ReduceOnlyRaceRequiresIntervention { symbol }).await;
                    }
                }
                if closed_qty > Decimal::ZERO {
                    self.record_trade_closed(&symbol, &position, closed_qty, position.mark_price, &signal.strategy_name, reason.as_str()).await;
                }
            }
            ReconcileEvent::TradingStopConfirmed { symbol } => {
                info!(symbol = %symbol, "trading stop confirmed");
            }
            ReconcileEvent::TradingStopFailed { symbol } => {
                self.notifications.notify(AlertType::TradingStopUnconfirmed { symbol }).await;
            }
            ReconcileEvent::ReduceOnlyRaceRequiresIntervention { symbol } => {
                self.notifications.notify(AlertType::ReduceOnlyRaceRequiresIntervention { symbol }).await;
            }
        }
    }

    /// Realized-pnl accounting for a confirmed close: prorates the position's unrealized
    /// pnl by the fraction actually closed, journals the trade row, and feeds the win/loss
    /// back into the circuit breaker, symbol cooldown, and strategy deweighting so the next
    /// signal on this symbol/strategy sees the updated state.
    async fn record_trade_closed(self: &Arc<Self>, symbol: &str, position: &Position, closed_qty: Decimal, exit_price: Decimal, strategy_name: &str, exit_reason: &str) {
        if position.size <= Decimal::ZERO {
            return;
        }
        let closed_qty = closed_qty.min(position.size);
        if closed_qty <= Decimal::ZERO {
            return;
        }

        let fraction = closed_qty / position.size;
        let realized_pnl = position.unrealized_pnl * fraction;
        let is_win = realized_pnl > Decimal::ZERO;

        self.risk.record_trade_result(symbol, is_win).await;
        self.selector.record_trade_result(strategy_name, realized_pnl).await;

        let side = match position.side {
            PositionSide::Long => Side::Buy,
            _ => Side::Sell,
        };

        if let Err(e) = self
            .journal
            .log_trade(&self.session_id, symbol, side, position.entry_price, exit_price, closed_qty, realized_pnl, strategy_name, exit_reason)
            .await
        {
            error!(error = %e, "failed to journal trade close");
        }
    }

    async fn equity_snapshot_tick(self: Arc<Self>) {
        let balance = match self.exchange.fetch_balance(QUOTE_ASSET).await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "equity snapshot fetch failed");
                return;
            }
        };
        let unrealized = self.positions.aggregate_unrealized_pnl().await;
        let drawdown_pct = self.equity.write().await.update(balance);

        if let Err(e) = self.journal.log_equity_snapshot(&self.session_id, balance, unrealized, drawdown_pct).await {
            error!(error = %e, "failed to journal equity snapshot");
        }

        self.risk.drawdown_monitor().update_equity(balance).await;
        if self.risk.drawdown_monitor().is_halted().await {
            self.notifications
                .notify(AlertType::DrawdownHalted { current_drawdown: drawdown_pct.to_string(), max_allowed: self.settings.risk.max_drawdown_pct.to_string() })
                .await;
        }
    }

    async fn health_check_tick(self: Arc<Self>) {
        match self.exchange.server_time().await {
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "exchange health check failed");
                self.notifications.notify(AlertType::ExchangeUnavailable { detail: e.to_string() }).await;
            }
        }
        self.run_reconcile_tick(None).await;
    }

    async fn funding_refresh_tick(self: Arc<Self>) {
        self.funding.refresh(&self.settings.trading.enabled_symbols).await;
    }

    async fn trading_stop_retry_tick(self: Arc<Self>) {
        let events = self.reconciler.process_trading_stop_retries(MAIN_POSITION_IDX).await;
        for event in events {
            self.handle_reconcile_event(event).await;
        }
    }

    async fn daily_reset_tick(self: Arc<Self>) {
        let now = Utc::now();
        if now.hour_matches_reset() {
            let equity = self.equity.read().await.current_equity;
            self.equity.write().await.reset_daily();
            self.risk.drawdown_monitor().reset_daily(equity).await;
            info!("daily equity baseline reset");
        }
    }

    pub fn settings(&self) -> &Arc<AppSettings> {
        &self.settings
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn snapshot_positions(&self) -> std::collections::HashMap<String, crate::types::Position> {
        self.positions.snapshot().await
    }

    pub async fn recent_notifications(&self, limit: usize) -> Vec<crate::notifications::Notification> {
        self.notifications.get_recent(limit).await
    }
}

/// Narrow extension used only to decide when the daily equity baseline rolls over — exactly
/// at UTC midnight, checked once an hour rather than run as a separate minute-resolution
/// timer.
trait ResetHourExt {
    fn hour_matches_reset(&self) -> bool;
}

impl ResetHourExt for chrono::DateTime<Utc> {
    fn hour_matches_reset(&self) -> bool {
        use chrono::Timelike;
        self.hour() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use crate::exchange::ExchangeError;
    use crate::types::{Candle, ExchangeOrderStatus, FundingRateSample, InstrumentInfo, OrderResult, Position, PositionIdx, Ticker, TimeFrame};

    struct StubExchange {
        balance: Decimal,
    }

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
            Ok(self.balance)
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

    async fn core() -> TradingCore {
        let mut settings = AppSettings::default();
        settings.journal.database_path = "sqlite::memory:".to_string();
        TradingCore::new(settings, Arc::new(StubExchange { balance: dec!(10000) })).await.unwrap()
    }

    #[tokio::test]
    async fn bootstrap_initialises_equity_from_starting_balance() {
        let core = core().await;
        assert_eq!(core.equity.read().await.current_equity, dec!(10000));
        assert!(!core.is_running());
    }

    #[tokio::test]
    async fn pause_blocks_signal_generation_but_not_state() {
        let core = core().await;
        assert!(!core.is_trading_paused());
        core.pause_trading();
        assert!(core.is_trading_paused());
        core.resume_trading();
        assert!(!core.is_trading_paused());
    }

    #[tokio::test]
    async fn handle_kline_is_a_noop_below_the_minimum_frame_size() {
        let core = Arc::new(core().await);
        let candle = Candle {
            symbol: "BTCUSDT".to_string(),
            timeframe: TimeFrame::M15,
            open_time: Utc::now(),
            close_time: Utc::now(),
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100),
            volume: dec!(10),
            is_closed: true,
        };
        core.handle_kline("BTCUSDT", candle).await;
        assert_eq!(core.candles.get("BTCUSDT").await.len(), 1);
    }
}
