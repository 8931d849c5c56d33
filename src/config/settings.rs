use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    pub use_testnet: bool,
    pub recv_window_ms: u32,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            use_testnet: true,
            recv_window_ms: 5000,
        }
    }
}

/// Every field enumerated in SPEC_FULL.md §6 "Risk".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSettings {
    pub max_risk_per_trade: Decimal,
    pub max_portfolio_risk: Decimal,
    pub max_drawdown_pct: Decimal,
    pub max_daily_loss_pct: Decimal,
    pub max_leverage: Decimal,
    pub max_concurrent_positions: usize,
    pub circuit_breaker_consecutive_losses: u32,
    pub circuit_breaker_cooldown_hours: u32,
    pub soft_stop_threshold_pct: Decimal,
    pub soft_stop_min_confidence: f64,
    pub portfolio_heat_limit_pct: Decimal,
    pub max_spread_bps: Decimal,
    pub min_liquidity_score: f64,
    pub funding_arb_max_allocation: Decimal,
    pub enable_directional_exposure_limit: bool,
    pub max_directional_exposure_pct: Decimal,
    pub enable_symbol_cooldown: bool,
    pub symbol_cooldown_minutes: i64,
    pub sizing_method: PositionSizingMethod,
    pub side_balancer_streak_threshold: u32,
    pub side_balancer_imbalance_pct: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSizingMethod {
    FixedFractional,
    HalfKelly,
    Volatility,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            max_risk_per_trade: dec!(0.02),
            max_portfolio_risk: dec!(0.10),
            max_drawdown_pct: dec!(0.15),
            max_daily_loss_pct: dec!(0.05),
            max_leverage: dec!(3.0),
            max_concurrent_positions: 10,
            circuit_breaker_consecutive_losses: 3,
            circuit_breaker_cooldown_hours: 4,
            soft_stop_threshold_pct: dec!(0.80),
            soft_stop_min_confidence: 0.75,
            portfolio_heat_limit_pct: dec!(0.08),
            max_spread_bps: dec!(15),
            min_liquidity_score: 0.30,
            funding_arb_max_allocation: dec!(0.30),
            enable_directional_exposure_limit: true,
            max_directional_exposure_pct: dec!(0.60),
            enable_symbol_cooldown: true,
            symbol_cooldown_minutes: 180,
            sizing_method: PositionSizingMethod::FixedFractional,
            side_balancer_streak_threshold: 3,
            side_balancer_imbalance_pct: dec!(0.25),
        }
    }
}

/// Exit-guard configuration (SPEC_FULL.md §6 "Risk guards").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardSettings {
    pub enable_max_hold_exit: bool,
    pub max_hold_minutes: i64,
    pub enable_pnl_pct_exit: bool,
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub enable_pnl_usdt_exit: bool,
    pub take_profit_usdt: Decimal,
    pub stop_loss_usdt: Decimal,
    pub enable_trailing_stop_exit: bool,
    pub trailing_stop_pct: Decimal,
    pub trailing_stop_min_peak_pct: Decimal,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            enable_max_hold_exit: true,
            max_hold_minutes: 90,
            enable_pnl_pct_exit: true,
            take_profit_pct: dec!(0.006),
            stop_loss_pct: dec!(0.004),
            enable_pnl_usdt_exit: false,
            take_profit_usdt: Decimal::ZERO,
            stop_loss_usdt: Decimal::ZERO,
            enable_trailing_stop_exit: true,
            trailing_stop_pct: dec!(0.35),
            trailing_stop_min_peak_pct: dec!(0.003),
        }
    }
}

impl GuardSettings {
    /// Open Question (spec.md §9) resolved: the two PnL-exit variants are mutually exclusive
    /// by construction, enforced at config-validation time rather than left to a runtime
    /// `elif` that silently prefers one.
    pub fn validate(&self) -> Result<(), String> {
        if self.enable_pnl_pct_exit && self.enable_pnl_usdt_exit {
            return Err("enable_pnl_pct_exit and enable_pnl_usdt_exit cannot both be true".to_string());
        }
        Ok(())
    }
}

/// TP/SL trading-stop retry policy (SPEC_FULL.md §6 "Trading stop").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradingStopSettings {
    pub retry_max_attempts: u32,
    pub retry_interval_sec: f64,
    pub confirm_timeout_sec: i64,
}

impl Default for TradingStopSettings {
    fn default() -> Self {
        Self {
            retry_max_attempts: 3,
            retry_interval_sec: 1.0,
            confirm_timeout_sec: 30,
        }
    }
}

/// SPEC_FULL.md §6 "Trading".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSettings {
    pub default_timeframe: crate::types::TimeFrame,
    pub enable_mtf_confirm: bool,
    pub mtf_confirm_tf: crate::types::TimeFrame,
    pub mtf_confirm_adx_min: Decimal,
    pub mtf_confirm_min_bars: usize,
    pub enable_exchange_close_fallback: bool,
    pub close_missing_confirmations: u32,
    pub close_dedup_ttl_sec: i64,
    pub candle_buffer_size: usize,
    pub enabled_symbols: Vec<String>,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            default_timeframe: crate::types::TimeFrame::M15,
            enable_mtf_confirm: true,
            mtf_confirm_tf: crate::types::TimeFrame::H1,
            mtf_confirm_adx_min: dec!(20),
            mtf_confirm_min_bars: 80,
            enable_exchange_close_fallback: true,
            close_missing_confirmations: 2,
            close_dedup_ttl_sec: 300,
            candle_buffer_size: 500,
            enabled_symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string(), "SOLUSDT".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    pub enabled: bool,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalSettings {
    pub database_path: String,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            database_path: "journal.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Immutable configuration record passed by reference (`Arc<AppSettings>`) into every
/// component's constructor. The orchestrator is the single owner; nothing mutates it at
/// runtime — changing the configuration means restarting with a new one.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppSettings {
    pub exchange: ExchangeSettings,
    pub risk: RiskSettings,
    pub guards: GuardSettings,
    pub trading_stop: TradingStopSettings,
    pub trading: TradingSettings,
    pub telegram: TelegramSettings,
    pub journal: JournalSettings,
    pub logging: LoggingSettings,
}

impl AppSettings {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(Decimal::ZERO < self.risk.max_risk_per_trade && self.risk.max_risk_per_trade <= Decimal::ONE) {
            errors.push("risk.max_risk_per_trade must be in (0, 1]".to_string());
        }
        if !(Decimal::ZERO < self.risk.max_drawdown_pct && self.risk.max_drawdown_pct <= Decimal::ONE) {
            errors.push("risk.max_drawdown_pct must be in (0, 1]".to_string());
        }
        if self.risk.max_leverage <= Decimal::ZERO {
            errors.push("risk.max_leverage must be > 0".to_string());
        }
        if self.risk.max_concurrent_positions == 0 {
            errors.push("risk.max_concurrent_positions must be >= 1".to_string());
        }
        if self.risk.circuit_breaker_consecutive_losses == 0 {
            errors.push("risk.circuit_breaker_consecutive_losses must be >= 1".to_string());
        }
        if self.trading_stop.retry_max_attempts == 0 {
            errors.push("trading_stop.retry_max_attempts must be >= 1".to_string());
        }
        if self.trading_stop.confirm_timeout_sec <= 0 {
            errors.push("trading_stop.confirm_timeout_sec must be > 0".to_string());
        }
        if self.trading.close_missing_confirmations == 0 {
            errors.push("trading.close_missing_confirmations must be >= 1".to_string());
        }
        if self.trading.close_dedup_ttl_sec <= 0 {
            errors.push("trading.close_dedup_ttl_sec must be > 0".to_string());
        }
        if let Err(e) = self.guards.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
