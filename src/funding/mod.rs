use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::exchange::Exchange;
use crate::types::FundingRateSample;

const HISTORY_CAPACITY: usize = 240;
const DISABLE_AFTER_CONSECUTIVE_FAILURES: u32 = 3;

/// Maintains a bounded per-symbol funding-rate history and globally disables the
/// funding-arb strategy after repeated refresh failures, re-enabling it on the next
/// success.
pub struct FundingRateFeeder {
    exchange: Arc<dyn Exchange>,
    history: RwLock<HashMap<String, Vec<FundingRateSample>>>,
    consecutive_failures: AtomicU32,
    strategy_enabled: AtomicBool,
}

impl FundingRateFeeder {
    pub fn new(exchange: Arc<dyn Exchange>) -> Self {
        Self {
            exchange,
            history: RwLock::new(HashMap::new()),
            consecutive_failures: AtomicU32::new(0),
            strategy_enabled: AtomicBool::new(true),
        }
    }

    /// Fetches the latest funding rate for every symbol and appends it to that symbol's
    /// bounded history, evicting the oldest sample once the cap is reached.
    pub async fn refresh(&self, symbols: &[String]) {
        let mut any_success = false;
        let mut any_failure = false;

        for symbol in symbols {
            match self.exchange.fetch_funding_rate(symbol).await {
                Ok(sample) => {
                    any_success = true;
                    let mut history = self.history.write().await;
                    let series = history.entry(symbol.clone()).or_default();
                    series.push(sample);
                    if series.len() > HISTORY_CAPACITY {
                        let overflow = series.len() - HISTORY_CAPACITY;
                        series.drain(0..overflow);
                    }
                }
                Err(e) => {
                    any_failure = true;
                    warn!(symbol = %symbol, error = %e, "funding rate refresh failed");
                }
            }
        }

        if any_success {
            self.consecutive_failures.store(0, Ordering::SeqCst);
            if !self.strategy_enabled.swap(true, Ordering::SeqCst) {
                info!("funding_rate_arb strategy re-enabled after successful refresh");
            }
        } else if any_failure {
            let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            if failures >= DISABLE_AFTER_CONSECUTIVE_FAILURES && self.strategy_enabled.swap(false, Ordering::SeqCst) {
                warn!(failures, "funding_rate_arb strategy disabled after consecutive refresh failures");
            }
        }
    }

    pub async fn history(&self, symbol: &str) -> Option<Vec<FundingRateSample>> {
        self.history.read().await.get(symbol).cloned()
    }

    pub fn is_strategy_enabled(&self) -> bool {
        self.strategy_enabled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicU32 as StdAtomicU32;

    use crate::exchange::ExchangeError;
    use crate::types::{Candle, InstrumentInfo, OrderRequest, OrderResult, Position, PositionIdx, Ticker, TimeFrame};

    struct FlakyExchange {
        fail_count: StdAtomicU32,
        fail_first_n: u32,
    }

    #[async_trait]
    impl Exchange for FlakyExchange {
        async fn fetch_ohlcv(&self, _s: &str, _t: TimeFrame, _l: u32) -> Result<Vec<Candle>, ExchangeError> {
            Ok(vec![])
        }
        async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
            Ok(Ticker { symbol: symbol.to_string(), price: dec!(100), bid: dec!(99.9), ask: dec!(100.1), volume_24h: dec!(1000), timestamp: Utc::now() })
        }
        async fn fetch_funding_rate(&self, _symbol: &str) -> Result<FundingRateSample, ExchangeError> {
            let attempt = self.fail_count.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first_n {
                Err(ExchangeError::Network("timeout".to_string()))
            } else {
                Ok(FundingRateSample { rate: dec!(0.0001), timestamp: Utc::now() })
            }
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
        async fn place_order(&self, _r: &OrderRequest) -> Result<OrderResult, ExchangeError> {
            unreachable!()
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

    #[tokio::test]
    async fn history_accumulates_and_caps_at_240() {
        let feeder = FundingRateFeeder::new(Arc::new(FlakyExchange { fail_count: StdAtomicU32::new(0), fail_first_n: 0 }));
        let symbols = vec!["BTCUSDT".to_string()];
        for _ in 0..250 {
            feeder.refresh(&symbols).await;
        }
        let history = feeder.history("BTCUSDT").await.unwrap();
        assert_eq!(history.len(), HISTORY_CAPACITY);
    }

    #[tokio::test]
    async fn three_consecutive_failures_disable_strategy_then_success_reenables() {
        let feeder = FundingRateFeeder::new(Arc::new(FlakyExchange { fail_count: StdAtomicU32::new(0), fail_first_n: 3 }));
        let symbols = vec!["BTCUSDT".to_string()];

        feeder.refresh(&symbols).await;
        feeder.refresh(&symbols).await;
        assert!(feeder.is_strategy_enabled());

        feeder.refresh(&symbols).await;
        assert!(!feeder.is_strategy_enabled());

        feeder.refresh(&symbols).await;
        assert!(feeder.is_strategy_enabled());
    }
}
