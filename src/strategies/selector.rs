use std::collections::{HashMap, VecDeque};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;

use crate::candles::CandleBuffer;
use crate::indicators::{Indicator, ADX, ATR};
use crate::types::{FundingRateSample, MarketRegime, Signal};

use super::breakout::BreakoutStrategy;
use super::ema_crossover::EmaCrossoverStrategy;
use super::funding_arb::FundingRateArbStrategy;
use super::grid::GridTradingStrategy;
use super::mean_reversion::MeanReversionStrategy;
use super::momentum::MomentumStrategy;
use super::trend::TrendFollowingStrategy;
use super::Strategy;

const ADX_TREND_THRESHOLD: Decimal = dec!(25);
const ATR_HIGH_VOL_THRESHOLD_PCT: Decimal = dec!(2.5);
const ROLLING_WINDOW: usize = 20;

/// Classifies the current market into one of four regimes and picks the strategy set
/// appropriate for it, deweighting (disabling) any strategy whose rolling 20-trade average
/// PnL has turned negative.
///
/// regime -> strategy names, grounded in the regime map the original strategy selector used
/// (`original_source/strategies/strategy_selector.py`).
pub struct StrategySelector {
    strategies: HashMap<String, Box<dyn Strategy>>,
    regime_map: HashMap<MarketRegime, Vec<&'static str>>,
    trade_results: RwLock<HashMap<String, VecDeque<Decimal>>>,
}

impl StrategySelector {
    pub fn new() -> Self {
        let mut strategies: HashMap<String, Box<dyn Strategy>> = HashMap::new();
        let trend: Box<dyn Strategy> = Box::new(TrendFollowingStrategy::new());
        let momentum: Box<dyn Strategy> = Box::new(MomentumStrategy::new());
        let breakout: Box<dyn Strategy> = Box::new(BreakoutStrategy::new());
        let ema: Box<dyn Strategy> = Box::new(EmaCrossoverStrategy::new());
        let mean_rev: Box<dyn Strategy> = Box::new(MeanReversionStrategy::new());
        let grid: Box<dyn Strategy> = Box::new(GridTradingStrategy::new());
        let funding_arb: Box<dyn Strategy> = Box::new(FundingRateArbStrategy::new());

        strategies.insert(trend.name().to_string(), trend);
        strategies.insert(momentum.name().to_string(), momentum);
        strategies.insert(breakout.name().to_string(), breakout);
        strategies.insert(ema.name().to_string(), ema);
        strategies.insert(mean_rev.name().to_string(), mean_rev);
        strategies.insert(grid.name().to_string(), grid);
        strategies.insert(funding_arb.name().to_string(), funding_arb);

        let mut regime_map = HashMap::new();
        regime_map.insert(MarketRegime::HighVolTrend, vec!["trend_following", "momentum", "breakout"]);
        regime_map.insert(MarketRegime::LowVolTrend, vec!["trend_following", "ema_crossover"]);
        regime_map.insert(MarketRegime::HighVolRange, vec!["mean_reversion", "grid_trading"]);
        regime_map.insert(
            MarketRegime::LowVolRange,
            vec!["grid_trading", "mean_reversion", "funding_rate_arb"],
        );

        Self {
            strategies,
            regime_map,
            trade_results: RwLock::new(HashMap::new()),
        }
    }

    /// ADX >= threshold means trending; ATR as a percentage of price above the threshold
    /// means high volatility. Four-way classification follows directly from those two axes.
    pub fn detect_regime(&self, candles_slice: &[crate::types::Candle]) -> Option<MarketRegime> {
        if candles_slice.len() < 30 {
            return None;
        }

        let mut adx = ADX::new(14);
        let mut atr = ATR::new(14);
        for c in candles_slice {
            adx.update(c.high, c.low, c.close);
            atr.update(c.high, c.low, c.close);
        }

        let adx_val = adx.value()?;
        let atr_val = atr.value()?;
        let price = candles_slice.last()?.close;
        let atr_pct = if price.is_zero() { Decimal::ZERO } else { (atr_val / price) * dec!(100) };

        let trending = adx_val >= ADX_TREND_THRESHOLD;
        let high_vol = atr_pct >= ATR_HIGH_VOL_THRESHOLD_PCT;

        Some(match (trending, high_vol) {
            (true, true) => MarketRegime::HighVolTrend,
            (true, false) => MarketRegime::LowVolTrend,
            (false, true) => MarketRegime::HighVolRange,
            (false, false) => MarketRegime::LowVolRange,
        })
    }

    /// Generates signals from every strategy mapped to `regime` whose rolling PnL average
    /// hasn't turned negative, sorted by confidence descending.
    pub async fn generate_signals(
        &self,
        symbol: &str,
        regime: MarketRegime,
        candles: &CandleBuffer,
        funding: Option<&[FundingRateSample]>,
    ) -> Vec<Signal> {
        let names = match self.regime_map.get(&regime) {
            Some(n) => n,
            None => return Vec::new(),
        };

        let mut signals = Vec::new();
        for name in names {
            if !self.is_enabled(name).await {
                continue;
            }
            if let Some(strategy) = self.strategies.get(*name) {
                if let Some(signal) = strategy.generate_signal(symbol, candles, funding).await {
                    signals.push(signal);
                }
            }
        }

        signals.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        signals
    }

    pub fn best_signal(signals: Vec<Signal>) -> Option<Signal> {
        signals.into_iter().next()
    }

    /// Rolling-20-trade average PnL: a strategy is disabled once its average goes negative
    /// and re-enabled once a recomputed average turns positive again.
    pub async fn record_trade_result(&self, strategy_name: &str, pnl: Decimal) {
        let mut results = self.trade_results.write().await;
        let window = results.entry(strategy_name.to_string()).or_insert_with(VecDeque::new);
        window.push_back(pnl);
        if window.len() > ROLLING_WINDOW {
            window.pop_front();
        }
    }

    pub async fn is_enabled(&self, strategy_name: &str) -> bool {
        let results = self.trade_results.read().await;
        match results.get(strategy_name) {
            Some(window) if !window.is_empty() => {
                let avg = window.iter().sum::<Decimal>() / Decimal::from(window.len() as u32);
                avg >= Decimal::ZERO
            }
            _ => true,
        }
    }

    pub async fn rolling_average(&self, strategy_name: &str) -> Option<Decimal> {
        let results = self.trade_results.read().await;
        let window = results.get(strategy_name)?;
        if window.is_empty() {
            return None;
        }
        Some(window.iter().sum::<Decimal>() / Decimal::from(window.len() as u32))
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn strategy_disabled_once_rolling_average_turns_negative() {
        let selector = StrategySelector::new();
        assert!(selector.is_enabled("trend_following").await);

        for _ in 0..ROLLING_WINDOW {
            selector.record_trade_result("trend_following", dec!(-10)).await;
        }
        assert!(!selector.is_enabled("trend_following").await);

        for _ in 0..ROLLING_WINDOW {
            selector.record_trade_result("trend_following", dec!(20)).await;
        }
        assert!(selector.is_enabled("trend_following").await);
    }
}
