use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

use crate::exchange::{Exchange, ExchangeError};
use crate::types::{Position, PositionSide};

/// Authoritative cache of `{symbol -> Position}` for positions with `size > 0`.
/// A symbol's absence from the map *is* the statement that it has no open position.
pub struct PositionManager {
    exchange: Arc<dyn Exchange>,
    positions: RwLock<HashMap<String, Position>>,
}

impl PositionManager {
    pub fn new(exchange: Arc<dyn Exchange>) -> Self {
        Self { exchange, positions: RwLock::new(HashMap::new()) }
    }

    /// Full sync (`symbols = None`) rebuilds the map from scratch. Partial sync only
    /// replaces the listed symbols — positions for symbols outside the scope are left
    /// untouched, so resyncing one symbol never looks like every other symbol closed.
    pub async fn sync_positions(&self, symbols: Option<&[String]>) -> Result<(), ExchangeError> {
        let fetched = self.exchange.fetch_positions(symbols).await?;
        let mut positions = self.positions.write().await;

        match symbols {
            None => {
                positions.clear();
                for p in fetched {
                    if p.is_open() {
                        positions.insert(p.symbol.clone(), p);
                    }
                }
            }
            Some(scope) => {
                for symbol in scope {
                    positions.remove(symbol);
                }
                for p in fetched {
                    if p.is_open() {
                        positions.insert(p.symbol.clone(), p);
                    }
                }
            }
        }
        debug!(count = positions.len(), partial = symbols.is_some(), "positions synced");
        Ok(())
    }

    /// Adds the position if `size > 0`, removes it if zero.
    pub async fn update_position(&self, p: Position) {
        let mut positions = self.positions.write().await;
        if p.is_open() {
            positions.insert(p.symbol.clone(), p);
        } else {
            positions.remove(&p.symbol);
        }
    }

    pub async fn get(&self, symbol: &str) -> Option<Position> {
        self.positions.read().await.get(symbol).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<String, Position> {
        self.positions.read().await.clone()
    }

    pub async fn by_side(&self, side: PositionSide) -> Vec<Position> {
        self.positions.read().await.values().filter(|p| p.side == side).cloned().collect()
    }

    pub async fn aggregate_unrealized_pnl(&self) -> Decimal {
        self.positions.read().await.values().map(|p| p.unrealized_pnl).sum()
    }

    pub async fn remove(&self, symbol: &str) {
        self.positions.write().await.remove(symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use crate::types::{Candle, FundingRateSample, InstrumentInfo, OrderRequest, OrderResult, PositionIdx, Ticker, TimeFrame};

    struct StubExchange {
        positions: Vec<Position>,
    }

    fn pos(symbol: &str, size: Decimal) -> Position {
        Position {
            symbol: symbol.to_string(),
            side: if size.is_zero() { PositionSide::None } else { PositionSide::Long },
            size,
            entry_price: dec!(100),
            mark_price: dec!(101),
            liquidation_price: None,
            leverage: dec!(3),
            unrealized_pnl: dec!(1),
            realized_pnl: Decimal::ZERO,
            stop_loss: None,
            take_profit: None,
            position_idx: 0,
            first_seen_at: Utc::now(),
        }
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
        async fn fetch_positions(&self, symbols: Option<&[String]>) -> Result<Vec<Position>, ExchangeError> {
            Ok(match symbols {
                Some(wanted) => self.positions.iter().filter(|p| wanted.contains(&p.symbol)).cloned().collect(),
                None => self.positions.clone(),
            })
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
    async fn full_sync_rebuilds_map_and_drops_closed_positions() {
        let exchange = Arc::new(StubExchange { positions: vec![pos("BTCUSDT", dec!(1))] });
        let manager = PositionManager::new(exchange);
        manager.update_position(pos("ETHUSDT", dec!(2))).await;

        manager.sync_positions(None).await.unwrap();

        assert!(manager.get("BTCUSDT").await.is_some());
        assert!(manager.get("ETHUSDT").await.is_none());
    }

    #[tokio::test]
    async fn partial_sync_does_not_evict_out_of_scope_symbols() {
        let exchange = Arc::new(StubExchange { positions: vec![] });
        let manager = PositionManager::new(exchange);
        manager.update_position(pos("ETHUSDT", dec!(2))).await;

        manager.sync_positions(Some(&["BTCUSDT".to_string()])).await.unwrap();

        assert!(manager.get("ETHUSDT").await.is_some());
    }

    #[tokio::test]
    async fn update_position_removes_zero_size() {
        let manager = PositionManager::new(Arc::new(StubExchange { positions: vec![] }));
        manager.update_position(pos("BTCUSDT", dec!(1))).await;
        assert!(manager.get("BTCUSDT").await.is_some());

        manager.update_position(pos("BTCUSDT", Decimal::ZERO)).await;
        assert!(manager.get("BTCUSDT").await.is_none());
    }
}
