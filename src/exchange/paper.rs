use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::types::{
    Candle, ExchangeOrderStatus, FundingRateSample, InstrumentInfo, OrderRequest, OrderResult, Position, PositionIdx,
    PositionSide, Ticker, TimeFrame,
};

use super::error::ExchangeError;
use super::Exchange;

/// Simulates order execution and position bookkeeping in memory while delegating every
/// read-only market-data call to a real `Exchange` (so paper and live share one candle/
/// ticker/funding feed, differing only in whether orders actually reach the venue).
pub struct PaperExchange {
    market_data: Arc<dyn Exchange>,
    balance: RwLock<Decimal>,
    positions: RwLock<HashMap<String, Position>>,
}

impl PaperExchange {
    pub fn new(market_data: Arc<dyn Exchange>, starting_balance: Decimal) -> Self {
        Self {
            market_data,
            balance: RwLock::new(starting_balance),
            positions: RwLock::new(HashMap::new()),
        }
    }

    async fn fill_at_mark(&self, request: &OrderRequest) -> Result<Decimal, ExchangeError> {
        let ticker = self.market_data.fetch_ticker(&request.symbol).await?;
        Ok(ticker.mid_price())
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn fetch_ohlcv(&self, symbol: &str, timeframe: TimeFrame, limit: u32) -> Result<Vec<Candle>, ExchangeError> {
        self.market_data.fetch_ohlcv(symbol, timeframe, limit).await
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        self.market_data.fetch_ticker(symbol).await
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<FundingRateSample, ExchangeError> {
        self.market_data.fetch_funding_rate(symbol).await
    }

    async fn fetch_positions(&self, symbols: Option<&[String]>) -> Result<Vec<Position>, ExchangeError> {
        let positions = self.positions.read().await;
        Ok(match symbols {
            Some(wanted) => positions.values().filter(|p| wanted.contains(&p.symbol)).cloned().collect(),
            None => positions.values().cloned().collect(),
        })
    }

    async fn fetch_balance(&self, _asset: &str) -> Result<Decimal, ExchangeError> {
        Ok(*self.balance.read().await)
    }

    async fn fetch_instrument_info(&self, symbol: &str) -> Result<InstrumentInfo, ExchangeError> {
        self.market_data.fetch_instrument_info(symbol).await
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult, ExchangeError> {
        let fill_price = self.fill_at_mark(request).await?;
        let mut positions = self.positions.write().await;

        let entry = positions.entry(request.symbol.clone()).or_insert_with(|| Position {
            symbol: request.symbol.clone(),
            side: PositionSide::None,
            size: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            mark_price: fill_price,
            liquidation_price: None,
            leverage: Decimal::ONE,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            stop_loss: None,
            take_profit: None,
            position_idx: request.position_idx,
            first_seen_at: Utc::now(),
        });

        let delta = if matches!(request.side, crate::types::Side::Buy) { request.quantity } else { -request.quantity };
        let new_size = entry.size + delta;

        if new_size.is_zero() {
            let mut balance = self.balance.write().await;
            *balance += entry.unrealized_pnl;
            positions.remove(&request.symbol);
        } else {
            entry.size = new_size.abs();
            entry.side = if new_size > Decimal::ZERO { PositionSide::Long } else { PositionSide::Short };
            entry.entry_price = fill_price;
            entry.mark_price = fill_price;
            entry.stop_loss = request.stop_loss.or(entry.stop_loss);
            entry.take_profit = request.take_profit.or(entry.take_profit);
        }

        info!(symbol = %request.symbol, qty = %request.quantity, price = %fill_price, "paper fill");

        Ok(OrderResult {
            exchange_order_id: Uuid::new_v4().to_string(),
            client_order_id: request.client_order_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            status: ExchangeOrderStatus::Filled,
            quantity: request.quantity,
            filled_quantity: request.quantity,
            average_fill_price: Some(fill_price),
            fee: Decimal::ZERO,
        })
    }

    async fn cancel_order(&self, _order_id: &str, _symbol: &str) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn cancel_all_orders(&self, _symbol: &str) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, leverage: Decimal) -> Result<(), ExchangeError> {
        if let Some(position) = self.positions.write().await.get_mut(symbol) {
            position.leverage = leverage;
        }
        Ok(())
    }

    async fn set_position_trading_stop(
        &self,
        symbol: &str,
        _position_idx: PositionIdx,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<(), ExchangeError> {
        if let Some(position) = self.positions.write().await.get_mut(symbol) {
            if stop_loss.is_some() {
                position.stop_loss = stop_loss;
            }
            if take_profit.is_some() {
                position.take_profit = take_profit;
            }
        }
        Ok(())
    }

    async fn server_time(&self) -> Result<i64, ExchangeError> {
        Ok(Utc::now().timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct StubMarketData;

    #[async_trait]
    impl Exchange for StubMarketData {
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
    async fn opening_and_closing_a_position_credits_pnl_to_balance() {
        let exchange = PaperExchange::new(Arc::new(StubMarketData), dec!(10000));
        let open = OrderRequest::market("BTCUSDT", crate::types::Side::Buy, dec!(1), false);
        exchange.place_order(&open).await.unwrap();

        let positions = exchange.fetch_positions(None).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].size, dec!(1));

        let close = OrderRequest::market("BTCUSDT", crate::types::Side::Sell, dec!(1), true);
        exchange.place_order(&close).await.unwrap();

        let positions = exchange.fetch_positions(None).await.unwrap();
        assert!(positions.is_empty());
    }
}
