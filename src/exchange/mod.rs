#![allow(dead_code)]
pub mod bybit;
pub mod error;
pub mod paper;
pub mod websocket;

pub use bybit::BybitClient;
pub use error::ExchangeError;
pub use paper::PaperExchange;
pub use websocket::{BybitWebSocket, MarketEvent};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{Candle, FundingRateSample, InstrumentInfo, OrderRequest, OrderResult, Position, PositionIdx, Ticker, TimeFrame};

/// Inbound REST contract every venue adapter implements (§6). Perp-specific operations
/// (`fetch_funding_rate`, `fetch_positions`, `set_leverage`, `set_position_trading_stop`)
/// sit alongside the spot-style operations the teacher's `Exchange` trait already covers.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn fetch_ohlcv(&self, symbol: &str, timeframe: TimeFrame, limit: u32) -> Result<Vec<Candle>, ExchangeError>;
    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;
    async fn fetch_funding_rate(&self, symbol: &str) -> Result<FundingRateSample, ExchangeError>;
    async fn fetch_positions(&self, symbols: Option<&[String]>) -> Result<Vec<Position>, ExchangeError>;
    async fn fetch_balance(&self, asset: &str) -> Result<Decimal, ExchangeError>;
    async fn fetch_instrument_info(&self, symbol: &str) -> Result<InstrumentInfo, ExchangeError>;
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult, ExchangeError>;
    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<(), ExchangeError>;
    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ExchangeError>;
    async fn set_leverage(&self, symbol: &str, leverage: Decimal) -> Result<(), ExchangeError>;
    async fn set_position_trading_stop(
        &self,
        symbol: &str,
        position_idx: PositionIdx,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<(), ExchangeError>;
    async fn server_time(&self) -> Result<i64, ExchangeError>;
}
