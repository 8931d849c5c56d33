use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::exchange::{Exchange, ExchangeError};
use crate::types::{ExchangeOrderStatus, InFlightOrder, InFlightStatus, InstrumentInfo, OrderRequest, OrderResult};

#[derive(Debug, thiserror::Error)]
pub enum OrderManagerError {
    #[error("quantity {0} below instrument minimum {1}")]
    BelowMinQty(Decimal, Decimal),
    #[error("normalised quantity is not positive")]
    NonPositiveQty,
    #[error("order {0} not found locally")]
    NotFound(String),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// Submits orders against a venue, normalising quantities against cached instrument rules
/// and maintaining a local shadow registry keyed by `client_order_id`.
pub struct OrderManager {
    exchange: Arc<dyn Exchange>,
    instruments: RwLock<HashMap<String, InstrumentInfo>>,
    orders: RwLock<HashMap<String, InFlightOrder>>,
}

impl OrderManager {
    pub fn new(exchange: Arc<dyn Exchange>) -> Self {
        Self {
            exchange,
            instruments: RwLock::new(HashMap::new()),
            orders: RwLock::new(HashMap::new()),
        }
    }

    async fn instrument_info(&self, symbol: &str) -> Result<InstrumentInfo, OrderManagerError> {
        if let Some(info) = self.instruments.read().await.get(symbol) {
            return Ok(*info);
        }
        let info = self.exchange.fetch_instrument_info(symbol).await?;
        self.instruments.write().await.insert(symbol.to_string(), info);
        Ok(info)
    }

    /// Assigns a `client_order_id` if absent, normalises quantity against instrument rules,
    /// forwards to the venue, and records the resulting in-flight order locally.
    pub async fn submit_order(
        &self,
        mut request: OrderRequest,
        strategy_name: &str,
    ) -> Result<InFlightOrder, OrderManagerError> {
        if request.client_order_id.is_empty() {
            request.client_order_id = uuid::Uuid::new_v4().to_string();
        }

        let info = self.instrument_info(&request.symbol).await?;
        let normalised = info.normalize_quantity(request.quantity);
        if normalised <= Decimal::ZERO {
            return Err(OrderManagerError::NonPositiveQty);
        }
        if normalised < info.min_qty {
            return Err(OrderManagerError::BelowMinQty(normalised, info.min_qty));
        }
        request.quantity = normalised;

        let mut order = InFlightOrder::new(&request, strategy_name);
        self.orders.write().await.insert(order.client_order_id.clone(), order.clone());

        match self.exchange.place_order(&request).await {
            Ok(result) => {
                order.exchange_order_id = Some(result.exchange_order_id.clone());
                order.touch(status_for(result.status));
                order.filled_quantity = result.filled_quantity;
                order.average_fill_price = result.average_fill_price;
                order.fee = result.fee;
                info!(client_order_id = %order.client_order_id, symbol = %order.symbol, "order submitted");
            }
            Err(e) => {
                order.touch(InFlightStatus::Done);
                warn!(client_order_id = %order.client_order_id, error = %e, "order submission failed");
                self.orders.write().await.insert(order.client_order_id.clone(), order.clone());
                return Err(e.into());
            }
        }

        self.orders.write().await.insert(order.client_order_id.clone(), order.clone());
        Ok(order)
    }

    /// `open -> pending_cancel -> done`; "order not found" on the venue is treated as
    /// success since the order is already gone. Any other failure rolls back to `open`.
    pub async fn cancel_order(&self, client_order_id: &str) -> Result<(), OrderManagerError> {
        let (symbol, exchange_order_id) = {
            let mut orders = self.orders.write().await;
            let order = orders.get_mut(client_order_id).ok_or_else(|| OrderManagerError::NotFound(client_order_id.to_string()))?;
            order.touch(InFlightStatus::PendingCancel);
            (order.symbol.clone(), order.exchange_order_id.clone())
        };

        let Some(exchange_order_id) = exchange_order_id else {
            self.mark_done(client_order_id).await;
            return Ok(());
        };

        match self.exchange.cancel_order(&exchange_order_id, &symbol).await {
            Ok(()) => {
                self.mark_done(client_order_id).await;
                Ok(())
            }
            Err(ExchangeError::OrderNotFound(_)) => {
                self.mark_done(client_order_id).await;
                Ok(())
            }
            Err(e) => {
                if let Some(order) = self.orders.write().await.get_mut(client_order_id) {
                    order.touch(InFlightStatus::Open);
                }
                Err(e.into())
            }
        }
    }

    /// Broadcasts a cancel-all to the venue and locally marks every non-done order for
    /// `symbol` as done.
    pub async fn cancel_all(&self, symbol: &str) -> Result<(), OrderManagerError> {
        self.exchange.cancel_all_orders(symbol).await?;
        let mut orders = self.orders.write().await;
        for order in orders.values_mut() {
            if order.symbol == symbol && !order.status.is_terminal() {
                order.touch(InFlightStatus::Done);
            }
        }
        Ok(())
    }

    /// Merges a venue acknowledgement into the matching local order by `exchange_order_id`.
    pub async fn update_from_exchange(&self, result: &OrderResult) {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.values_mut().find(|o| o.exchange_order_id.as_deref() == Some(result.exchange_order_id.as_str())) else {
            warn!(exchange_order_id = %result.exchange_order_id, "order update for unknown order");
            return;
        };
        order.filled_quantity = result.filled_quantity;
        order.average_fill_price = result.average_fill_price;
        order.fee = result.fee;
        order.touch(status_for(result.status));
    }

    async fn mark_done(&self, client_order_id: &str) {
        if let Some(order) = self.orders.write().await.get_mut(client_order_id) {
            order.touch(InFlightStatus::Done);
        }
    }

    pub async fn get(&self, client_order_id: &str) -> Option<InFlightOrder> {
        self.orders.read().await.get(client_order_id).cloned()
    }

    pub async fn open_orders(&self, symbol: &str) -> Vec<InFlightOrder> {
        self.orders
            .read()
            .await
            .values()
            .filter(|o| o.symbol == symbol && !o.status.is_terminal())
            .cloned()
            .collect()
    }
}

fn status_for(status: ExchangeOrderStatus) -> InFlightStatus {
    match status {
        ExchangeOrderStatus::New => InFlightStatus::Open,
        ExchangeOrderStatus::PartiallyFilled => InFlightStatus::PartiallyFilled,
        ExchangeOrderStatus::Filled | ExchangeOrderStatus::Cancelled | ExchangeOrderStatus::Rejected => InFlightStatus::Done,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use crate::types::{Candle, FundingRateSample, Position, PositionIdx, Side, Ticker, TimeFrame};

    struct StubExchange {
        min_qty: Decimal,
        qty_step: Decimal,
        fail_place: bool,
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
            Ok(dec!(10000))
        }
        async fn fetch_instrument_info(&self, _s: &str) -> Result<InstrumentInfo, ExchangeError> {
            Ok(InstrumentInfo { min_qty: self.min_qty, max_qty: dec!(1000), qty_step: self.qty_step, tick_size: dec!(0.1), max_leverage: dec!(10) })
        }
        async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult, ExchangeError> {
            if self.fail_place {
                return Err(ExchangeError::InvalidOrder("rejected".to_string()));
            }
            Ok(OrderResult {
                exchange_order_id: "EX-1".to_string(),
                client_order_id: request.client_order_id.clone(),
                symbol: request.symbol.clone(),
                side: request.side,
                status: ExchangeOrderStatus::New,
                quantity: request.quantity,
                filled_quantity: Decimal::ZERO,
                average_fill_price: None,
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

    #[tokio::test]
    async fn submit_order_normalises_quantity_and_assigns_id() {
        let manager = OrderManager::new(Arc::new(StubExchange { min_qty: dec!(0.001), qty_step: dec!(0.01), fail_place: false }));
        let mut request = OrderRequest::market("BTCUSDT", Side::Buy, dec!(1.2345), false);
        request.client_order_id.clear();

        let order = manager.submit_order(request, "trend_following").await.unwrap();
        assert_eq!(order.quantity, dec!(1.23));
        assert!(!order.client_order_id.is_empty());
        assert_eq!(order.status, InFlightStatus::Open);
    }

    #[tokio::test]
    async fn submit_order_rejects_below_min_qty() {
        let manager = OrderManager::new(Arc::new(StubExchange { min_qty: dec!(1), qty_step: dec!(0.01), fail_place: false }));
        let request = OrderRequest::market("BTCUSDT", Side::Buy, dec!(0.5), false);

        let err = manager.submit_order(request, "trend_following").await.unwrap_err();
        assert!(matches!(err, OrderManagerError::BelowMinQty(_, _)));
    }

    #[tokio::test]
    async fn submit_order_failure_marks_order_done() {
        let manager = OrderManager::new(Arc::new(StubExchange { min_qty: dec!(0.001), qty_step: dec!(0.01), fail_place: true }));
        let request = OrderRequest::market("BTCUSDT", Side::Buy, dec!(1), false);
        let client_order_id = request.client_order_id.clone();

        assert!(manager.submit_order(request, "trend_following").await.is_err());
        let order = manager.get(&client_order_id).await.unwrap();
        assert_eq!(order.status, InFlightStatus::Done);
    }

    #[tokio::test]
    async fn cancel_order_not_found_locally_still_treated_as_not_found() {
        let manager = OrderManager::new(Arc::new(StubExchange { min_qty: dec!(0.001), qty_step: dec!(0.01), fail_place: false }));
        let err = manager.cancel_order("missing").await.unwrap_err();
        assert!(matches!(err, OrderManagerError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_from_exchange_merges_fill() {
        let manager = OrderManager::new(Arc::new(StubExchange { min_qty: dec!(0.001), qty_step: dec!(0.01), fail_place: false }));
        let request = OrderRequest::market("BTCUSDT", Side::Buy, dec!(1), false);
        let order = manager.submit_order(request, "trend_following").await.unwrap();

        let fill = OrderResult {
            exchange_order_id: order.exchange_order_id.clone().unwrap(),
            client_order_id: order.client_order_id.clone(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            status: ExchangeOrderStatus::Filled,
            quantity: dec!(1),
            filled_quantity: dec!(1),
            average_fill_price: Some(dec!(100)),
            fee: dec!(0.01),
        };
        manager.update_from_exchange(&fill).await;

        let updated = manager.get(&order.client_order_id).await.unwrap();
        assert_eq!(updated.status, InFlightStatus::Done);
        assert_eq!(updated.filled_quantity, dec!(1));
    }
}
