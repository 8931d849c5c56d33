#![allow(dead_code)]
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::types::{
    Candle, ExchangeOrderStatus, FundingRateSample, InstrumentInfo, OrderResult, Position, PositionIdx,
    PositionSide, Ticker, TimeFrame,
};

use super::error::ExchangeError;
use super::Exchange;

const BYBIT_MAINNET: &str = "https://api.bybit.com";
const BYBIT_TESTNET: &str = "https://api-testnet.bybit.com";
const CATEGORY: &str = "linear";

type HmacSha256 = Hmac<Sha256>;

/// Bybit v5 unified-account REST client for USDT-margined perpetuals. Request signing
/// follows Bybit's scheme: `sign(timestamp + api_key + recv_window + query_or_body)`.
#[derive(Debug, Clone)]
pub struct BybitClient {
    client: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    recv_window_ms: u64,
}

impl BybitClient {
    pub fn new(api_key: String, api_secret: String, use_testnet: bool, recv_window_ms: u64) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_secret,
            base_url: if use_testnet { BYBIT_TESTNET } else { BYBIT_MAINNET }.to_string(),
            recv_window_ms,
        }
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn auth_headers(&self, timestamp: u64, signature: &str) -> Vec<(&'static str, String)> {
        vec![
            ("X-BAPI-API-KEY", self.api_key.clone()),
            ("X-BAPI-TIMESTAMP", timestamp.to_string()),
            ("X-BAPI-RECV-WINDOW", self.recv_window_ms.to_string()),
            ("X-BAPI-SIGN", signature.to_string()),
        ]
    }

    async fn get_public(&self, path: &str, query: &str) -> Result<serde_json::Value, ExchangeError> {
        let url = format!("{}{}?{}", self.base_url, path, query);
        let resp = self.client.get(&url).send().await?;
        self.parse_envelope(resp).await
    }

    async fn get_signed(&self, path: &str, query: &str) -> Result<serde_json::Value, ExchangeError> {
        let timestamp = Self::timestamp_ms();
        let payload = format!("{}{}{}{}", timestamp, self.api_key, self.recv_window_ms, query);
        let signature = self.sign(&payload);
        let url = format!("{}{}?{}", self.base_url, path, query);

        let mut req = self.client.get(&url);
        for (k, v) in self.auth_headers(timestamp, &signature) {
            req = req.header(k, v);
        }
        let resp = req.send().await?;
        self.parse_envelope(resp).await
    }

    async fn post_signed(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value, ExchangeError> {
        let timestamp = Self::timestamp_ms();
        let body_str = body.to_string();
        let payload = format!("{}{}{}{}", timestamp, self.api_key, self.recv_window_ms, body_str);
        let signature = self.sign(&payload);
        let url = format!("{}{}", self.base_url, path);

        let mut req = self.client.post(&url).header("Content-Type", "application/json").body(body_str);
        for (k, v) in self.auth_headers(timestamp, &signature) {
            req = req.header(k, v);
        }
        let resp = req.send().await?;
        self.parse_envelope(resp).await
    }

    async fn parse_envelope(&self, resp: reqwest::Response) -> Result<serde_json::Value, ExchangeError> {
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ExchangeError::RateLimit(status.to_string()));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ExchangeError::ExchangeUnavailable(format!("http {status}: {text}")));
        }

        let envelope: BybitEnvelope = resp.json().await.map_err(ExchangeError::from)?;
        if envelope.ret_code != 0 {
            return Err(Self::classify(envelope.ret_code, &envelope.ret_msg));
        }
        Ok(envelope.result)
    }

    fn classify(ret_code: i64, msg: &str) -> ExchangeError {
        match ret_code {
            10003 | 10004 | 10005 => ExchangeError::Authentication(msg.to_string()),
            10006 | 10018 => ExchangeError::RateLimit(msg.to_string()),
            110007 | 110012 => ExchangeError::InsufficientFunds(msg.to_string()),
            110001 | 110017 | 110043 => ExchangeError::OrderNotFound(msg.to_string()),
            110003 | 110004 | 110025 | 110045 => ExchangeError::InvalidOrder(msg.to_string()),
            _ => ExchangeError::Unknown(format!("ret_code {ret_code}: {msg}")),
        }
    }
}

#[async_trait]
impl Exchange for BybitClient {
    async fn fetch_ohlcv(&self, symbol: &str, timeframe: TimeFrame, limit: u32) -> Result<Vec<Candle>, ExchangeError> {
        let query = format!("category={CATEGORY}&symbol={symbol}&interval={}&limit={limit}", timeframe.as_str());
        let result = self.get_public("/v5/market/kline", &query).await?;
        let parsed: KlineResult = serde_json::from_value(result).map_err(|e| ExchangeError::Unknown(e.to_string()))?;

        parsed
            .list
            .into_iter()
            .map(|row| parse_kline_row(symbol, timeframe, &row))
            .collect()
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let query = format!("category={CATEGORY}&symbol={symbol}");
        let result = self.get_public("/v5/market/tickers", &query).await?;
        let parsed: TickersResult = serde_json::from_value(result).map_err(|e| ExchangeError::Unknown(e.to_string()))?;
        let row = parsed.list.into_iter().next().ok_or_else(|| ExchangeError::Unknown("empty ticker list".into()))?;

        Ok(Ticker {
            symbol: symbol.to_string(),
            price: decimal(&row.last_price)?,
            bid: decimal(&row.bid1_price)?,
            ask: decimal(&row.ask1_price)?,
            volume_24h: decimal(&row.volume_24h)?,
            timestamp: Utc::now(),
        })
    }

    async fn fetch_funding_rate(&self, symbol: &str) -> Result<FundingRateSample, ExchangeError> {
        let query = format!("category={CATEGORY}&symbol={symbol}&limit=1");
        let result = self.get_public("/v5/market/funding/history", &query).await?;
        let parsed: FundingHistoryResult = serde_json::from_value(result).map_err(|e| ExchangeError::Unknown(e.to_string()))?;
        let row = parsed.list.into_iter().next().ok_or_else(|| ExchangeError::Unknown("empty funding history".into()))?;

        Ok(FundingRateSample {
            rate: decimal(&row.funding_rate)?,
            timestamp: Utc
                .timestamp_millis_opt(row.funding_rate_timestamp.parse().unwrap_or(0))
                .single()
                .unwrap_or_else(Utc::now),
        })
    }

    async fn fetch_positions(&self, symbols: Option<&[String]>) -> Result<Vec<Position>, ExchangeError> {
        let query = match symbols {
            Some([only]) => format!("category={CATEGORY}&symbol={only}"),
            _ => format!("category={CATEGORY}&settleCoin=USDT"),
        };
        let result = self.get_signed("/v5/position/list", &query).await?;
        let parsed: PositionListResult = serde_json::from_value(result).map_err(|e| ExchangeError::Unknown(e.to_string()))?;

        let wanted: Option<std::collections::HashSet<&str>> =
            symbols.filter(|s| s.len() > 1).map(|s| s.iter().map(String::as_str).collect());

        parsed
            .list
            .into_iter()
            .filter(|row| wanted.as_ref().map(|w| w.contains(row.symbol.as_str())).unwrap_or(true))
            .filter(|row| decimal(&row.size).map(|s| s > Decimal::ZERO).unwrap_or(false))
            .map(parse_position_row)
            .collect()
    }

    async fn fetch_balance(&self, asset: &str) -> Result<Decimal, ExchangeError> {
        let query = format!("accountType=UNIFIED&coin={asset}");
        let result = self.get_signed("/v5/account/wallet-balance", &query).await?;
        let parsed: WalletBalanceResult = serde_json::from_value(result).map_err(|e| ExchangeError::Unknown(e.to_string()))?;

        let coin = parsed
            .list
            .into_iter()
            .next()
            .and_then(|acct| acct.coin.into_iter().find(|c| c.coin == asset));
        match coin {
            Some(c) => decimal(&c.wallet_balance),
            None => Ok(Decimal::ZERO),
        }
    }

    async fn fetch_instrument_info(&self, symbol: &str) -> Result<InstrumentInfo, ExchangeError> {
        let query = format!("category={CATEGORY}&symbol={symbol}");
        let result = self.get_public("/v5/market/instruments-info", &query).await?;
        let parsed: InstrumentsInfoResult = serde_json::from_value(result).map_err(|e| ExchangeError::Unknown(e.to_string()))?;
        let row = parsed.list.into_iter().next().ok_or_else(|| ExchangeError::Unknown("unknown symbol".into()))?;

        Ok(InstrumentInfo {
            min_qty: decimal(&row.lot_size_filter.min_order_qty)?,
            max_qty: decimal(&row.lot_size_filter.max_order_qty)?,
            qty_step: decimal(&row.lot_size_filter.qty_step)?,
            tick_size: decimal(&row.price_filter.tick_size)?,
            max_leverage: decimal(&row.leverage_filter.max_leverage)?,
        })
    }

    async fn place_order(&self, request: &crate::types::OrderRequest) -> Result<OrderResult, ExchangeError> {
        let mut body = json!({
            "category": CATEGORY,
            "symbol": request.symbol,
            "side": request.side.as_str(),
            "orderType": request.order_type.as_str(),
            "qty": request.quantity.to_string(),
            "orderLinkId": request.client_order_id,
            "reduceOnly": request.reduce_only,
            "positionIdx": request.position_idx,
        });
        if let Some(price) = request.price {
            body["price"] = json!(price.to_string());
        }
        if let Some(sl) = request.stop_loss {
            body["stopLoss"] = json!(sl.to_string());
        }
        if let Some(tp) = request.take_profit {
            body["takeProfit"] = json!(tp.to_string());
        }

        debug!(symbol = %request.symbol, qty = %request.quantity, "submitting order to bybit");
        let result = self.post_signed("/v5/order/create", &body).await?;
        let parsed: OrderCreateResult = serde_json::from_value(result).map_err(|e| ExchangeError::Unknown(e.to_string()))?;

        Ok(OrderResult {
            exchange_order_id: parsed.order_id,
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

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<(), ExchangeError> {
        let body = json!({"category": CATEGORY, "symbol": symbol, "orderId": order_id});
        match self.post_signed("/v5/order/cancel", &body).await {
            Ok(_) => Ok(()),
            Err(ExchangeError::OrderNotFound(_)) => {
                warn!(%order_id, "cancel target already gone, treating as success");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ExchangeError> {
        let body = json!({"category": CATEGORY, "symbol": symbol});
        self.post_signed("/v5/order/cancel-all", &body).await?;
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, leverage: Decimal) -> Result<(), ExchangeError> {
        let body = json!({
            "category": CATEGORY,
            "symbol": symbol,
            "buyLeverage": leverage.to_string(),
            "sellLeverage": leverage.to_string(),
        });
        self.post_signed("/v5/position/set-leverage", &body).await?;
        Ok(())
    }

    async fn set_position_trading_stop(
        &self,
        symbol: &str,
        position_idx: PositionIdx,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<(), ExchangeError> {
        let mut body = json!({"category": CATEGORY, "symbol": symbol, "positionIdx": position_idx});
        if let Some(sl) = stop_loss {
            body["stopLoss"] = json!(sl.to_string());
        }
        if let Some(tp) = take_profit {
            body["takeProfit"] = json!(tp.to_string());
        }
        self.post_signed("/v5/position/trading-stop", &body).await?;
        Ok(())
    }

    async fn server_time(&self) -> Result<i64, ExchangeError> {
        let result = self.get_public("/v5/market/time", "").await?;
        let parsed: ServerTimeResult = serde_json::from_value(result).map_err(|e| ExchangeError::Unknown(e.to_string()))?;
        parsed.time_second.parse().map_err(|_| ExchangeError::Unknown("bad server time".into()))
    }
}

fn decimal(s: &str) -> Result<Decimal, ExchangeError> {
    if s.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(s).map_err(|e| ExchangeError::Unknown(format!("bad decimal '{s}': {e}")))
}

fn parse_kline_row(symbol: &str, timeframe: TimeFrame, row: &[String]) -> Result<Candle, ExchangeError> {
    let open_time_ms: i64 = row.first().and_then(|v| v.parse().ok()).unwrap_or(0);
    Ok(Candle {
        symbol: symbol.to_string(),
        timeframe,
        open_time: Utc.timestamp_millis_opt(open_time_ms).single().unwrap_or_else(Utc::now),
        close_time: Utc
            .timestamp_millis_opt(open_time_ms + timeframe.to_milliseconds())
            .single()
            .unwrap_or_else(Utc::now),
        open: decimal(row.get(1).map(String::as_str).unwrap_or("0"))?,
        high: decimal(row.get(2).map(String::as_str).unwrap_or("0"))?,
        low: decimal(row.get(3).map(String::as_str).unwrap_or("0"))?,
        close: decimal(row.get(4).map(String::as_str).unwrap_or("0"))?,
        volume: decimal(row.get(5).map(String::as_str).unwrap_or("0"))?,
        is_closed: true,
    })
}

fn parse_position_row(row: PositionRow) -> Result<Position, ExchangeError> {
    Ok(Position {
        symbol: row.symbol,
        side: match row.side.as_str() {
            "Buy" => PositionSide::Long,
            "Sell" => PositionSide::Short,
            _ => PositionSide::None,
        },
        size: decimal(&row.size)?,
        entry_price: decimal(&row.avg_price)?,
        mark_price: decimal(&row.mark_price)?,
        liquidation_price: if row.liq_price.is_empty() { None } else { decimal(&row.liq_price).ok() },
        leverage: decimal(&row.leverage)?,
        unrealized_pnl: decimal(&row.unrealised_pnl)?,
        realized_pnl: decimal(&row.cum_realised_pnl)?,
        stop_loss: if row.stop_loss.is_empty() || row.stop_loss == "0" { None } else { decimal(&row.stop_loss).ok() },
        take_profit: if row.take_profit.is_empty() || row.take_profit == "0" { None } else { decimal(&row.take_profit).ok() },
        position_idx: row.position_idx,
        first_seen_at: Utc::now(),
    })
}

#[derive(Debug, Deserialize)]
struct BybitEnvelope {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg")]
    ret_msg: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct KlineResult {
    list: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TickersResult {
    list: Vec<TickerRow>,
}

#[derive(Debug, Deserialize)]
struct TickerRow {
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "bid1Price")]
    bid1_price: String,
    #[serde(rename = "ask1Price")]
    ask1_price: String,
    #[serde(rename = "volume24h")]
    volume_24h: String,
}

#[derive(Debug, Deserialize)]
struct FundingHistoryResult {
    list: Vec<FundingRow>,
}

#[derive(Debug, Deserialize)]
struct FundingRow {
    #[serde(rename = "fundingRate")]
    funding_rate: String,
    #[serde(rename = "fundingRateTimestamp")]
    funding_rate_timestamp: String,
}

#[derive(Debug, Deserialize)]
struct PositionListResult {
    list: Vec<PositionRow>,
}

#[derive(Debug, Deserialize)]
struct PositionRow {
    symbol: String,
    side: String,
    size: String,
    #[serde(rename = "avgPrice")]
    avg_price: String,
    #[serde(rename = "markPrice")]
    mark_price: String,
    #[serde(rename = "liqPrice")]
    liq_price: String,
    leverage: String,
    #[serde(rename = "unrealisedPnl")]
    unrealised_pnl: String,
    #[serde(rename = "cumRealisedPnl")]
    cum_realised_pnl: String,
    #[serde(rename = "stopLoss")]
    stop_loss: String,
    #[serde(rename = "takeProfit")]
    take_profit: String,
    #[serde(rename = "positionIdx")]
    position_idx: PositionIdx,
}

#[derive(Debug, Deserialize)]
struct WalletBalanceResult {
    list: Vec<WalletAccount>,
}

#[derive(Debug, Deserialize)]
struct WalletAccount {
    coin: Vec<CoinBalance>,
}

#[derive(Debug, Deserialize)]
struct CoinBalance {
    coin: String,
    #[serde(rename = "walletBalance")]
    wallet_balance: String,
}

#[derive(Debug, Deserialize)]
struct InstrumentsInfoResult {
    list: Vec<InstrumentRow>,
}

#[derive(Debug, Deserialize)]
struct InstrumentRow {
    #[serde(rename = "lotSizeFilter")]
    lot_size_filter: LotSizeFilter,
    #[serde(rename = "priceFilter")]
    price_filter: PriceFilter,
    #[serde(rename = "leverageFilter")]
    leverage_filter: LeverageFilter,
}

#[derive(Debug, Deserialize)]
struct LotSizeFilter {
    #[serde(rename = "minOrderQty")]
    min_order_qty: String,
    #[serde(rename = "maxOrderQty")]
    max_order_qty: String,
    #[serde(rename = "qtyStep")]
    qty_step: String,
}

#[derive(Debug, Deserialize)]
struct PriceFilter {
    #[serde(rename = "tickSize")]
    tick_size: String,
}

#[derive(Debug, Deserialize)]
struct LeverageFilter {
    #[serde(rename = "maxLeverage")]
    max_leverage: String,
}

#[derive(Debug, Deserialize)]
struct OrderCreateResult {
    #[serde(rename = "orderId")]
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct ServerTimeResult {
    #[serde(rename = "timeSecond")]
    time_second: String,
}
