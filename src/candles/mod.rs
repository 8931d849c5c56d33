//! Bounded per-symbol ring of closed candles; single-writer, many-readers.
//!
//! The buffer is the only authority on "latest closed candles" — derived data (feature
//! frames) is always rebuilt from a snapshot, never cached alongside it.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::types::Candle;

#[derive(Debug)]
pub struct CandleBuffer {
    max_candles: usize,
    buffers: RwLock<HashMap<String, Vec<Candle>>>,
}

impl CandleBuffer {
    pub fn new(max_candles: usize) -> Self {
        Self {
            max_candles,
            buffers: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces a symbol's buffer with the last `max_candles` of `candles`, sorted by
    /// `open_time`. Used for the orchestrator's initial backfill.
    pub async fn initialize(&self, symbol: &str, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.open_time);
        let start = candles.len().saturating_sub(self.max_candles);
        let trimmed = candles.split_off(start);
        self.buffers.write().await.insert(symbol.to_string(), trimmed);
    }

    /// If the last entry shares `open_time` with `candle`, replaces it in place; otherwise
    /// appends, evicting the oldest entry once the buffer is full.
    pub async fn update(&self, symbol: &str, candle: Candle) {
        let mut buffers = self.buffers.write().await;
        let buffer = buffers.entry(symbol.to_string()).or_insert_with(Vec::new);

        match buffer.last() {
            Some(last) if last.open_time == candle.open_time => {
                let idx = buffer.len() - 1;
                buffer[idx] = candle;
            }
            _ => {
                buffer.push(candle);
                if buffer.len() > self.max_candles {
                    buffer.remove(0);
                }
            }
        }
    }

    /// Returns an immutable snapshot copy; concurrent readers never observe a torn update.
    pub async fn get(&self, symbol: &str) -> Vec<Candle> {
        self.buffers
            .read()
            .await
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn has_enough(&self, symbol: &str, n: usize) -> bool {
        self.buffers
            .read()
            .await
            .get(symbol)
            .map(|b| b.len() >= n)
            .unwrap_or(false)
    }

    pub async fn clear(&self, symbol: &str) {
        if let Some(buffer) = self.buffers.write().await.get_mut(symbol) {
            buffer.clear();
        }
    }

    pub async fn symbols(&self) -> Vec<String> {
        self.buffers.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn candle(open_time_offset_secs: i64, close: rust_decimal::Decimal) -> Candle {
        let open_time = Utc::now() + Duration::seconds(open_time_offset_secs);
        Candle {
            symbol: "BTCUSDT".to_string(),
            timeframe: crate::types::TimeFrame::M15,
            open_time,
            close_time: open_time + Duration::minutes(15),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
            is_closed: true,
        }
    }

    #[tokio::test]
    async fn update_appends_new_open_time_and_replaces_same_open_time() {
        let buffer = CandleBuffer::new(500);
        let c1 = candle(0, dec!(100));
        buffer.update("BTCUSDT", c1.clone()).await;
        assert_eq!(buffer.get("BTCUSDT").await.len(), 1);

        // re-emission with the same open_time replaces the last entry
        let mut c1_revised = c1.clone();
        c1_revised.close = dec!(101);
        buffer.update("BTCUSDT", c1_revised).await;
        let snapshot = buffer.get("BTCUSDT").await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].close, dec!(101));

        let c2 = candle(900, dec!(102));
        buffer.update("BTCUSDT", c2).await;
        assert_eq!(buffer.get("BTCUSDT").await.len(), 2);
    }

    #[tokio::test]
    async fn evicts_oldest_when_full() {
        let buffer = CandleBuffer::new(3);
        for i in 0..5 {
            buffer.update("BTCUSDT", candle(i * 900, dec!(100))).await;
        }
        let snapshot = buffer.get("BTCUSDT").await;
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].open_time, candle(2 * 900, dec!(100)).open_time);
    }

    #[tokio::test]
    async fn has_enough_respects_threshold() {
        let buffer = CandleBuffer::new(500);
        assert!(!buffer.has_enough("BTCUSDT", 1).await);
        buffer.update("BTCUSDT", candle(0, dec!(100))).await;
        assert!(buffer.has_enough("BTCUSDT", 1).await);
        assert!(!buffer.has_enough("BTCUSDT", 2).await);
    }
}
