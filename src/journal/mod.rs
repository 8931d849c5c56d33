use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use crate::types::{Direction, InFlightStatus, Side};

/// Append-only `sqlx`/sqlite store backing the six journal tables (§4.10). Every row
/// carries `session_id`; no `UPDATE`/`DELETE` statement exists on any of them — a
/// mistaken write is corrected by inserting a new row, never by editing history.
pub struct JournalWriter {
    pool: SqlitePool,
}

impl JournalWriter {
    pub async fn new(db_path: &str) -> Result<Self> {
        info!(path = %db_path, "initializing journal database");

        let options = SqliteConnectOptions::from_str(db_path)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;

        let writer = Self { pool };
        writer.create_schema().await?;
        Ok(writer)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                symbol TEXT NOT NULL,
                direction TEXT NOT NULL,
                confidence TEXT NOT NULL,
                strategy_name TEXT NOT NULL,
                entry_price TEXT,
                stop_loss TEXT,
                take_profit TEXT,
                approved INTEGER NOT NULL,
                reason TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                client_order_id TEXT NOT NULL,
                exchange_order_id TEXT,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity TEXT NOT NULL,
                status TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                exit_price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                realized_pnl TEXT NOT NULL,
                strategy_name TEXT NOT NULL,
                exit_reason TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS risk_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                symbol TEXT NOT NULL,
                reason TEXT NOT NULL,
                detail TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS equity_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                equity TEXT NOT NULL,
                unrealized_pnl TEXT NOT NULL,
                drawdown_pct TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS system_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_signals_symbol ON signals(symbol)").execute(&self.pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(symbol)").execute(&self.pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_equity_timestamp ON equity_snapshots(timestamp)").execute(&self.pool).await?;

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn log_signal(
        &self,
        session_id: &str,
        symbol: &str,
        direction: Direction,
        confidence: f64,
        strategy_name: &str,
        entry_price: Option<Decimal>,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        approved: bool,
        reason: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signals (
                session_id, timestamp, symbol, direction, confidence, strategy_name,
                entry_price, stop_loss, take_profit, approved, reason
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(Utc::now().to_rfc3339())
        .bind(symbol)
        .bind(direction.as_str())
        .bind(confidence.to_string())
        .bind(strategy_name)
        .bind(entry_price.map(|p| p.to_string()))
        .bind(stop_loss.map(|p| p.to_string()))
        .bind(take_profit.map(|p| p.to_string()))
        .bind(approved as i32)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn log_order(
        &self,
        session_id: &str,
        client_order_id: &str,
        exchange_order_id: Option<&str>,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        status: InFlightStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (session_id, timestamp, client_order_id, exchange_order_id, symbol, side, quantity, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(Utc::now().to_rfc3339())
        .bind(client_order_id)
        .bind(exchange_order_id)
        .bind(symbol)
        .bind(side.as_str())
        .bind(quantity.to_string())
        .bind(format!("{status:?}"))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn log_trade(
        &self,
        session_id: &str,
        symbol: &str,
        side: Side,
        entry_price: Decimal,
        exit_price: Decimal,
        quantity: Decimal,
        realized_pnl: Decimal,
        strategy_name: &str,
        exit_reason: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades (
                session_id, timestamp, symbol, side, entry_price, exit_price,
                quantity, realized_pnl, strategy_name, exit_reason
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(Utc::now().to_rfc3339())
        .bind(symbol)
        .bind(side.as_str())
        .bind(entry_price.to_string())
        .bind(exit_price.to_string())
        .bind(quantity.to_string())
        .bind(realized_pnl.to_string())
        .bind(strategy_name)
        .bind(exit_reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn log_risk_event(&self, session_id: &str, symbol: &str, reason: &str, detail: Option<&str>) -> Result<()> {
        sqlx::query("INSERT INTO risk_events (session_id, timestamp, symbol, reason, detail) VALUES (?, ?, ?, ?, ?)")
            .bind(session_id)
            .bind(Utc::now().to_rfc3339())
            .bind(symbol)
            .bind(reason)
            .bind(detail)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn log_equity_snapshot(&self, session_id: &str, equity: Decimal, unrealized_pnl: Decimal, drawdown_pct: Decimal) -> Result<()> {
        sqlx::query("INSERT INTO equity_snapshots (session_id, timestamp, equity, unrealized_pnl, drawdown_pct) VALUES (?, ?, ?, ?, ?)")
            .bind(session_id)
            .bind(Utc::now().to_rfc3339())
            .bind(equity.to_string())
            .bind(unrealized_pnl.to_string())
            .bind(drawdown_pct.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn log_system_event(&self, session_id: &str, severity: &str, message: &str) -> Result<()> {
        sqlx::query("INSERT INTO system_events (session_id, timestamp, severity, message) VALUES (?, ?, ?, ?)")
            .bind(session_id)
            .bind(Utc::now().to_rfc3339())
            .bind(severity)
            .bind(message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn last_equity_snapshot(&self) -> Result<Option<(DateTime<Utc>, Decimal)>> {
        let row: Option<(String, String)> = sqlx::query_as("SELECT timestamp, equity FROM equity_snapshots ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some((ts, equity)) => Some((DateTime::parse_from_rfc3339(&ts)?.with_timezone(&Utc), Decimal::from_str(&equity)?)),
            None => None,
        })
    }
}

/// Generates the start-timestamp session identifier carried on every journal row.
pub fn new_session_id(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn memory_journal() -> JournalWriter {
        JournalWriter::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn logs_a_signal_row_without_error() {
        let journal = memory_journal().await;
        journal
            .log_signal("20260801_000000", "BTCUSDT", Direction::Long, 0.8, "trend_following", Some(dec!(100)), Some(dec!(98)), Some(dec!(105)), true, "approved")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn logs_a_trade_and_equity_snapshot() {
        let journal = memory_journal().await;
        journal
            .log_trade("20260801_000000", "BTCUSDT", Side::Buy, dec!(100), dec!(105), dec!(1), dec!(5), "trend_following", "take_profit")
            .await
            .unwrap();
        journal.log_equity_snapshot("20260801_000000", dec!(10005), dec!(0), dec!(0)).await.unwrap();

        let last = journal.last_equity_snapshot().await.unwrap().unwrap();
        assert_eq!(last.1, dec!(10005));
    }

    #[test]
    fn session_id_matches_timestamp_format() {
        let now = DateTime::parse_from_rfc3339("2026-08-01T12:34:56Z").unwrap().with_timezone(&Utc);
        assert_eq!(new_session_id(now), "20260801_123456");
    }
}
