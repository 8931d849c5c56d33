#![allow(dead_code)]
pub mod telegram;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

pub use telegram::TelegramSink;

use crate::journal::JournalWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Extends the teacher's alert set with the perp-specific kinds this system's user-visible
/// failure policy names (§7): drawdown halts, circuit-breaker trips, externally-observed
/// closes, unconfirmed TP/SL, reduce-only races, and exchange unavailability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AlertType {
    PositionOpened { symbol: String, side: String, quantity: String, entry_price: String },
    PositionClosed { symbol: String, pnl: String, pnl_pct: String, reason: String },
    StopLossTriggered { symbol: String, price: String, loss: String },
    TakeProfitTriggered { symbol: String, price: String, profit: String },
    TrailingStopActivated { symbol: String, peak_pnl: String, trigger_pnl: String },
    DrawdownHalted { current_drawdown: String, max_allowed: String },
    CircuitBreakerTripped { consecutive_losses: u32, cooldown_until: String },
    ExternalCloseDetected { symbol: String, size: String },
    TradingStopUnconfirmed { symbol: String },
    ReduceOnlyRaceRequiresIntervention { symbol: String },
    ExchangeUnavailable { detail: String },
    ConnectionLost { service: String },
    ConnectionRestored { service: String },
    BotStarted,
    BotStopped,
    Error { component: String, message: String },
}

impl AlertType {
    pub fn default_severity(&self) -> Severity {
        match self {
            AlertType::DrawdownHalted { .. }
            | AlertType::CircuitBreakerTripped { .. }
            | AlertType::ReduceOnlyRaceRequiresIntervention { .. }
            | AlertType::ConnectionLost { .. }
            | AlertType::Error { .. } => Severity::Critical,

            AlertType::StopLossTriggered { .. }
            | AlertType::ExternalCloseDetected { .. }
            | AlertType::TradingStopUnconfirmed { .. }
            | AlertType::ExchangeUnavailable { .. } => Severity::Warning,

            _ => Severity::Info,
        }
    }

    pub fn title(&self) -> String {
        match self {
            AlertType::PositionOpened { symbol, .. } => format!("Position opened: {symbol}"),
            AlertType::PositionClosed { symbol, .. } => format!("Position closed: {symbol}"),
            AlertType::StopLossTriggered { symbol, .. } => format!("Stop loss hit: {symbol}"),
            AlertType::TakeProfitTriggered { symbol, .. } => format!("Take profit hit: {symbol}"),
            AlertType::TrailingStopActivated { symbol, .. } => format!("Trailing stop: {symbol}"),
            AlertType::DrawdownHalted { .. } => "Drawdown halt triggered".to_string(),
            AlertType::CircuitBreakerTripped { .. } => "Circuit breaker tripped".to_string(),
            AlertType::ExternalCloseDetected { symbol, .. } => format!("External close detected: {symbol}"),
            AlertType::TradingStopUnconfirmed { symbol } => format!("TP/SL unconfirmed: {symbol}"),
            AlertType::ReduceOnlyRaceRequiresIntervention { symbol } => format!("Reduce-only race: {symbol} needs attention"),
            AlertType::ExchangeUnavailable { .. } => "Exchange unavailable".to_string(),
            AlertType::ConnectionLost { service } => format!("Connection lost: {service}"),
            AlertType::ConnectionRestored { service } => format!("Connection restored: {service}"),
            AlertType::BotStarted => "Bot started".to_string(),
            AlertType::BotStopped => "Bot stopped".to_string(),
            AlertType::Error { component, .. } => format!("Error in {component}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub alert_type: AlertType,
    pub acknowledged: bool,
}

impl Notification {
    pub fn new(alert_type: AlertType) -> Self {
        let severity = alert_type.default_severity();
        Self { id: uuid::Uuid::new_v4().to_string(), timestamp: Utc::now(), severity, alert_type, acknowledged: false }
    }
}

/// In-memory bounded ring of recent notifications, optionally mirrored to the journal's
/// `system_events` table and forwarded to Telegram when configured.
pub struct NotificationManager {
    notifications: RwLock<Vec<Notification>>,
    journal: Option<Arc<JournalWriter>>,
    telegram: Option<TelegramSink>,
    session_id: String,
    max_notifications: usize,
}

impl NotificationManager {
    pub fn new(journal: Option<Arc<JournalWriter>>, telegram: Option<TelegramSink>, session_id: impl Into<String>) -> Self {
        Self {
            notifications: RwLock::new(Vec::new()),
            journal,
            telegram,
            session_id: session_id.into(),
            max_notifications: 500,
        }
    }

    pub async fn notify(&self, alert_type: AlertType) {
        let notification = Notification::new(alert_type);
        let title = notification.alert_type.title();

        match notification.severity {
            Severity::Critical => error!(alert = ?notification.alert_type, "{title}"),
            Severity::Warning => warn!(alert = ?notification.alert_type, "{title}"),
            Severity::Info => info!(alert = ?notification.alert_type, "{title}"),
        }

        {
            let mut notifications = self.notifications.write().await;
            notifications.insert(0, notification.clone());
            if notifications.len() > self.max_notifications {
                notifications.truncate(self.max_notifications);
            }
        }

        if let Some(journal) = &self.journal {
            let severity_str = match notification.severity {
                Severity::Critical => "critical",
                Severity::Warning => "warning",
                Severity::Info => "info",
            };
            if let Err(e) = journal.log_system_event(&self.session_id, severity_str, &title).await {
                error!(error = %e, "failed to journal notification");
            }
        }

        if let Some(telegram) = &self.telegram {
            if matches!(notification.severity, Severity::Critical | Severity::Warning) {
                telegram.send(&format!("*{title}*\n{}", describe(&notification.alert_type))).await;
            }
        }
    }

    pub async fn get_recent(&self, limit: usize) -> Vec<Notification> {
        self.notifications.read().await.iter().take(limit).cloned().collect()
    }

    pub async fn get_critical_unacknowledged(&self) -> Vec<Notification> {
        self.notifications.read().await.iter().filter(|n| n.severity == Severity::Critical && !n.acknowledged).cloned().collect()
    }

    pub async fn acknowledge(&self, id: &str) {
        if let Some(notification) = self.notifications.write().await.iter_mut().find(|n| n.id == id) {
            notification.acknowledged = true;
        }
    }
}

fn describe(alert: &AlertType) -> String {
    format!("{alert:?}")
}

pub fn position_opened(symbol: impl Into<String>, side: impl Into<String>, quantity: Decimal, entry_price: Decimal) -> AlertType {
    AlertType::PositionOpened { symbol: symbol.into(), side: side.into(), quantity: quantity.to_string(), entry_price: entry_price.to_string() }
}

pub fn position_closed(symbol: impl Into<String>, pnl: Decimal, pnl_pct: Decimal, reason: impl Into<String>) -> AlertType {
    AlertType::PositionClosed { symbol: symbol.into(), pnl: pnl.to_string(), pnl_pct: pnl_pct.to_string(), reason: reason.into() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn severity_defaults_match_policy() {
        assert_eq!(AlertType::DrawdownHalted { current_drawdown: "20%".into(), max_allowed: "15%".into() }.default_severity(), Severity::Critical);
        assert_eq!(AlertType::StopLossTriggered { symbol: "BTCUSDT".into(), price: "100".into(), loss: "-5".into() }.default_severity(), Severity::Warning);
        assert_eq!(AlertType::BotStarted.default_severity(), Severity::Info);
    }

    #[tokio::test]
    async fn notify_stores_in_ring_and_is_retrievable() {
        let manager = NotificationManager::new(None, None, "20260801_000000");
        manager.notify(AlertType::BotStarted).await;
        manager.notify(position_opened("ETHUSDT", "Buy", dec!(10), dec!(3000))).await;

        let recent = manager.get_recent(10).await;
        assert_eq!(recent.len(), 2);
    }

    #[tokio::test]
    async fn critical_unacknowledged_filters_correctly() {
        let manager = NotificationManager::new(None, None, "20260801_000000");
        manager.notify(AlertType::Error { component: "order_manager".into(), message: "boom".into() }).await;
        manager.notify(AlertType::BotStarted).await;

        let critical = manager.get_critical_unacknowledged().await;
        assert_eq!(critical.len(), 1);

        manager.acknowledge(&critical[0].id).await;
        assert!(manager.get_critical_unacknowledged().await.is_empty());
    }
}
