use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

#[derive(Debug)]
struct State {
    consecutive_losses: u32,
    tripped_at: Option<DateTime<Utc>>,
    force_reason: Option<String>,
}

/// Counts consecutive losing trades; trips once the configured threshold is reached and
/// auto-resets after its cooldown window elapses.
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: chrono::Duration,
    state: RwLock<State>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown_hours: u32) -> Self {
        Self {
            threshold,
            cooldown: chrono::Duration::hours(cooldown_hours as i64),
            state: RwLock::new(State {
                consecutive_losses: 0,
                tripped_at: None,
                force_reason: None,
            }),
        }
    }

    /// A losing trade increments the counter (and trips the breaker once it reaches the
    /// threshold); a winning trade resets it to zero.
    pub async fn record_trade(&self, was_win: bool) {
        let mut state = self.state.write().await;
        if was_win {
            state.consecutive_losses = 0;
            return;
        }

        state.consecutive_losses += 1;
        if state.consecutive_losses >= self.threshold {
            state.tripped_at = Some(Utc::now());
        }
    }

    pub async fn is_tripped(&self) -> bool {
        let mut state = self.state.write().await;
        if state.force_reason.is_some() {
            return true;
        }
        match state.tripped_at {
            Some(at) if Utc::now() - at >= self.cooldown => {
                state.tripped_at = None;
                state.consecutive_losses = 0;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Operational override: trips the breaker regardless of the loss streak.
    pub async fn force_trip(&self, reason: impl Into<String>) {
        let mut state = self.state.write().await;
        state.force_reason = Some(reason.into());
        state.tripped_at = Some(Utc::now());
    }

    pub async fn clear_force_trip(&self) {
        self.state.write().await.force_reason = None;
    }

    pub async fn consecutive_losses(&self) -> u32 {
        self.state.read().await.consecutive_losses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trips_after_threshold_consecutive_losses() {
        let breaker = CircuitBreaker::new(3, 4);
        breaker.record_trade(false).await;
        breaker.record_trade(false).await;
        assert!(!breaker.is_tripped().await);
        breaker.record_trade(false).await;
        assert!(breaker.is_tripped().await);
    }

    #[tokio::test]
    async fn win_resets_streak() {
        let breaker = CircuitBreaker::new(3, 4);
        breaker.record_trade(false).await;
        breaker.record_trade(false).await;
        breaker.record_trade(true).await;
        assert_eq!(breaker.consecutive_losses().await, 0);
        assert!(!breaker.is_tripped().await);
    }

    #[tokio::test]
    async fn force_trip_overrides_loss_count() {
        let breaker = CircuitBreaker::new(3, 4);
        breaker.force_trip("manual halt").await;
        assert!(breaker.is_tripped().await);
        breaker.clear_force_trip().await;
        // still within cooldown window after clearing the forced reason
        assert!(breaker.is_tripped().await);
    }
}
