use thiserror::Error;

/// Closed transport-level error taxonomy every `Exchange` implementation maps its failures
/// into. `retryable()` drives the Order Manager's backoff policy (§7): rate-limit, network,
/// and exchange-unavailable errors are retried; everything else surfaces immediately.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("rate limited: {0}")]
    RateLimit(String),
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    #[error("order not found: {0}")]
    OrderNotFound(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("exchange unavailable: {0}")]
    ExchangeUnavailable(String),
    #[error("unknown exchange error: {0}")]
    Unknown(String),
}

impl ExchangeError {
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::RateLimit(_) | ExchangeError::Network(_) | ExchangeError::ExchangeUnavailable(_)
        )
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ExchangeError::Network(err.to_string())
        } else {
            ExchangeError::Unknown(err.to_string())
        }
    }
}
