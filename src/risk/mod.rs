pub mod circuit_breaker;
pub mod drawdown;
pub mod exposure;
pub mod manager;
pub mod sizing;

pub use circuit_breaker::CircuitBreaker;
pub use drawdown::{DrawdownMonitor, HaltReason};
pub use exposure::ExposureManager;
pub use manager::{RiskContext, RiskManager};
pub use sizing::PositionSizer;
