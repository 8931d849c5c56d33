pub mod breakout;
pub mod ema_crossover;
pub mod funding_arb;
pub mod grid;
pub mod mean_reversion;
pub mod momentum;
pub mod selector;
pub mod trend;

pub use selector::*;

use crate::candles::CandleBuffer;
use crate::types::{FundingRateSample, Signal};

/// Common interface every strategy implements. Mirrors the teacher's per-pair strategy
/// objects, generalized to an async candle-buffer read instead of an in-process slice.
#[async_trait::async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;
    fn min_candles_required(&self) -> usize;

    /// Produces a signal from the symbol's closed candle history. Returns `None` when
    /// there isn't enough history yet or nothing actionable is found.
    async fn generate_signal(
        &self,
        symbol: &str,
        candles: &CandleBuffer,
        funding: Option<&[FundingRateSample]>,
    ) -> Option<Signal>;
}
