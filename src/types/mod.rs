pub mod candle;
pub mod instrument;
pub mod order;
pub mod position;
pub mod signal;
pub mod trading;

pub use candle::*;
pub use instrument::*;
pub use order::*;
pub use position::*;
pub use signal::*;
pub use trading::*;
