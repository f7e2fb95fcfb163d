// Per-market candle cache
pub mod cache;

pub use cache::{CachedBars, CandleCache};
