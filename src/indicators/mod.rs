// Technical indicators
// Free functions over candle/price slices; degenerate inputs fall back to
// neutral values instead of propagating NaN.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod macd;
pub mod mfi;
pub mod moving_average;
pub mod rsi;
pub mod volume;
pub mod vwap;

pub use adx::calculate_adx;
pub use atr::calculate_atr;
pub use bollinger::bollinger_signal;
pub use macd::macd_signal;
pub use mfi::calculate_mfi;
pub use moving_average::{calculate_sma, ewma_last, ewma_series};
pub use rsi::calculate_rsi;
pub use volume::volume_signal;
pub use vwap::vwap_signal;
