// Real-time price ingestion
pub mod collector;
pub mod price_table;

pub use collector::{FeedError, TickerCollector};
pub use price_table::PriceTable;
