// Exchange REST clients
pub mod upbit;

pub use upbit::{CandleInterval, QuotationClient};
