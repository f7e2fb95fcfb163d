// Execution boundary to the exchange's trade API
pub mod paper;

pub use paper::PaperExchange;

use crate::models::{AccountBalance, OrderReceipt};
use async_trait::async_trait;

/// Order placement and account queries.
///
/// The live order-signing client lives outside this crate and plugs in
/// here. A `None` receipt means the order was rejected; callers must leave
/// the ledger untouched in that case.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Available plus locked quantity of one currency ("KRW", "BTC", ...)
    async fn get_balance(&self, currency: &str) -> anyhow::Result<f64>;

    /// Every non-zero account line, with reported average buy prices
    async fn get_all_balances(&self) -> anyhow::Result<Vec<AccountBalance>>;

    /// Market buy spending `quote_amount` of the quote currency
    async fn buy_market(
        &self,
        market: &str,
        quote_amount: f64,
    ) -> anyhow::Result<Option<OrderReceipt>>;

    /// Market sell of `quantity` base units
    async fn sell_market(
        &self,
        market: &str,
        quantity: f64,
    ) -> anyhow::Result<Option<OrderReceipt>>;
}

/// Base currency of a market code ("KRW-BTC" -> "BTC")
pub fn base_currency(market: &str) -> &str {
    market.split_once('-').map(|(_, base)| base).unwrap_or(market)
}

/// Quote currency of a market code ("KRW-BTC" -> "KRW")
pub fn quote_currency(market: &str) -> &str {
    market.split_once('-').map(|(quote, _)| quote).unwrap_or(market)
}
