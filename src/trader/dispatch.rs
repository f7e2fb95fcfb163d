use crate::db::TradeStore;
use crate::execution::{base_currency, ExecutionClient};
use std::sync::Arc;

/// Pairs order dispatch with the matching ledger write.
///
/// A rejected or failed order never touches the ledger; a filled order
/// whose ledger write fails is logged and left for the next reconciliation
/// pass to repair.
pub struct OrderRouter {
    client: Arc<dyn ExecutionClient>,
    store: Arc<TradeStore>,
}

impl OrderRouter {
    pub fn new(client: Arc<dyn ExecutionClient>, store: Arc<TradeStore>) -> Self {
        Self { client, store }
    }

    /// Market-buy `budget` worth of `market`; record the open trade on fill
    pub async fn try_buy(
        &self,
        market: &str,
        price: f64,
        budget: f64,
        strategy_name: &str,
    ) -> bool {
        tracing::info!(market, budget, "buy order dispatching");

        match self.client.buy_market(market, budget).await {
            Ok(Some(receipt)) => {
                tracing::info!(market, order_id = %receipt.order_id, "buy filled");
                if let Err(e) = self.store.log_buy(market, price, budget, strategy_name).await {
                    tracing::warn!(market, error = %e, "buy fill not recorded");
                }
                true
            }
            Ok(None) => {
                tracing::warn!(market, "buy order rejected");
                false
            }
            Err(e) => {
                tracing::error!(market, error = %e, "buy order failed");
                false
            }
        }
    }

    /// Sell the full held quantity of `market` and close the ledger row.
    ///
    /// A zero external balance means the holding is already gone (sold
    /// elsewhere, or never filled): the row is zombie-closed and the call
    /// reports success without placing an order.
    pub async fn try_sell(&self, trade_id: i64, market: &str, price: f64, reason: &str) -> bool {
        let quantity = match self.client.get_balance(base_currency(market)).await {
            Ok(q) => q,
            Err(e) => {
                tracing::warn!(market, error = %e, "balance query failed, sell skipped");
                return false;
            }
        };

        if quantity <= 0.0 {
            tracing::info!(market, trade_id, "no external balance, closing as zombie");
            if let Err(e) = self.store.close_zombie(trade_id).await {
                tracing::warn!(trade_id, error = %e, "zombie close not recorded");
            }
            return true;
        }

        tracing::info!(market, quantity, reason, "sell order dispatching");

        match self.client.sell_market(market, quantity).await {
            Ok(Some(receipt)) => {
                tracing::info!(market, order_id = %receipt.order_id, "sell filled");
                if let Err(e) = self.store.log_sell(trade_id, price, reason).await {
                    tracing::warn!(trade_id, error = %e, "sell fill not recorded");
                }
                true
            }
            Ok(None) => {
                tracing::warn!(market, "sell order rejected");
                false
            }
            Err(e) => {
                tracing::error!(market, error = %e, "sell order failed");
                false
            }
        }
    }
}
