use super::{base_currency, ExecutionClient};
use crate::feed::PriceTable;
use crate::models::{AccountBalance, OrderReceipt};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

const FEE_RATE: f64 = 0.0005;

#[derive(Debug, Clone, Default)]
struct Holding {
    quantity: f64,
    avg_buy_price: f64,
}

/// Simulated exchange account with immediate fills.
///
/// Orders fill at the live price-table price; no price yet means the order
/// is rejected (`None` receipt), same as a live rejection. Average buy
/// price is tracked per holding so ledger reconciliation behaves exactly as
/// it would against a real account.
pub struct PaperExchange {
    table: PriceTable,
    quote_currency: String,
    holdings: RwLock<HashMap<String, Holding>>,
    order_seq: AtomicU64,
}

impl PaperExchange {
    pub fn new(table: PriceTable, quote_currency: impl Into<String>, seed_balance: f64) -> Self {
        let quote_currency = quote_currency.into();
        let mut holdings = HashMap::new();
        holdings.insert(
            quote_currency.clone(),
            Holding {
                quantity: seed_balance,
                avg_buy_price: 0.0,
            },
        );

        Self {
            table,
            quote_currency,
            holdings: RwLock::new(holdings),
            order_seq: AtomicU64::new(1),
        }
    }

    /// Seed a holding directly, for scenario setup
    pub async fn credit(&self, currency: &str, quantity: f64, avg_buy_price: f64) {
        let mut holdings = self.holdings.write().await;
        holdings.insert(
            currency.to_string(),
            Holding {
                quantity,
                avg_buy_price,
            },
        );
    }

    fn receipt(&self, market: &str) -> OrderReceipt {
        let seq = self.order_seq.fetch_add(1, Ordering::SeqCst);
        OrderReceipt {
            order_id: format!("paper-{seq}"),
            market: market.to_string(),
            executed_at: Utc::now(),
        }
    }

    fn live_price(&self, market: &str) -> Option<f64> {
        self.table
            .get(market)
            .ok()
            .flatten()
            .map(|s| s.price)
            .filter(|p| *p > 0.0)
    }
}

#[async_trait]
impl ExecutionClient for PaperExchange {
    async fn get_balance(&self, currency: &str) -> anyhow::Result<f64> {
        let holdings = self.holdings.read().await;
        Ok(holdings.get(currency).map(|h| h.quantity).unwrap_or(0.0))
    }

    async fn get_all_balances(&self) -> anyhow::Result<Vec<AccountBalance>> {
        let holdings = self.holdings.read().await;
        Ok(holdings
            .iter()
            .filter(|(_, h)| h.quantity > 0.0)
            .map(|(currency, h)| AccountBalance {
                currency: currency.clone(),
                balance: h.quantity,
                locked: 0.0,
                avg_buy_price: h.avg_buy_price,
            })
            .collect())
    }

    async fn buy_market(
        &self,
        market: &str,
        quote_amount: f64,
    ) -> anyhow::Result<Option<OrderReceipt>> {
        let Some(price) = self.live_price(market) else {
            tracing::warn!(market, "paper buy rejected: no live price");
            return Ok(None);
        };

        let mut holdings = self.holdings.write().await;
        let cash = holdings
            .get(&self.quote_currency)
            .map(|h| h.quantity)
            .unwrap_or(0.0);
        if cash < quote_amount || quote_amount <= 0.0 {
            tracing::warn!(market, cash, quote_amount, "paper buy rejected: insufficient funds");
            return Ok(None);
        }

        if let Some(quote) = holdings.get_mut(&self.quote_currency) {
            quote.quantity -= quote_amount;
        }

        let quantity = quote_amount * (1.0 - FEE_RATE) / price;
        let base = holdings.entry(base_currency(market).to_string()).or_default();
        let total_cost = base.quantity * base.avg_buy_price + quantity * price;
        base.quantity += quantity;
        base.avg_buy_price = if base.quantity > 0.0 {
            total_cost / base.quantity
        } else {
            0.0
        };

        tracing::info!(market, price, quote_amount, quantity, "paper buy filled");
        Ok(Some(self.receipt(market)))
    }

    async fn sell_market(
        &self,
        market: &str,
        quantity: f64,
    ) -> anyhow::Result<Option<OrderReceipt>> {
        let Some(price) = self.live_price(market) else {
            tracing::warn!(market, "paper sell rejected: no live price");
            return Ok(None);
        };

        let mut holdings = self.holdings.write().await;
        let base = base_currency(market).to_string();
        let held = holdings.get(&base).map(|h| h.quantity).unwrap_or(0.0);
        if held <= 0.0 || quantity <= 0.0 {
            tracing::warn!(market, held, "paper sell rejected: nothing to sell");
            return Ok(None);
        }

        let fill_quantity = quantity.min(held);
        match holdings.get_mut(&base) {
            Some(h) if h.quantity - fill_quantity > 1e-12 => h.quantity -= fill_quantity,
            _ => {
                holdings.remove(&base);
            }
        }

        let proceeds = fill_quantity * price * (1.0 - FEE_RATE);
        let quote = holdings.entry(self.quote_currency.clone()).or_default();
        quote.quantity += proceeds;

        tracing::info!(market, price, fill_quantity, proceeds, "paper sell filled");
        Ok(Some(self.receipt(market)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceSnapshot;

    fn table_with(market: &str, price: f64) -> PriceTable {
        let table = PriceTable::new();
        table
            .update(PriceSnapshot {
                market: market.to_string(),
                price,
                turnover_24h: 0.0,
                received_at: Utc::now(),
            })
            .unwrap();
        table
    }

    #[tokio::test]
    async fn test_buy_moves_cash_into_holding() {
        let exchange = PaperExchange::new(table_with("KRW-BTC", 100.0), "KRW", 10_000.0);

        let receipt = exchange.buy_market("KRW-BTC", 5_000.0).await.unwrap();
        assert!(receipt.is_some());

        assert_eq!(exchange.get_balance("KRW").await.unwrap(), 5_000.0);
        let btc = exchange.get_balance("BTC").await.unwrap();
        assert!((btc - 5_000.0 * (1.0 - FEE_RATE) / 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_buy_without_price_is_rejected() {
        let exchange = PaperExchange::new(PriceTable::new(), "KRW", 10_000.0);
        let receipt = exchange.buy_market("KRW-BTC", 5_000.0).await.unwrap();
        assert!(receipt.is_none());
        assert_eq!(exchange.get_balance("KRW").await.unwrap(), 10_000.0);
    }

    #[tokio::test]
    async fn test_buy_beyond_cash_is_rejected() {
        let exchange = PaperExchange::new(table_with("KRW-BTC", 100.0), "KRW", 1_000.0);
        let receipt = exchange.buy_market("KRW-BTC", 5_000.0).await.unwrap();
        assert!(receipt.is_none());
    }

    #[tokio::test]
    async fn test_sell_roundtrip_restores_cash_minus_fees() {
        let exchange = PaperExchange::new(table_with("KRW-BTC", 100.0), "KRW", 10_000.0);
        exchange.buy_market("KRW-BTC", 10_000.0).await.unwrap();

        let btc = exchange.get_balance("BTC").await.unwrap();
        let receipt = exchange.sell_market("KRW-BTC", btc).await.unwrap();
        assert!(receipt.is_some());

        assert_eq!(exchange.get_balance("BTC").await.unwrap(), 0.0);
        let cash = exchange.get_balance("KRW").await.unwrap();
        let expected = 10_000.0 * (1.0 - FEE_RATE) * (1.0 - FEE_RATE);
        assert!((cash - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_sell_without_holding_is_rejected() {
        let exchange = PaperExchange::new(table_with("KRW-BTC", 100.0), "KRW", 10_000.0);
        let receipt = exchange.sell_market("KRW-BTC", 1.0).await.unwrap();
        assert!(receipt.is_none());
    }

    #[tokio::test]
    async fn test_average_cost_accumulates() {
        let table = table_with("KRW-BTC", 100.0);
        let exchange = PaperExchange::new(table.clone(), "KRW", 100_000.0);
        exchange.buy_market("KRW-BTC", 10_000.0).await.unwrap();

        table
            .update(PriceSnapshot {
                market: "KRW-BTC".to_string(),
                price: 200.0,
                turnover_24h: 0.0,
                received_at: Utc::now(),
            })
            .unwrap();
        exchange.buy_market("KRW-BTC", 10_000.0).await.unwrap();

        let balances = exchange.get_all_balances().await.unwrap();
        let btc = balances.iter().find(|b| b.currency == "BTC").unwrap();
        assert!(btc.avg_buy_price > 100.0 && btc.avg_buy_price < 200.0);
    }
}
