use crate::db::TradeStore;
use crate::execution::ExecutionClient;
use crate::models::{AccountBalance, TradeRow};
use std::collections::HashSet;
use std::sync::Arc;

/// Holdings below this quote-currency value are treated as dust
pub const MIN_HOLDING_VALUE: f64 = 5_000.0;

/// Externally held market to be imported into the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingImport {
    pub market: String,
    pub avg_buy_price: f64,
    pub value: f64,
}

/// Writes needed to bring the ledger in line with external holdings
#[derive(Debug, Default, PartialEq)]
pub struct ReconcilePlan {
    pub imports: Vec<HoldingImport>,
    pub zombies: Vec<i64>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.zombies.is_empty()
    }
}

/// Compare external holdings with open ledger rows.
///
/// Holdings above `min_value` without an open row become imports at the
/// reported average cost; open rows whose market is no longer held become
/// zombie closures. Pure: repeated planning over unchanged inputs yields an
/// empty plan once the first plan has been applied.
pub fn plan(
    holdings: &[AccountBalance],
    open_trades: &[TradeRow],
    quote_currency: &str,
    min_value: f64,
) -> ReconcilePlan {
    let open_markets: HashSet<&str> = open_trades.iter().map(|t| t.market.as_str()).collect();

    let mut imports = Vec::new();
    let mut held_markets = HashSet::new();

    for holding in holdings {
        if holding.currency == quote_currency {
            continue;
        }

        let market = format!("{quote_currency}-{}", holding.currency);
        let value = holding.cost_value();
        if value <= min_value {
            continue;
        }

        held_markets.insert(market.clone());
        if !open_markets.contains(market.as_str()) {
            imports.push(HoldingImport {
                market,
                avg_buy_price: holding.avg_buy_price,
                value,
            });
        }
    }

    let zombies = open_trades
        .iter()
        .filter(|t| !held_markets.contains(&t.market))
        .map(|t| t.id)
        .collect();

    ReconcilePlan { imports, zombies }
}

/// Applied plan counts, for logging
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub imported: usize,
    pub zombies_closed: usize,
}

/// Applies reconciliation plans through the ledger store.
///
/// Each write is an individual row operation; a crash mid-plan leaves a
/// partial application that the next run converges on.
pub struct LedgerReconciler {
    client: Arc<dyn ExecutionClient>,
    store: Arc<TradeStore>,
    quote_currency: String,
    min_value: f64,
}

impl LedgerReconciler {
    pub fn new(
        client: Arc<dyn ExecutionClient>,
        store: Arc<TradeStore>,
        quote_currency: impl Into<String>,
    ) -> Self {
        Self {
            client,
            store,
            quote_currency: quote_currency.into(),
            min_value: MIN_HOLDING_VALUE,
        }
    }

    pub async fn run(&self) -> crate::Result<ReconcileReport> {
        let holdings = self.client.get_all_balances().await?;
        let open_trades = self.store.open_trades().await?;
        let plan = plan(&holdings, &open_trades, &self.quote_currency, self.min_value);

        let mut report = ReconcileReport::default();

        for import in &plan.imports {
            tracing::info!(
                market = %import.market,
                avg_buy_price = import.avg_buy_price,
                value = import.value,
                "importing untracked holding"
            );
            match self
                .store
                .log_buy(&import.market, import.avg_buy_price, import.value, "Imported")
                .await
            {
                Ok(_) => report.imported += 1,
                Err(e) => tracing::warn!(market = %import.market, error = %e, "import failed"),
            }
        }

        for &trade_id in &plan.zombies {
            tracing::info!(trade_id, "closing trade absent from external holdings");
            match self.store.close_zombie(trade_id).await {
                Ok(()) => report.zombies_closed += 1,
                Err(e) => tracing::warn!(trade_id, error = %e, "zombie close failed"),
            }
        }

        if report.imported > 0 || report.zombies_closed > 0 {
            tracing::info!(
                imported = report.imported,
                zombies_closed = report.zombies_closed,
                "ledger reconciled"
            );
        }
        Ok(report)
    }
}
