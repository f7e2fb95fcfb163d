use coinpilot::api::QuotationClient;
use coinpilot::backtest::DailyScanner;
use coinpilot::candles::CandleCache;
use coinpilot::config::Settings;
use coinpilot::db::TradeStore;
use coinpilot::execution::{ExecutionClient, PaperExchange};
use coinpilot::feed::{PriceTable, TickerCollector};
use coinpilot::strategy::EnsembleStrategy;
use coinpilot::trader::TradeEngine;
use coinpilot::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{timeout, Duration};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    tracing::info!("coinpilot starting");
    let settings = Settings::from_env();

    // The ledger is required: trading without it would desync immediately
    let store = Arc::new(TradeStore::connect(&settings.database_url).await?);

    let table = PriceTable::new();
    let quotation = QuotationClient::new();

    let feed_markets = match quotation.get_markets(&settings.quote_currency).await {
        Ok(markets) if !markets.is_empty() => markets,
        Ok(_) | Err(_) => {
            tracing::warn!("market list fetch failed, subscribing to majors only");
            vec![
                format!("{}-BTC", settings.quote_currency),
                format!("{}-ETH", settings.quote_currency),
                format!("{}-XRP", settings.quote_currency),
            ]
        }
    };

    let (stop_tx, stop_rx) = watch::channel(false);

    let collector = TickerCollector::new(settings.feed_url.clone(), feed_markets, table.clone());
    let mut feed_task = tokio::spawn(collector.run(stop_rx.clone()));

    let exec: Arc<dyn ExecutionClient> = Arc::new(PaperExchange::new(
        table.clone(),
        settings.quote_currency.clone(),
        settings.paper_seed_balance,
    ));
    tracing::info!(
        seed = settings.paper_seed_balance,
        "paper execution active"
    );

    let scanner = Arc::new(DailyScanner::new(
        quotation.clone(),
        EnsembleStrategy::default(),
        settings.cache_dir.clone(),
        settings.quote_currency.clone(),
    ));
    let cache = CandleCache::new(quotation.clone(), table.clone());

    let engine = Arc::new(TradeEngine::new(
        settings.clone(),
        table,
        quotation,
        cache,
        EnsembleStrategy::default(),
        scanner,
        store,
        exec,
    ));
    if settings.start_active {
        engine.start();
    }

    let loop_engine = engine.clone();
    let loop_stop = stop_rx.clone();
    let mut engine_task = tokio::spawn(async move {
        loop_engine.run_loop(loop_stop).await;
    });

    tracing::info!("feed and control loop running, press Ctrl+C to stop");

    let mut engine_finished = false;
    let mut feed_finished = false;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
        res = &mut engine_task => {
            tracing::error!(?res, "control loop exited unexpectedly");
            engine_finished = true;
        }
        res = &mut feed_task => {
            tracing::error!(?res, "feed collector exited unexpectedly");
            feed_finished = true;
        }
    }

    let _ = stop_tx.send(true);
    if !engine_finished {
        join_with_grace("control loop", engine_task).await;
    }
    if !feed_finished {
        join_with_grace("feed collector", feed_task).await;
    }

    tracing::info!("coinpilot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coinpilot=info".into()),
        )
        .init();
}

async fn join_with_grace(name: &str, handle: tokio::task::JoinHandle<()>) {
    match timeout(SHUTDOWN_GRACE, handle).await {
        Ok(_) => tracing::info!("{name} stopped"),
        Err(_) => tracing::warn!("{name} did not stop in time, abandoning"),
    }
}
