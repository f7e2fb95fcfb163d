//! Bulk-load daily candles for every tradable market into the candle archive.

use clap::Parser;
use coinpilot::api::{CandleInterval, QuotationClient};
use coinpilot::db::TradeStore;
use coinpilot::Result;
use tokio::time::{sleep, Duration};

#[derive(Parser)]
#[command(about = "Download daily candles for all markets into the candles table")]
struct Args {
    /// Days of history per market
    #[arg(long, default_value_t = 200)]
    days: u32,

    /// Postgres connection URL (falls back to DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Quote currency whose markets are loaded
    #[arg(long, default_value = "KRW")]
    fiat: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backfill=info,coinpilot=info".into()),
        )
        .init();

    let args = Args::parse();
    let database_url = match args.database_url.clone() {
        Some(url) => url,
        None => std::env::var("DATABASE_URL")
            .map_err(|_| "set --database-url or DATABASE_URL")?,
    };
    let store = TradeStore::connect(&database_url).await?;
    let client = QuotationClient::new();

    let markets = client.get_markets(&args.fiat).await?;
    tracing::info!(markets = markets.len(), days = args.days, "backfill starting");

    let mut loaded = 0u64;
    for (i, market) in markets.iter().enumerate() {
        match client.get_ohlcv(market, CandleInterval::Day, args.days).await {
            Ok(candles) => match store.save_candles(&candles).await {
                Ok(inserted) => {
                    loaded += inserted;
                    tracing::info!(
                        market = %market,
                        progress = format!("{}/{}", i + 1, markets.len()),
                        inserted,
                        "market archived"
                    );
                }
                Err(e) => tracing::warn!(market = %market, error = %e, "candle save failed"),
            },
            Err(e) => tracing::warn!(market = %market, error = %e, "candle fetch failed, skipping"),
        }

        // Stay under the public API rate limit
        sleep(Duration::from_millis(50)).await;
    }

    tracing::info!(loaded, "backfill complete");
    Ok(())
}
