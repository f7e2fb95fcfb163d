use chrono::Utc;
use coinpilot::api::{CandleInterval, QuotationClient};
use coinpilot::backtest::{simulate, simulate_with, DayCall};
use coinpilot::execution::{ExecutionClient, PaperExchange};
use coinpilot::feed::PriceTable;
use coinpilot::models::{profit_rate, Candle, PriceSnapshot};
use coinpilot::strategy::EnsembleStrategy;
use coinpilot::trader::reconcile;

fn synthetic_candles(len: usize, base: f64, step: f64) -> Vec<Candle> {
    (0..len)
        .map(|i| {
            let close = base + step * i as f64;
            Candle {
                market: "KRW-TEST".to_string(),
                timestamp: Utc::now() + chrono::Duration::days(i as i64),
                open: close - step * 0.5,
                high: close + step,
                low: close - step,
                close,
                volume: 1000.0 + (i % 7) as f64 * 50.0,
            }
        })
        .collect()
}

/// Offline walk through the core pipeline: signal -> replay -> paper fills
/// -> reconciliation planning.
#[tokio::test]
async fn test_offline_pipeline() {
    println!("=== Offline pipeline test ===\n");

    // 1. Signal evaluation over a trending series
    println!("1. Evaluating ensemble signal...");
    let strategy = EnsembleStrategy::default();
    let daily = synthetic_candles(60, 100.0, 2.0);
    let result = strategy.evaluate(&daily, &daily, true).expect("enough history");

    println!("   score: {} / 12.0", result.score);
    assert!(result.score >= 0.0 && result.score <= 12.0);
    assert_eq!(result.should_buy, result.score >= 7.0);
    assert!(!result.breakdown.is_empty());

    // 2. Historical replay never fills at the signal bar
    println!("2. Replaying scripted decisions...");
    let summary = simulate_with(&daily, |slice| {
        Some(match slice.len() {
            35 => DayCall::Buy,
            45 => DayCall::Sell,
            _ => DayCall::Hold,
        })
    });
    assert_eq!(summary.trades, 1);
    assert!(summary.total_return > 0.0, "rising opens must yield a win");

    let ensemble_summary = simulate(&strategy, &daily);
    assert!(ensemble_summary.win_rate <= 100.0);

    // 3. Paper execution round trip
    println!("3. Exercising paper execution...");
    let table = PriceTable::new();
    table
        .update(PriceSnapshot {
            market: "KRW-TEST".to_string(),
            price: 218.0,
            turnover_24h: 9_000_000_000.0,
            received_at: Utc::now(),
        })
        .unwrap();

    let exchange = PaperExchange::new(table, "KRW", 1_000_000.0);
    let receipt = exchange.buy_market("KRW-TEST", 500_000.0).await.unwrap();
    assert!(receipt.is_some());
    assert_eq!(exchange.get_balance("KRW").await.unwrap(), 500_000.0);

    // 4. Reconciliation sees the new holding
    println!("4. Planning reconciliation...");
    let balances = exchange.get_all_balances().await.unwrap();
    let plan = reconcile::plan(&balances, &[], "KRW", 5_000.0);
    assert_eq!(plan.imports.len(), 1);
    assert_eq!(plan.imports[0].market, "KRW-TEST");
    assert!(plan.zombies.is_empty());

    // 5. Profit-rate arithmetic used by the exit rules
    println!("5. Checking profit-rate arithmetic...");
    assert!((profit_rate(100.0, 103.5) - 3.5).abs() < 1e-9);

    println!("\n=== Offline pipeline OK ===");
}

/// Live-API walkthrough against the public quotation endpoints.
/// Requires network access; run with `cargo test -- --ignored`.
#[tokio::test]
#[ignore]
async fn test_live_quotation_pipeline() {
    let _ = tracing_subscriber::fmt::try_init();

    println!("=== Live quotation test ===\n");
    let client = QuotationClient::new();

    println!("1. Fetching market list...");
    let markets = client.get_markets("KRW").await.expect("market list");
    assert!(markets.iter().any(|m| m == "KRW-BTC"));
    println!("   {} KRW markets", markets.len());

    println!("2. Fetching BTC daily candles...");
    let daily = client
        .get_ohlcv("KRW-BTC", CandleInterval::Day, 60)
        .await
        .expect("daily candles");
    assert!(daily.len() >= 30);
    assert!(daily.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    println!("3. Evaluating the live ensemble signal...");
    let result = EnsembleStrategy::default()
        .evaluate(&daily, &daily, true)
        .expect("signal");
    println!(
        "   score {} | RSI {:.1} | MFI {:.1} | buy: {}",
        result.score, result.rsi, result.mfi, result.should_buy
    );
    assert!(result.score >= 0.0 && result.score <= 12.0);
    assert!(result.rsi >= 0.0 && result.rsi <= 100.0);
    assert!(result.mfi >= 0.0 && result.mfi <= 100.0);

    println!("4. Fetching the live price...");
    let price = client.get_current_price("KRW-BTC").await.expect("price");
    assert!(price > 0.0);

    println!("\n=== Live quotation OK ===");
}
