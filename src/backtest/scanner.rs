use super::simulator::simulate;
use crate::api::{CandleInterval, QuotationClient};
use crate::strategy::{EnsembleStrategy, IndicatorSignals};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};

const MAX_IN_FLIGHT: usize = 10;
const FETCH_PACING: Duration = Duration::from_millis(100);
const HISTORY_BARS: u32 = 200;
const MIN_HISTORY_BARS: usize = 50;

/// Per-market result of the daily scan: trailing-window backtest plus the
/// same-day live signal used for ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisEntry {
    pub market: String,
    pub win_rate: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub score: f64,
    pub should_buy: bool,
    pub current_price: f64,
    pub target_price: f64,
    pub stop_loss_price: f64,
    pub atr: f64,
    pub rsi: f64,
    pub mfi: f64,
    pub signals: IndicatorSignals,
    pub breakdown: Vec<String>,
}

/// One market that could not be analyzed this scan
#[derive(Debug, Clone)]
pub struct ScanFailure {
    pub market: String,
    pub error: String,
}

/// Full-market daily scan with a day-stamped result cache.
///
/// Construct once at startup and share; a scan already cached for today is
/// loaded instead of recomputed. Individual market failures never abort the
/// scan; they are returned so callers can see exactly what was skipped.
pub struct DailyScanner {
    client: QuotationClient,
    strategy: EnsembleStrategy,
    cache_dir: PathBuf,
    fiat: String,
    results: RwLock<HashMap<String, AnalysisEntry>>,
    scanning: AtomicBool,
}

impl DailyScanner {
    pub fn new(
        client: QuotationClient,
        strategy: EnsembleStrategy,
        cache_dir: PathBuf,
        fiat: impl Into<String>,
    ) -> Self {
        Self {
            client,
            strategy,
            cache_dir,
            fiat: fiat.into(),
            results: RwLock::new(HashMap::new()),
            scanning: AtomicBool::new(false),
        }
    }

    fn analysis_path(&self) -> PathBuf {
        self.cache_dir
            .join(format!("analysis_{}.json", Utc::now().format("%Y-%m-%d")))
    }

    fn report_path(&self) -> PathBuf {
        self.cache_dir
            .join(format!("report_{}.txt", Utc::now().format("%Y-%m-%d")))
    }

    /// Run (or load) today's scan. Returns the markets that were skipped.
    pub async fn run_daily_scan(&self) -> crate::Result<Vec<ScanFailure>> {
        if self.scanning.swap(true, Ordering::SeqCst) {
            tracing::info!("scan already in progress, skipping");
            return Ok(Vec::new());
        }

        let outcome = self.scan_inner().await;
        self.scanning.store(false, Ordering::SeqCst);
        outcome
    }

    async fn scan_inner(&self) -> crate::Result<Vec<ScanFailure>> {
        std::fs::create_dir_all(&self.cache_dir)?;

        // Same-day cache short-circuits the whole scan
        if let Some(cached) = load_cache(&self.analysis_path()) {
            tracing::info!(markets = cached.len(), "loaded cached daily analysis");
            *self.results.write().map_err(|e| e.to_string())? = cached;

            if !self.report_path().exists() {
                self.write_report()?;
            }
            return Ok(Vec::new());
        }

        let markets = self.client.get_markets(&self.fiat).await?;
        tracing::info!(markets = markets.len(), "starting full market scan");

        let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
        let outcomes = futures_util::future::join_all(
            markets
                .iter()
                .map(|market| self.analyze_market(market, semaphore.clone())),
        )
        .await;

        let failures: Vec<ScanFailure> = outcomes.into_iter().filter_map(|r| r.err()).collect();
        for failure in &failures {
            tracing::warn!(market = %failure.market, error = %failure.error, "market skipped");
        }

        let results = self.results.read().map_err(|e| e.to_string())?.clone();
        if !results.is_empty() {
            let json = serde_json::to_string_pretty(&results)?;
            std::fs::write(self.analysis_path(), json)?;
            self.write_report()?;
        }

        tracing::info!(
            analyzed = results.len(),
            skipped = failures.len(),
            "daily scan complete"
        );
        Ok(failures)
    }

    async fn analyze_market(
        &self,
        market: &str,
        semaphore: Arc<Semaphore>,
    ) -> Result<(), ScanFailure> {
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|e| ScanFailure {
                market: market.to_string(),
                error: e.to_string(),
            })?;

        let outcome = self.analyze_one(market).await;
        // Pace requests while still holding the permit
        sleep(FETCH_PACING).await;

        outcome.map_err(|e| ScanFailure {
            market: market.to_string(),
            error: e.to_string(),
        })
    }

    async fn analyze_one(&self, market: &str) -> crate::Result<()> {
        let daily = self
            .client
            .get_ohlcv(market, CandleInterval::Day, HISTORY_BARS)
            .await?;
        if daily.len() < MIN_HISTORY_BARS {
            return Err(format!("only {} bars of history", daily.len()).into());
        }

        // The still-forming last bar is excluded from the replay but feeds
        // the live ranking signal.
        let summary = simulate(&self.strategy, &daily[..daily.len() - 1]);
        let live = self
            .strategy
            .evaluate(&daily, &daily, true)
            .ok_or("insufficient history for live signal")?;

        let entry = AnalysisEntry {
            market: market.to_string(),
            win_rate: summary.win_rate,
            total_return: summary.total_return,
            max_drawdown: summary.max_drawdown,
            score: live.score,
            should_buy: live.should_buy,
            current_price: live.current_price,
            target_price: live.target_price,
            stop_loss_price: live.stop_loss_price,
            atr: live.atr,
            rsi: live.rsi,
            mfi: live.mfi,
            signals: live.signals,
            breakdown: live.breakdown,
        };

        self.results
            .write()
            .map_err(|e| e.to_string())?
            .insert(market.to_string(), entry);
        Ok(())
    }

    fn write_report(&self) -> crate::Result<()> {
        let mut entries: Vec<AnalysisEntry> = self
            .results
            .read()
            .map_err(|e| e.to_string())?
            .values()
            .cloned()
            .collect();
        rank_entries(&mut entries);
        std::fs::write(self.report_path(), format_report(&entries))?;
        tracing::info!(path = %self.report_path().display(), "ranked report written");
        Ok(())
    }

    /// Cached analysis for one market, if today's scan covered it
    pub fn get_analysis(&self, market: &str) -> Option<AnalysisEntry> {
        self.results.read().ok()?.get(market).cloned()
    }

    /// Top `n` markets with a positive live score, best first
    pub fn get_best_opportunities(&self, n: usize) -> Vec<String> {
        let mut entries: Vec<AnalysisEntry> = match self.results.read() {
            Ok(results) => results.values().filter(|e| e.score > 0.0).cloned().collect(),
            Err(_) => return Vec::new(),
        };
        rank_entries(&mut entries);
        entries.into_iter().take(n).map(|e| e.market).collect()
    }

    #[cfg(test)]
    fn insert_for_test(&self, entry: AnalysisEntry) {
        self.results
            .write()
            .unwrap()
            .insert(entry.market.clone(), entry);
    }
}

/// Sort best-first by (score, win rate, total return)
pub(crate) fn rank_entries(entries: &mut [AnalysisEntry]) {
    entries.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.win_rate
                    .partial_cmp(&a.win_rate)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(
                b.total_return
                    .partial_cmp(&a.total_return)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });
}

fn load_cache(path: &Path) -> Option<HashMap<String, AnalysisEntry>> {
    let text = std::fs::read_to_string(path).ok()?;
    let map: HashMap<String, AnalysisEntry> = serde_json::from_str(&text).ok()?;
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

fn format_report(entries: &[AnalysisEntry]) -> String {
    let mut out = String::new();
    out.push_str("=== Daily Market Scan ===\n");
    out.push_str(&format!("Date: {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S")));
    out.push_str(&format!("Markets: {}\n", entries.len()));
    out.push_str(&format!("{}\n", "=".repeat(90)));
    out.push_str(&format!(
        "{:<4} | {:<12} | {:<5} | {:<7} | {:<8} | {:<6} | {:<5} | {:<12}\n",
        "Rank", "Market", "Score", "WinRate", "Yield", "MDD", "RSI", "Price"
    ));
    out.push_str(&format!("{}\n", "-".repeat(90)));

    for (rank, entry) in entries.iter().enumerate() {
        out.push_str(&format!(
            "{:<4} | {:<12} | {:<5.1} | {:<6.1}% | {:<7.1}% | {:<6.1} | {:<5.0} | {:<12.0}\n",
            rank + 1,
            entry.market,
            entry.score,
            entry.win_rate,
            entry.total_return,
            entry.max_drawdown,
            entry.rsi,
            entry.current_price
        ));
    }

    out
}
