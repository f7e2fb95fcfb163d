use crate::api::QuotationClient;
use crate::backtest::DailyScanner;
use crate::candles::CandleCache;
use crate::config::Settings;
use crate::db::TradeStore;
use crate::execution::{base_currency, ExecutionClient};
use crate::feed::PriceTable;
use crate::models::{profit_rate, TradeRow};
use crate::strategy::{overheat_filter, EnsembleStrategy, SignalResult};
use crate::trader::dispatch::OrderRouter;
use crate::trader::reconcile::LedgerReconciler;
use crate::trader::status::{AccountSummary, SnapshotHandle, StatusSnapshot, TickerStatus};
use chrono::{Timelike, Utc};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration as StdDuration, Instant};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::time::{sleep, Duration};

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const ERROR_BACKOFF: Duration = Duration::from_secs(5);
const BUY_DISPATCH_GAP: Duration = Duration::from_millis(200);
const PROFITABLE_EXIT_FLOOR: f64 = 0.5;

/// Rebuy cooldown bookkeeping. A market sold at time T is excluded from buy
/// candidates until exactly T + window.
pub(crate) struct CooldownTracker {
    window: StdDuration,
    entries: HashMap<String, Instant>,
}

impl CooldownTracker {
    pub(crate) fn new(window: StdDuration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn record(&mut self, market: &str) {
        self.entries.insert(market.to_string(), Instant::now());
    }

    #[cfg(test)]
    fn record_at(&mut self, market: &str, at: Instant) {
        self.entries.insert(market.to_string(), at);
    }

    pub(crate) fn is_blocked(&self, market: &str) -> bool {
        self.entries
            .get(market)
            .map(|sold_at| sold_at.elapsed() < self.window)
            .unwrap_or(false)
    }

    pub(crate) fn remaining(&self, market: &str) -> Option<StdDuration> {
        let sold_at = self.entries.get(market)?;
        self.window.checked_sub(sold_at.elapsed()).filter(|d| !d.is_zero())
    }

    pub(crate) fn prune(&mut self) {
        let window = self.window;
        self.entries.retain(|_, sold_at| sold_at.elapsed() < window);
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Close-reason decision for one open trade, in priority order
pub(crate) fn close_reason(
    rate: f64,
    result: &SignalResult,
    profit_target: f64,
    stop_loss: f64,
    exit_threshold: f64,
) -> Option<String> {
    if rate >= profit_target {
        Some(format!("take-profit ({rate:.2}%)"))
    } else if rate <= stop_loss {
        Some(format!("stop-loss ({rate:.2}%)"))
    } else if rate > PROFITABLE_EXIT_FLOOR && result.rsi >= 80.0 {
        Some(format!("rsi-overheat ({rate:.2}%)"))
    } else if rate > PROFITABLE_EXIT_FLOOR && result.mfi >= 85.0 {
        Some(format!("mfi-overheat ({rate:.2}%)"))
    } else if result.score < exit_threshold {
        Some(format!("score-decay ({:.2})", result.score))
    } else if result.rsi < 50.0 && result.mfi >= 75.0 {
        Some("distribution-divergence".to_string())
    } else {
        None
    }
}

pub(crate) struct Candidate {
    pub market: String,
    pub result: SignalResult,
}

/// Best first: highest score, then highest MFI
pub(crate) fn rank_candidates(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.result
            .score
            .partial_cmp(&a.result.score)
            .unwrap_or(CmpOrdering::Equal)
            .then(
                b.result
                    .mfi
                    .partial_cmp(&a.result.mfi)
                    .unwrap_or(CmpOrdering::Equal),
            )
    });
    candidates
}

/// Build the (market, category) target list from feed turnover and scanner
/// picks: top-5 by turnover, up to 5 scanner picks drawn from the top-50,
/// padded with further high-volume names to at least 10 entries.
pub(crate) fn select_targets(
    mut turnover: Vec<(String, f64)>,
    scanner_picks: &[String],
    min_turnover: f64,
) -> Vec<(String, String)> {
    turnover.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(CmpOrdering::Equal));
    let valid: Vec<String> = turnover
        .into_iter()
        .filter(|(_, t)| *t >= min_turnover)
        .map(|(m, _)| m)
        .collect();
    let top50: HashSet<&str> = valid.iter().take(50).map(String::as_str).collect();

    let mut targets: Vec<(String, String)> = Vec::new();
    let mut included: HashSet<String> = HashSet::new();

    for market in valid.iter().take(5) {
        targets.push((market.clone(), "top volume".to_string()));
        included.insert(market.clone());
    }

    let mut picks_added = 0;
    for market in scanner_picks {
        if picks_added >= 5 {
            break;
        }
        if included.contains(market) || !top50.contains(market.as_str()) {
            continue;
        }
        targets.push((market.clone(), "scanner pick".to_string()));
        included.insert(market.clone());
        picks_added += 1;
    }

    for market in &valid {
        if targets.len() >= 10 {
            break;
        }
        if !included.contains(market) {
            targets.push((market.clone(), "high volume".to_string()));
            included.insert(market.clone());
        }
    }

    targets
}

/// Top-level trading scheduler.
///
/// One instance drives the 1Hz control loop; the HTTP boundary shares the
/// same instance through `Arc` and uses the public start/stop, manual-order
/// and snapshot methods. State transitions happen only through `start` and
/// `stop` - nothing in the loop flips trading on or off by itself.
pub struct TradeEngine {
    settings: Settings,
    table: PriceTable,
    client: QuotationClient,
    cache: AsyncMutex<CandleCache>,
    strategy: EnsembleStrategy,
    scanner: Arc<DailyScanner>,
    store: Arc<TradeStore>,
    exec: Arc<dyn ExecutionClient>,
    router: OrderRouter,
    reconciler: LedgerReconciler,
    active: AtomicBool,
    cooldowns: Mutex<CooldownTracker>,
    targets: RwLock<Vec<String>>,
    status: Mutex<HashMap<String, TickerStatus>>,
    rest_prices: Mutex<HashMap<String, f64>>,
    snapshot: SnapshotHandle,
}

impl TradeEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Settings,
        table: PriceTable,
        client: QuotationClient,
        cache: CandleCache,
        strategy: EnsembleStrategy,
        scanner: Arc<DailyScanner>,
        store: Arc<TradeStore>,
        exec: Arc<dyn ExecutionClient>,
    ) -> Self {
        let router = OrderRouter::new(exec.clone(), store.clone());
        let reconciler =
            LedgerReconciler::new(exec.clone(), store.clone(), settings.quote_currency.clone());
        let cooldown_window = StdDuration::from_secs(settings.cooldown_secs);

        Self {
            settings,
            table,
            client,
            cache: AsyncMutex::new(cache),
            strategy,
            scanner,
            store,
            exec,
            router,
            reconciler,
            active: AtomicBool::new(false),
            cooldowns: Mutex::new(CooldownTracker::new(cooldown_window)),
            targets: RwLock::new(Vec::new()),
            status: Mutex::new(HashMap::new()),
            rest_prices: Mutex::new(HashMap::new()),
            snapshot: SnapshotHandle::new(),
        }
    }

    /// Enable trade dispatch
    pub fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
        tracing::info!("trading started");
    }

    /// Disable trade dispatch; scanning and reconciliation keep running
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        tracing::info!("trading stopped");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Cloneable handle to the latest published snapshot
    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.read()
    }

    /// Drive the control loop until the stop flag flips
    pub async fn run_loop(&self, stop: watch::Receiver<bool>) {
        tracing::info!("control loop waiting for live feed data");
        while self.table.len().unwrap_or(0) < self.settings.min_feed_markets {
            if *stop.borrow() {
                return;
            }
            sleep(TICK_INTERVAL).await;
        }
        tracing::info!("live feed confirmed, running initial analysis");

        match self.scanner.run_daily_scan().await {
            Ok(skipped) if !skipped.is_empty() => {
                tracing::warn!(skipped = skipped.len(), "initial scan had skipped markets");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "initial scan failed"),
        }
        if let Err(e) = self.refresh_targets().await {
            tracing::warn!(error = %e, "initial target refresh failed");
        }

        let mut tick_count: u64 = 0;
        while !*stop.borrow() {
            if let Err(e) = self.tick(tick_count).await {
                tracing::error!(error = %e, "tick failed");
                sleep(ERROR_BACKOFF).await;
            }
            tick_count += 1;
            sleep(TICK_INTERVAL).await;
        }
        tracing::info!("control loop stopped");
    }

    async fn tick(&self, tick_count: u64) -> crate::Result<()> {
        // Housekeeping runs before either trading pass
        if tick_count > 0 && tick_count % self.settings.target_refresh_ticks == 0 {
            self.refresh_targets().await?;
            self.cleanup().await;
        }

        let now = Utc::now();
        if now.hour() == self.settings.scan_hour
            && now.minute() == self.settings.scan_minute
            && tick_count % 60 == 0
        {
            let scanner = self.scanner.clone();
            tokio::spawn(async move {
                if let Err(e) = scanner.run_daily_scan().await {
                    tracing::warn!(error = %e, "scheduled scan failed");
                }
            });
            self.cooldowns.lock().unwrap().clear();
            tracing::info!("scheduled daily scan triggered, cooldowns cleared");
        }

        // Selling is always evaluated before buying
        self.process_selling().await;
        if self.is_active() {
            self.process_buying().await;
        }

        self.publish_snapshot().await;
        Ok(())
    }

    async fn process_selling(&self) {
        let open_trades = match self.store.open_trades().await {
            Ok(trades) => trades,
            Err(e) => {
                tracing::warn!(error = %e, "open trades query failed");
                return;
            }
        };

        for trade in open_trades {
            let Some(bars) = self.cache.lock().await.fetch(&trade.market).await else {
                continue;
            };
            if !bars.is_live || bars.current_price <= 0.0 {
                continue;
            }

            let buy_price = if trade.buy_price > 0.0 {
                trade.buy_price
            } else {
                bars.current_price
            };
            let rate = profit_rate(buy_price, bars.current_price);

            let Some(result) = self.strategy.evaluate(&bars.daily, &bars.intraday, false) else {
                continue;
            };
            self.update_status(&trade.market, bars.current_price, &result);

            let reason = close_reason(
                rate,
                &result,
                self.settings.profit_target,
                self.settings.stop_loss,
                self.strategy.exit_threshold(),
            );

            if let Some(reason) = reason {
                if !self.is_active() {
                    continue;
                }
                tracing::info!(market = %trade.market, %reason, rate, "exit signal");
                if self
                    .router
                    .try_sell(trade.id, &trade.market, bars.current_price, &reason)
                    .await
                {
                    self.cooldowns.lock().unwrap().record(&trade.market);
                    self.clear_held_tag(&trade.market);
                }
            }
        }
    }

    async fn process_buying(&self) {
        let open_count = match self.store.open_trade_count().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "open trade count failed");
                return;
            }
        };
        let slots = i64::from(self.settings.max_positions) - open_count;
        if slots <= 0 {
            return;
        }

        let cash = match self.exec.get_balance(&self.settings.quote_currency).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "balance query failed");
                return;
            }
        };
        if cash < self.settings.min_order {
            return;
        }
        let mut budget = (cash * 0.99) / slots as f64;
        if budget < self.settings.min_order {
            budget = cash * 0.99;
        }

        let targets: Vec<String> = self.targets.read().unwrap().clone();
        let held: HashSet<String> = self
            .store
            .open_markets()
            .await
            .unwrap_or_default()
            .into_iter()
            .collect();

        let mut candidates = Vec::new();
        for market in targets {
            if held.contains(&market) {
                continue;
            }
            if self.cooldowns.lock().unwrap().is_blocked(&market) {
                continue;
            }

            let Some(bars) = self.cache.lock().await.fetch(&market).await else {
                continue;
            };
            if !bars.is_live {
                continue;
            }
            let Some(result) = self.strategy.evaluate(&bars.daily, &bars.intraday, false) else {
                continue;
            };
            self.update_status(&market, bars.current_price, &result);

            if overheat_filter(result.rsi, result.mfi) {
                continue;
            }
            if result.score < self.strategy.buy_threshold() {
                continue;
            }
            candidates.push(Candidate { market, result });
        }

        for pick in rank_candidates(candidates).into_iter().take(slots as usize) {
            let active_signals = pick.result.signals.active();
            let strategy_name = if active_signals.is_empty() {
                "Ensemble".to_string()
            } else {
                active_signals.join("+")
            };

            tracing::info!(
                market = %pick.market,
                score = pick.result.score,
                rsi = pick.result.rsi,
                mfi = pick.result.mfi,
                "entry candidate selected"
            );
            if self
                .router
                .try_buy(&pick.market, pick.result.current_price, budget, &strategy_name)
                .await
            {
                self.mark_held(&pick.market);
                sleep(BUY_DISPATCH_GAP).await;
            }
        }
    }

    /// Manual market buy from the external boundary. Bypasses selection but
    /// reuses the dispatch/ledger primitives and republishes immediately.
    pub async fn place_manual_buy(&self, market: &str, amount: f64) -> crate::Result<String> {
        let cash = self.exec.get_balance(&self.settings.quote_currency).await?;
        if cash < amount {
            return Err(format!("insufficient balance ({cash:.0} available)").into());
        }

        let price = self.current_price_of(market).await?;
        if !self.router.try_buy(market, price, amount, "Manual").await {
            return Err("buy order failed".into());
        }

        self.mark_held(market);
        self.publish_snapshot().await;
        Ok(format!("{market} manual buy executed"))
    }

    /// Manual full-position market sell from the external boundary
    pub async fn place_manual_sell(&self, market: &str) -> crate::Result<String> {
        let held = self.exec.get_balance(base_currency(market)).await?;
        if held <= 0.0 {
            return Err("no holdings to sell".into());
        }

        let price = self.current_price_of(market).await?;
        let trade_id = self
            .store
            .open_trade(market)
            .await?
            .map(|t| t.id)
            .unwrap_or(0);

        if !self.router.try_sell(trade_id, market, price, "Manual").await {
            return Err("sell order failed".into());
        }

        self.cooldowns.lock().unwrap().record(market);
        self.clear_held_tag(market);
        self.publish_snapshot().await;
        Ok(format!("{market} manual sell executed"))
    }

    async fn current_price_of(&self, market: &str) -> crate::Result<f64> {
        if let Ok(Some(snapshot)) = self.table.get(market) {
            if snapshot.price > 0.0 {
                return Ok(snapshot.price);
            }
        }
        self.client.get_current_price(market).await
    }

    async fn refresh_targets(&self) -> crate::Result<()> {
        let snapshots = self.table.all().map_err(|e| e.to_string())?;
        let turnover: Vec<(String, f64)> = snapshots
            .into_iter()
            .map(|s| (s.market, s.turnover_24h))
            .collect();
        let picks = self.scanner.get_best_opportunities(20);
        let mut targets_map = select_targets(turnover, &picks, self.settings.min_turnover);

        // Bring the ledger in line with external holdings, then tag held rows
        if let Err(e) = self.reconciler.run().await {
            tracing::warn!(error = %e, "reconciliation failed");
        }
        let open_markets = self.store.open_markets().await.unwrap_or_default();
        for market in &open_markets {
            match targets_map.iter_mut().find(|entry| entry.0 == *market) {
                Some((_, category)) => {
                    if !category.contains("(held)") {
                        category.push_str(" (held)");
                    }
                }
                None => targets_map.push((market.clone(), "managed holding (held)".to_string())),
            }
        }

        // Display prices for targets the feed has not covered yet. The feed
        // remains the sole writer of the price table.
        let missing: Vec<String> = targets_map
            .iter()
            .map(|(m, _)| m.clone())
            .filter(|m| self.table.get(m).ok().flatten().is_none())
            .collect();
        if !missing.is_empty() {
            match self.client.get_current_prices(&missing).await {
                Ok(prices) => self.rest_prices.lock().unwrap().extend(prices),
                Err(e) => tracing::warn!(error = %e, "fallback price fetch failed"),
            }
        }

        let old_status = self.status.lock().unwrap().clone();
        let mut new_status = HashMap::new();
        for (market, category) in &targets_map {
            let mut entry = match self.scanner.get_analysis(market) {
                Some(analysis) => TickerStatus {
                    market: market.clone(),
                    category: category.clone(),
                    price: analysis.current_price,
                    score: analysis.score,
                    reasons: Vec::new(),
                    rsi: analysis.rsi,
                    mfi: analysis.mfi,
                    atr: analysis.atr,
                    target_price: analysis.target_price,
                    stop_loss_price: analysis.stop_loss_price,
                    signals: analysis.signals,
                    breakdown: analysis.breakdown,
                    buy_price: None,
                    profit_rate: None,
                },
                None => TickerStatus {
                    market: market.clone(),
                    category: category.clone(),
                    ..TickerStatus::default()
                },
            };

            if let Some(old) = old_status.get(market) {
                entry.reasons = old.reasons.clone();
                if entry.score == 0.0 {
                    entry.score = old.score;
                }
            }
            let live_price = self.display_price(market);
            if live_price > 0.0 {
                entry.price = live_price;
            }
            new_status.insert(market.clone(), entry);
        }

        let target_list: Vec<String> = targets_map.iter().map(|(m, _)| m.clone()).collect();
        tracing::info!(targets = target_list.len(), "target set refreshed");
        *self.targets.write().unwrap() = target_list;
        *self.status.lock().unwrap() = new_status;
        Ok(())
    }

    async fn cleanup(&self) {
        let active: HashSet<String> = self.targets.read().unwrap().iter().cloned().collect();
        self.cache.lock().await.evict_except(&active);
        self.cooldowns.lock().unwrap().prune();
    }

    async fn publish_snapshot(&self) {
        let open_trades = self.store.open_trades().await.unwrap_or_default();
        let holdings: HashMap<String, f64> = open_trades
            .iter()
            .map(|t: &TradeRow| (t.market.clone(), t.buy_price))
            .collect();

        let balances = match self.exec.get_all_balances().await {
            Ok(balances) => balances,
            Err(e) => {
                tracing::warn!(error = %e, "balance fetch failed for snapshot");
                Vec::new()
            }
        };

        let mut cash = 0.0;
        let mut quantity_by_market: HashMap<String, f64> = HashMap::new();
        for balance in &balances {
            if balance.currency == self.settings.quote_currency {
                cash = balance.total_quantity();
            } else {
                let market = format!("{}-{}", self.settings.quote_currency, balance.currency);
                quantity_by_market.insert(market, balance.total_quantity());
            }
        }

        let mut coin_value = 0.0;
        for market in holdings.keys() {
            let quantity = quantity_by_market.get(market).copied().unwrap_or(0.0);
            coin_value += quantity * self.display_price(market);
        }

        let mut items: Vec<TickerStatus> =
            self.status.lock().unwrap().values().cloned().collect();
        for item in &mut items {
            let price = self.display_price(&item.market);
            if price > 0.0 {
                item.price = price;
            }
            match holdings.get(&item.market) {
                Some(&buy_price) if buy_price > 0.0 && item.price > 0.0 => {
                    item.buy_price = Some(buy_price);
                    item.profit_rate = Some(profit_rate(buy_price, item.price));
                }
                _ => {
                    item.buy_price = None;
                    item.profit_rate = None;
                }
            }
        }
        items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(CmpOrdering::Equal));

        self.snapshot.publish(StatusSnapshot {
            items,
            summary: AccountSummary {
                cash_balance: cash,
                coin_value,
                total_assets: cash + coin_value,
            },
            active: self.is_active(),
            updated_at: Some(Utc::now()),
        });
    }

    fn display_price(&self, market: &str) -> f64 {
        if let Ok(Some(snapshot)) = self.table.get(market) {
            return snapshot.price;
        }
        self.rest_prices
            .lock()
            .unwrap()
            .get(market)
            .copied()
            .unwrap_or(0.0)
    }

    fn update_status(&self, market: &str, price: f64, result: &SignalResult) {
        let reasons = self.build_reasons(market, result);
        let mut status = self.status.lock().unwrap();
        if let Some(entry) = status.get_mut(market) {
            entry.price = price;
            entry.score = result.score;
            entry.reasons = reasons;
            entry.rsi = result.rsi;
            entry.mfi = result.mfi;
            entry.atr = result.atr;
            entry.target_price = result.target_price;
            entry.stop_loss_price = result.stop_loss_price;
            entry.signals = result.signals;
            entry.breakdown = result.breakdown.clone();
        }
    }

    fn build_reasons(&self, market: &str, result: &SignalResult) -> Vec<String> {
        let mut reasons: Vec<String> = result
            .signals
            .active()
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        if let Some(remaining) = self.cooldowns.lock().unwrap().remaining(market) {
            reasons.push(format!("cooldown({}m)", remaining.as_secs() / 60 + 1));
        }
        reasons
    }

    fn mark_held(&self, market: &str) {
        let mut status = self.status.lock().unwrap();
        if let Some(entry) = status.get_mut(market) {
            if !entry.category.contains("(held)") {
                entry.category.push_str(" (held)");
            }
        }
    }

    fn clear_held_tag(&self, market: &str) {
        let mut status = self.status.lock().unwrap();
        if let Some(entry) = status.get_mut(market) {
            entry.category = entry.category.replace(" (held)", "");
            if entry.category.is_empty() || entry.category == "managed holding" {
                entry.category = "watching".to_string();
            }
        }
    }
}
