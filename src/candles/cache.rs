use crate::api::{CandleInterval, QuotationClient};
use crate::feed::PriceTable;
use crate::models::Candle;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

const REFRESH_THRESHOLD: Duration = Duration::from_secs(60);
const SERIES_LEN: u32 = 60;

/// Bars handed to signal evaluation.
///
/// When a live snapshot exists, the last close of both series carries the
/// live price; the overlay is applied to copies and never persisted.
#[derive(Debug, Clone)]
pub struct CachedBars {
    pub daily: Vec<Candle>,
    pub intraday: Vec<Candle>,
    pub current_price: f64,
    pub is_live: bool,
}

struct CacheEntry {
    daily: Vec<Candle>,
    intraday: Vec<Candle>,
    fetched_at: Instant,
}

/// Candle series cache with a 60s refresh threshold.
///
/// Owns the series wholesale; entries are replaced on refresh and dropped
/// when their market leaves the active target set. A failed refresh keeps
/// the stale entry.
pub struct CandleCache {
    client: QuotationClient,
    table: PriceTable,
    entries: HashMap<String, CacheEntry>,
}

impl CandleCache {
    pub fn new(client: QuotationClient, table: PriceTable) -> Self {
        Self {
            client,
            table,
            entries: HashMap::new(),
        }
    }

    /// Fetch (refreshing if stale) and overlay the live price.
    ///
    /// Returns None when no series could ever be fetched for the market.
    pub async fn fetch(&mut self, market: &str) -> Option<CachedBars> {
        let stale = self
            .entries
            .get(market)
            .map(|e| e.fetched_at.elapsed() >= REFRESH_THRESHOLD)
            .unwrap_or(true);

        if stale {
            if let Err(e) = self.refresh(market).await {
                tracing::warn!(market, error = %e, "candle refresh failed, using stale data");
            }
        }

        let entry = self.entries.get(market)?;
        let mut daily = entry.daily.clone();
        let mut intraday = entry.intraday.clone();

        let live = self.table.get(market).ok().flatten().filter(|s| s.price > 0.0);
        let (current_price, is_live) = match live {
            Some(snapshot) => {
                overlay_close(&mut daily, snapshot.price);
                overlay_close(&mut intraday, snapshot.price);
                (snapshot.price, true)
            }
            None => (daily.last()?.close, false),
        };

        Some(CachedBars {
            daily,
            intraday,
            current_price,
            is_live,
        })
    }

    async fn refresh(&mut self, market: &str) -> crate::Result<()> {
        let daily = self
            .client
            .get_ohlcv(market, CandleInterval::Day, SERIES_LEN)
            .await?;
        if daily.is_empty() {
            return Err(format!("empty daily series for {market}").into());
        }

        // Intraday fetch failure falls back to the daily series
        let intraday = match self
            .client
            .get_ohlcv(market, CandleInterval::Minute60, SERIES_LEN)
            .await
        {
            Ok(bars) if !bars.is_empty() => bars,
            _ => daily.clone(),
        };

        self.entries.insert(
            market.to_string(),
            CacheEntry {
                daily,
                intraday,
                fetched_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Drop cache entries for markets outside the active target set
    pub fn evict_except(&mut self, active: &HashSet<String>) {
        self.entries.retain(|market, _| active.contains(market));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    fn insert_for_test(&mut self, market: &str, daily: Vec<Candle>, intraday: Vec<Candle>) {
        self.entries.insert(
            market.to_string(),
            CacheEntry {
                daily,
                intraday,
                fetched_at: Instant::now(),
            },
        );
    }
}

fn overlay_close(bars: &mut [Candle], price: f64) {
    if let Some(last) = bars.last_mut() {
        last.close = price;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceSnapshot;
    use chrono::Utc;

    fn candles(market: &str, closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                market: market.to_string(),
                timestamp: Utc::now() + chrono::Duration::days(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 100.0,
            })
            .collect()
    }

    fn test_cache(table: PriceTable) -> CandleCache {
        // Unroutable base URL: any network fetch in these tests is a bug
        CandleCache::new(QuotationClient::with_base_url("http://127.0.0.1:1"), table)
    }

    #[test]
    fn test_overlay_replaces_only_last_close() {
        let mut bars = candles("KRW-BTC", &[100.0, 101.0, 102.0]);
        overlay_close(&mut bars, 999.0);

        assert_eq!(bars[0].close, 100.0);
        assert_eq!(bars[1].close, 101.0);
        assert_eq!(bars[2].close, 999.0);
        assert_eq!(bars[2].open, 102.0); // only the close is painted
    }

    #[tokio::test]
    async fn test_fetch_overlays_live_price() {
        let table = PriceTable::new();
        table
            .update(PriceSnapshot {
                market: "KRW-BTC".to_string(),
                price: 555.0,
                turnover_24h: 0.0,
                received_at: Utc::now(),
            })
            .unwrap();

        let mut cache = test_cache(table);
        cache.insert_for_test(
            "KRW-BTC",
            candles("KRW-BTC", &[100.0, 101.0]),
            candles("KRW-BTC", &[100.5, 101.5]),
        );

        let bars = cache.fetch("KRW-BTC").await.unwrap();
        assert!(bars.is_live);
        assert_eq!(bars.current_price, 555.0);
        assert_eq!(bars.daily.last().unwrap().close, 555.0);
        assert_eq!(bars.intraday.last().unwrap().close, 555.0);
    }

    #[tokio::test]
    async fn test_fetch_without_live_snapshot_uses_last_close() {
        let mut cache = test_cache(PriceTable::new());
        cache.insert_for_test(
            "KRW-ETH",
            candles("KRW-ETH", &[200.0, 210.0]),
            candles("KRW-ETH", &[205.0, 208.0]),
        );

        let bars = cache.fetch("KRW-ETH").await.unwrap();
        assert!(!bars.is_live);
        assert_eq!(bars.current_price, 210.0);
        assert_eq!(bars.daily.last().unwrap().close, 210.0);
    }

    #[tokio::test]
    async fn test_overlay_does_not_persist() {
        let table = PriceTable::new();
        table
            .update(PriceSnapshot {
                market: "KRW-BTC".to_string(),
                price: 555.0,
                turnover_24h: 0.0,
                received_at: Utc::now(),
            })
            .unwrap();

        let mut cache = test_cache(table.clone());
        cache.insert_for_test(
            "KRW-BTC",
            candles("KRW-BTC", &[100.0, 101.0]),
            candles("KRW-BTC", &[100.5, 101.5]),
        );

        let _ = cache.fetch("KRW-BTC").await.unwrap();
        // New live price: the overlay must start from the stored close again
        table
            .update(PriceSnapshot {
                market: "KRW-BTC".to_string(),
                price: 777.0,
                turnover_24h: 0.0,
                received_at: Utc::now(),
            })
            .unwrap();

        let bars = cache.fetch("KRW-BTC").await.unwrap();
        assert_eq!(bars.daily.last().unwrap().close, 777.0);
        assert_eq!(bars.daily[0].close, 100.0);
    }

    #[tokio::test]
    async fn test_eviction_keeps_active_set() {
        let mut cache = test_cache(PriceTable::new());
        cache.insert_for_test("KRW-BTC", candles("KRW-BTC", &[1.0]), candles("KRW-BTC", &[1.0]));
        cache.insert_for_test("KRW-ETH", candles("KRW-ETH", &[1.0]), candles("KRW-ETH", &[1.0]));

        let active: HashSet<String> = ["KRW-BTC".to_string()].into_iter().collect();
        cache.evict_except(&active);

        assert_eq!(cache.len(), 1);
        assert!(cache.fetch("KRW-BTC").await.is_some());
    }

}
