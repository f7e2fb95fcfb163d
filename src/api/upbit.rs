use crate::models::Candle;
use crate::Result;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::time::{sleep, Duration};

const UPBIT_API_BASE: &str = "https://api.upbit.com/v1";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;

/// Candle granularity supported by the historical endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleInterval {
    Day,
    Minute60,
}

impl CandleInterval {
    fn path(self) -> &'static str {
        match self {
            CandleInterval::Day => "candles/days",
            CandleInterval::Minute60 => "candles/minutes/60",
        }
    }
}

/// Public quotation client (market list, candles, spot prices).
///
/// Retries transient failures with doubling backoff; callers treat a final
/// error as "skip this market for the cycle".
#[derive(Clone)]
pub struct QuotationClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MarketInfo {
    market: String,
}

#[derive(Debug, Deserialize)]
struct CandlePayload {
    market: String,
    candle_date_time_utc: String,
    opening_price: f64,
    high_price: f64,
    low_price: f64,
    trade_price: f64,
    candle_acc_trade_volume: f64,
}

#[derive(Debug, Deserialize)]
struct TickerPayload {
    market: String,
    trade_price: f64,
}

impl Default for QuotationClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotationClient {
    pub fn new() -> Self {
        Self::with_base_url(UPBIT_API_BASE)
    }

    /// Override the API base, used by tests against a local mock server
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// All tradable markets quoted in `fiat` (e.g. "KRW" -> "KRW-BTC", ...)
    pub async fn get_markets(&self, fiat: &str) -> Result<Vec<String>> {
        let url = format!("{}/market/all", self.base_url);
        let infos: Vec<MarketInfo> = send_json(&self.client, &url).await?;

        let prefix = format!("{fiat}-");
        Ok(infos
            .into_iter()
            .map(|m| m.market)
            .filter(|m| m.starts_with(&prefix))
            .collect())
    }

    /// Historical candles in ascending time order, at most `count` bars.
    /// Retries transient failures before giving up.
    pub async fn get_ohlcv(
        &self,
        market: &str,
        interval: CandleInterval,
        count: u32,
    ) -> Result<Vec<Candle>> {
        let mut last_error: Option<Box<dyn std::error::Error + Send + Sync>> = None;

        for attempt in 1..=MAX_RETRIES {
            match self.fetch_ohlcv_once(market, interval, count).await {
                Ok(candles) => return Ok(candles),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < MAX_RETRIES {
                        let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
                        tracing::warn!(
                            market,
                            attempt,
                            backoff_ms,
                            "candle fetch failed, retrying"
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| "all retry attempts failed".into()))
    }

    async fn fetch_ohlcv_once(
        &self,
        market: &str,
        interval: CandleInterval,
        count: u32,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/{}?market={}&count={}",
            self.base_url,
            interval.path(),
            market,
            count
        );
        let payloads: Vec<CandlePayload> = send_json(&self.client, &url).await?;

        // The exchange returns newest-first
        let mut candles = payloads
            .into_iter()
            .map(Candle::try_from)
            .collect::<Result<Vec<_>>>()?;
        candles.reverse();
        Ok(candles)
    }

    /// Latest trade price for one market
    pub async fn get_current_price(&self, market: &str) -> Result<f64> {
        let prices = self.get_current_prices(&[market.to_string()]).await?;
        prices
            .get(market)
            .copied()
            .ok_or_else(|| format!("no ticker for {market}").into())
    }

    /// Latest trade prices for a batch of markets
    pub async fn get_current_prices(&self, markets: &[String]) -> Result<HashMap<String, f64>> {
        if markets.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/ticker?markets={}", self.base_url, markets.join(","));
        let payloads: Vec<TickerPayload> = send_json(&self.client, &url).await?;

        Ok(payloads
            .into_iter()
            .map(|t| (t.market, t.trade_price))
            .collect())
    }
}

impl TryFrom<CandlePayload> for Candle {
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn try_from(p: CandlePayload) -> Result<Self> {
        let timestamp = NaiveDateTime::parse_from_str(&p.candle_date_time_utc, "%Y-%m-%dT%H:%M:%S")
            .map_err(|e| format!("bad candle timestamp {}: {e}", p.candle_date_time_utc))?
            .and_utc();

        Ok(Candle {
            market: p.market,
            timestamp,
            open: p.opening_price,
            high: p.high_price,
            low: p.low_price,
            close: p.trade_price,
            volume: p.candle_acc_trade_volume,
        })
    }
}

async fn send_json<T: serde::de::DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_CANDLES: &str = r#"[
        {
            "market": "KRW-BTC",
            "candle_date_time_utc": "2025-06-02T00:00:00",
            "candle_date_time_kst": "2025-06-02T09:00:00",
            "opening_price": 101.0,
            "high_price": 103.0,
            "low_price": 100.0,
            "trade_price": 102.0,
            "timestamp": 1748822400000,
            "candle_acc_trade_price": 1000000.0,
            "candle_acc_trade_volume": 55.5
        },
        {
            "market": "KRW-BTC",
            "candle_date_time_utc": "2025-06-01T00:00:00",
            "candle_date_time_kst": "2025-06-01T09:00:00",
            "opening_price": 99.0,
            "high_price": 101.5,
            "low_price": 98.0,
            "trade_price": 101.0,
            "timestamp": 1748736000000,
            "candle_acc_trade_price": 900000.0,
            "candle_acc_trade_volume": 44.4
        }
    ]"#;

    #[tokio::test]
    async fn test_ohlcv_reversed_to_ascending() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/candles/days?market=KRW-BTC&count=2")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(DAY_CANDLES)
            .create_async()
            .await;

        let client = QuotationClient::with_base_url(server.url());
        let candles = client
            .get_ohlcv("KRW-BTC", CandleInterval::Day, 2)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candles.len(), 2);
        assert!(candles[0].timestamp < candles[1].timestamp);
        assert_eq!(candles[0].close, 101.0);
        assert_eq!(candles[1].volume, 55.5);
    }

    #[tokio::test]
    async fn test_markets_filtered_by_fiat() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/market/all")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {"market": "KRW-BTC", "korean_name": "x", "english_name": "Bitcoin"},
                    {"market": "BTC-ETH", "korean_name": "x", "english_name": "Ethereum"},
                    {"market": "KRW-XRP", "korean_name": "x", "english_name": "Ripple"}
                ]"#,
            )
            .create_async()
            .await;

        let client = QuotationClient::with_base_url(server.url());
        let markets = client.get_markets("KRW").await.unwrap();
        assert_eq!(markets, vec!["KRW-BTC", "KRW-XRP"]);
    }

    #[tokio::test]
    async fn test_current_prices_batch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ticker?markets=KRW-BTC,KRW-ETH")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {"market": "KRW-BTC", "trade_price": 85000000.0},
                    {"market": "KRW-ETH", "trade_price": 4200000.0}
                ]"#,
            )
            .create_async()
            .await;

        let client = QuotationClient::with_base_url(server.url());
        let prices = client
            .get_current_prices(&["KRW-BTC".to_string(), "KRW-ETH".to_string()])
            .await
            .unwrap();

        assert_eq!(prices["KRW-BTC"], 85_000_000.0);
        assert_eq!(prices["KRW-ETH"], 4_200_000.0);
    }
}
