use super::PriceTable;
use crate::models::PriceSnapshot;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};

const RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("stream closed by server")]
    StreamClosed,
}

/// Streaming ticker ingestion.
///
/// Subscribes to the exchange push feed for the configured market set and
/// writes each tick into the shared price table. Any connection or receive
/// error tears the stream down and reconnects after a fixed 3s pause,
/// forever; malformed messages are dropped without comment. The collector is
/// the sole writer of the price table and runs independently of the trading
/// loop.
pub struct TickerCollector {
    url: String,
    markets: Vec<String>,
    table: PriceTable,
}

impl TickerCollector {
    pub fn new(url: String, markets: Vec<String>, table: PriceTable) -> Self {
        Self {
            url,
            markets,
            table,
        }
    }

    /// Drive the feed until the stop flag flips. Intended to be spawned.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        tracing::info!(markets = self.markets.len(), "ticker collector starting");

        while !*stop.borrow() {
            match self.connect_and_stream(&mut stop).await {
                Ok(()) => break, // stop requested
                Err(e) => {
                    tracing::warn!(error = %e, "ticker stream dropped, reconnecting in 3s");
                    tokio::select! {
                        _ = sleep(RECONNECT_DELAY) => {}
                        _ = stop.changed() => {}
                    }
                }
            }
        }

        tracing::info!("ticker collector stopped");
    }

    async fn connect_and_stream(
        &self,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<(), FeedError> {
        let (ws_stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe = serde_json::json!([
            { "ticket": "coinpilot" },
            { "type": "ticker", "codes": self.markets, "isOnlyRealtime": true }
        ]);
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| FeedError::SubscribeFailed(e.to_string()))?;

        tracing::info!(markets = self.markets.len(), "ticker stream subscribed");

        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Binary(data))) => self.ingest(&data),
                    Some(Ok(Message::Text(text))) => self.ingest(text.as_bytes()),
                    Some(Ok(Message::Ping(data))) => {
                        write
                            .send(Message::Pong(data))
                            .await
                            .map_err(|e| FeedError::Receive(e.to_string()))?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Err(FeedError::StreamClosed),
                    Some(Err(e)) => return Err(FeedError::Receive(e.to_string())),
                    _ => {}
                },
                _ = stop.changed() => {
                    if *stop.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn ingest(&self, payload: &[u8]) {
        if let Some(snapshot) = parse_ticker(payload) {
            if let Err(e) = self.table.update(snapshot) {
                tracing::warn!(error = %e, "price table write failed");
            }
        }
    }
}

/// Decode one push-feed ticker event. Returns None on anything malformed.
pub(crate) fn parse_ticker(payload: &[u8]) -> Option<PriceSnapshot> {
    #[derive(Deserialize)]
    struct TickerEvent {
        code: String,
        trade_price: f64,
        acc_trade_price_24h: f64,
    }

    let event: TickerEvent = serde_json::from_slice(payload).ok()?;
    Some(PriceSnapshot {
        market: event.code,
        price: event.trade_price,
        turnover_24h: event.acc_trade_price_24h,
        received_at: Utc::now(),
    })
}
