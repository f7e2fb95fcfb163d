use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar for one market over a fixed period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub market: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Latest tick for a market, written only by the feed collector.
///
/// Readers get eventually-consistent copies; staleness is bounded by feed
/// latency plus the 3s reconnect window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub market: String,
    pub price: f64,
    pub turnover_24h: f64,
    pub received_at: DateTime<Utc>,
}

/// One currency line of the external account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    pub currency: String,
    pub balance: f64,
    pub locked: f64,
    pub avg_buy_price: f64,
}

impl AccountBalance {
    /// Available plus locked quantity
    pub fn total_quantity(&self) -> f64 {
        self.balance + self.locked
    }

    /// Holding value at the reported average cost
    pub fn cost_value(&self) -> f64 {
        self.total_quantity() * self.avg_buy_price
    }
}

/// Confirmation returned by the execution client for a filled market order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub market: String,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Closed,
}

/// Ledger row for one position. Identity is the persisted row id;
/// a row transitions open -> closed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRow {
    pub id: i64,
    pub market: String,
    pub buy_price: f64,
    pub buy_amount: f64,
    pub buy_time: DateTime<Utc>,
    pub status: TradeStatus,
    pub sell_price: Option<f64>,
    pub sell_time: Option<DateTime<Utc>>,
    pub profit_rate: Option<f64>,
    pub strategy_name: String,
    pub sell_reason: Option<String>,
}

impl TradeRow {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }
}

/// Percentage return of `price` against `buy_price`
pub fn profit_rate(buy_price: f64, price: f64) -> f64 {
    if buy_price <= 0.0 {
        return 0.0;
    }
    ((price - buy_price) / buy_price) * 100.0
}
