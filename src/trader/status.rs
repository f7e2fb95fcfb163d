use crate::strategy::IndicatorSignals;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};

/// UI-facing view of one target market
#[derive(Debug, Clone, Serialize)]
pub struct TickerStatus {
    pub market: String,
    pub category: String,
    pub price: f64,
    pub score: f64,
    pub reasons: Vec<String>,
    pub rsi: f64,
    pub mfi: f64,
    pub atr: f64,
    pub target_price: f64,
    pub stop_loss_price: f64,
    pub signals: IndicatorSignals,
    pub breakdown: Vec<String>,
    pub buy_price: Option<f64>,
    pub profit_rate: Option<f64>,
}

impl Default for TickerStatus {
    fn default() -> Self {
        Self {
            market: String::new(),
            category: "watching".to_string(),
            price: 0.0,
            score: 0.0,
            reasons: Vec::new(),
            rsi: 50.0,
            mfi: 50.0,
            atr: 0.0,
            target_price: 0.0,
            stop_loss_price: 0.0,
            signals: IndicatorSignals::default(),
            breakdown: Vec::new(),
            buy_price: None,
            profit_rate: None,
        }
    }
}

/// Account totals shown alongside the per-market list
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountSummary {
    pub cash_balance: f64,
    pub coin_value: f64,
    pub total_assets: f64,
}

/// Snapshot published once per tick for the HTTP boundary
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub items: Vec<TickerStatus>,
    pub summary: AccountSummary,
    pub active: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Cloneable handle over the latest published snapshot
#[derive(Clone, Default)]
pub struct SnapshotHandle {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl SnapshotHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: StatusSnapshot) {
        if let Ok(mut current) = self.inner.write() {
            *current = snapshot;
        }
    }

    pub fn read(&self) -> StatusSnapshot {
        self.inner
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}
