use crate::models::PriceSnapshot;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Process-wide table of the latest tick per market.
///
/// Single-writer discipline: only the feed collector calls `update`; every
/// other component reads copies. Last write wins per key, reads are
/// eventually consistent with staleness bounded by feed latency.
#[derive(Clone, Default)]
pub struct PriceTable {
    data: Arc<RwLock<HashMap<String, PriceSnapshot>>>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot for a market. Writer: feed collector only.
    pub fn update(&self, snapshot: PriceSnapshot) -> Result<(), String> {
        let mut data = self.data.write().map_err(|e| e.to_string())?;
        data.insert(snapshot.market.clone(), snapshot);
        Ok(())
    }

    /// Latest snapshot for a market, if any tick has arrived
    pub fn get(&self, market: &str) -> Result<Option<PriceSnapshot>, String> {
        let data = self.data.read().map_err(|e| e.to_string())?;
        Ok(data.get(market).cloned())
    }

    /// Number of markets with at least one tick
    pub fn len(&self) -> Result<usize, String> {
        let data = self.data.read().map_err(|e| e.to_string())?;
        Ok(data.len())
    }

    pub fn is_empty(&self) -> Result<bool, String> {
        Ok(self.len()? == 0)
    }

    /// Copy of every snapshot, for target-set ranking
    pub fn all(&self) -> Result<Vec<PriceSnapshot>, String> {
        let data = self.data.read().map_err(|e| e.to_string())?;
        Ok(data.values().cloned().collect())
    }
}
