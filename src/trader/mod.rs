// Control loop and ledger upkeep
pub mod dispatch;
pub mod engine;
pub mod reconcile;
pub mod status;

pub use dispatch::OrderRouter;
pub use engine::TradeEngine;
pub use reconcile::LedgerReconciler;
pub use status::{AccountSummary, SnapshotHandle, StatusSnapshot, TickerStatus};
