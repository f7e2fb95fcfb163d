// Historical replay and the daily full-market scan
pub mod scanner;
pub mod simulator;

pub use scanner::{AnalysisEntry, DailyScanner, ScanFailure};
pub use simulator::{simulate, simulate_with, BacktestSummary, DayCall};
