// Core modules
pub mod api;
pub mod backtest;
pub mod candles;
pub mod config;
pub mod db;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod strategy;
pub mod trader;

// Re-export commonly used types
pub use models::*;
pub use strategy::EnsembleStrategy;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
