// Ensemble scoring strategy
pub mod ensemble;

pub use ensemble::{
    overheat_filter, EnsembleStrategy, IndicatorSignals, SignalResult, Weights, MAX_SCORE,
};
