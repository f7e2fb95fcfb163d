use super::moving_average::calculate_sma;
use crate::models::Candle;

/// Volume-expansion signal
///
/// +1 when the last bar's volume exceeds `multiplier` times its `period`
/// average and the bar is bullish (close above open).
pub fn volume_signal(candles: &[Candle], period: usize, multiplier: f64) -> i8 {
    if candles.len() < period {
        return 0;
    }

    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    let avg = match calculate_sma(&volumes, period) {
        Some(v) => v,
        None => return 0,
    };

    let last = &candles[candles.len() - 1];
    let explosive = last.volume > avg * multiplier;
    let bullish = last.close > last.open;

    if explosive && bullish {
        1
    } else {
        0
    }
}
