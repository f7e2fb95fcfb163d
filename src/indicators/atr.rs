use crate::models::Candle;

/// Average True Range: plain rolling mean of the true range over `period`
///
/// True Range is the greatest of high-low, |high - prev close| and
/// |low - prev close|.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < period + 1 || period == 0 {
        return None;
    }

    let mut true_ranges = Vec::with_capacity(candles.len() - 1);
    for w in candles.windows(2) {
        let (prev, curr) = (&w[0], &w[1]);
        let tr = (curr.high - curr.low)
            .max((curr.high - prev.close).abs())
            .max((curr.low - prev.close).abs());
        true_ranges.push(tr);
    }

    let sum: f64 = true_ranges.iter().rev().take(period).sum();
    Some(sum / period as f64)
}
