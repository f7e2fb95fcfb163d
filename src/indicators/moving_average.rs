/// Calculate Simple Moving Average over the most recent `period` values
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period || period == 0 {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Exponentially weighted mean series with smoothing factor `alpha`,
/// seeded with the first value
pub fn ewma_series(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut current = match values.first() {
        Some(&v) => v,
        None => return out,
    };
    out.push(current);

    for &v in &values[1..] {
        current = current + alpha * (v - current);
        out.push(current);
    }

    out
}

/// Final value of the exponentially weighted mean
pub fn ewma_last(values: &[f64], alpha: f64) -> Option<f64> {
    values
        .iter()
        .copied()
        .reduce(|acc, v| acc + alpha * (v - acc))
}
