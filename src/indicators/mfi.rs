use super::moving_average::ewma_last;
use crate::models::Candle;

/// Calculate Money Flow Index (MFI)
///
/// Typical-price money flow is split into positive and negative streams by
/// the direction of the typical-price change, then each stream is smoothed
/// with alpha = 1/period. Flat flow (both streams zero) yields 50.
pub fn calculate_mfi(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < period + 1 || period == 0 {
        return None;
    }

    let typical: Vec<f64> = candles
        .iter()
        .map(|c| (c.high + c.low + c.close) / 3.0)
        .collect();

    let mut positive = Vec::with_capacity(candles.len() - 1);
    let mut negative = Vec::with_capacity(candles.len() - 1);

    for i in 1..candles.len() {
        let flow = typical[i] * candles[i].volume;
        let delta = typical[i] - typical[i - 1];
        if delta > 0.0 {
            positive.push(flow);
            negative.push(0.0);
        } else if delta < 0.0 {
            positive.push(0.0);
            negative.push(flow);
        } else {
            positive.push(0.0);
            negative.push(0.0);
        }
    }

    let alpha = 1.0 / period as f64;
    let pos = ewma_last(&positive, alpha)?;
    let neg = ewma_last(&negative, alpha)?;

    if pos == 0.0 && neg == 0.0 {
        return Some(50.0);
    }
    if neg == 0.0 {
        return Some(100.0);
    }

    let ratio = pos / neg;
    Some(100.0 - (100.0 / (1.0 + ratio)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_candles(bars: &[(f64, f64, f64, f64, f64)]) -> Vec<Candle> {
        bars.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close, volume))| Candle {
                market: "KRW-TEST".to_string(),
                timestamp: Utc::now() + chrono::Duration::hours(i as i64),
                open,
                high,
                low,
                close,
                volume,
            })
            .collect()
    }

    #[test]
    fn test_mfi_rising_flow_is_high() {
        let bars: Vec<(f64, f64, f64, f64, f64)> = (0..20)
            .map(|i| {
                let p = 100.0 + i as f64;
                (p, p + 1.0, p - 1.0, p + 0.5, 1000.0)
            })
            .collect();

        let mfi = calculate_mfi(&create_test_candles(&bars), 14).unwrap();
        assert!(mfi > 90.0, "all-positive flow should push MFI high, got {mfi}");
    }

    #[test]
    fn test_mfi_flat_series_is_neutral() {
        let bars = vec![(100.0, 101.0, 99.0, 100.0, 1000.0); 20];
        assert_eq!(calculate_mfi(&create_test_candles(&bars), 14), Some(50.0));
    }

    #[test]
    fn test_mfi_zero_volume_is_neutral() {
        let bars: Vec<(f64, f64, f64, f64, f64)> = (0..20)
            .map(|i| {
                let p = 100.0 + (i % 3) as f64;
                (p, p + 1.0, p - 1.0, p, 0.0)
            })
            .collect();

        assert_eq!(calculate_mfi(&create_test_candles(&bars), 14), Some(50.0));
    }

    #[test]
    fn test_mfi_in_range() {
        let bars: Vec<(f64, f64, f64, f64, f64)> = (0..30)
            .map(|i| {
                let p = 100.0 + ((i * 7) % 11) as f64 - 5.0;
                (p, p + 2.0, p - 2.0, p + 1.0, 500.0 + (i * 37 % 100) as f64)
            })
            .collect();

        let mfi = calculate_mfi(&create_test_candles(&bars), 14).unwrap();
        assert!((0.0..=100.0).contains(&mfi));
    }

    #[test]
    fn test_mfi_insufficient_data() {
        let bars = vec![(100.0, 101.0, 99.0, 100.0, 1000.0); 5];
        assert!(calculate_mfi(&create_test_candles(&bars), 14).is_none());
    }
}
