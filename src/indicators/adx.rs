/// Average Directional Index (ADX) - trend strength with direction
///
/// ADX >= 20 marks a trending market; +DI > -DI marks the trend as up.
/// True range and both directional-movement streams are smoothed with an
/// exponential moving average (alpha = 1/period), as is the DX series that
/// becomes ADX.
use super::moving_average::ewma_series;
use crate::models::Candle;

/// Calculate ADX, +DI and -DI
///
/// Returns `(adx, plus_di, minus_di)`, or None when fewer than `2 * period`
/// candles are available.
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<(f64, f64, f64)> {
    if period == 0 || candles.len() < period * 2 {
        return None;
    }

    let mut true_ranges = Vec::with_capacity(candles.len() - 1);
    let mut plus_dms = Vec::with_capacity(candles.len() - 1);
    let mut minus_dms = Vec::with_capacity(candles.len() - 1);

    for w in candles.windows(2) {
        let (prev, curr) = (&w[0], &w[1]);

        let tr = (curr.high - curr.low)
            .max((curr.high - prev.close).abs())
            .max((curr.low - prev.close).abs());
        true_ranges.push(tr);

        let up_move = curr.high - prev.high;
        let down_move = prev.low - curr.low;

        plus_dms.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dms.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
    }

    let alpha = 1.0 / period as f64;
    let tr_smooth = ewma_series(&true_ranges, alpha);
    let plus_smooth = ewma_series(&plus_dms, alpha);
    let minus_smooth = ewma_series(&minus_dms, alpha);

    let mut dx_series = Vec::with_capacity(tr_smooth.len());
    let mut plus_di = 0.0;
    let mut minus_di = 0.0;

    for i in 0..tr_smooth.len() {
        (plus_di, minus_di) = if tr_smooth[i] > 0.0 {
            (
                100.0 * plus_smooth[i] / tr_smooth[i],
                100.0 * minus_smooth[i] / tr_smooth[i],
            )
        } else {
            (0.0, 0.0)
        };

        let di_sum = plus_di + minus_di;
        dx_series.push(if di_sum > 0.0 {
            100.0 * (plus_di - minus_di).abs() / di_sum
        } else {
            0.0
        });
    }

    let adx = *ewma_series(&dx_series, alpha).last()?;
    Some((adx, plus_di, minus_di))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_candles(bars: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        bars.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                market: "KRW-TEST".to_string(),
                timestamp: Utc::now() + chrono::Duration::hours(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_adx_strong_uptrend() {
        let bars: Vec<(f64, f64, f64, f64)> = (0..30)
            .map(|i| {
                let base = 100.0 + 3.0 * i as f64;
                (base, base + 2.0, base - 1.0, base + 1.5)
            })
            .collect();

        let (adx, plus_di, minus_di) = calculate_adx(&create_test_candles(&bars), 14).unwrap();
        assert!(plus_di > minus_di, "+DI should dominate in an uptrend");
        assert!(adx >= 20.0, "steady uptrend should trend strongly, got {adx}");
    }

    #[test]
    fn test_adx_choppy_market_is_weak() {
        let bars: Vec<(f64, f64, f64, f64)> = (0..30)
            .map(|i| {
                if i % 2 == 0 {
                    (100.0, 103.0, 97.0, 99.0)
                } else {
                    (99.0, 103.0, 97.0, 101.0)
                }
            })
            .collect();

        let (adx, _, _) = calculate_adx(&create_test_candles(&bars), 14).unwrap();
        assert!(adx < 20.0, "alternating bars should not trend, got {adx}");
    }

    #[test]
    fn test_adx_flat_series_is_zero() {
        // Identical bars: zero range, zero movement, no division blowups
        let bars = vec![(100.0, 100.0, 100.0, 100.0); 30];
        let (adx, plus_di, minus_di) = calculate_adx(&create_test_candles(&bars), 14).unwrap();
        assert_eq!((adx, plus_di, minus_di), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_adx_insufficient_data() {
        let bars = vec![(100.0, 102.0, 99.0, 101.0); 20];
        assert!(calculate_adx(&create_test_candles(&bars), 14).is_none());
    }
}
