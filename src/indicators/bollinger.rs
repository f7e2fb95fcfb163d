use super::moving_average::calculate_sma;

/// Bollinger band entry/exit signal (20-period, 2-sigma by convention)
///
/// +1: close within `threshold` of the lower band while rebounding (above
/// the previous close and at or above the open). -1: close at or above the
/// upper band. 0 otherwise.
pub fn bollinger_signal(
    closes: &[f64],
    opens: &[f64],
    period: usize,
    k: f64,
    threshold: f64,
) -> i8 {
    if closes.len() < period.max(2) || opens.len() != closes.len() || period < 2 {
        return 0;
    }

    let ma = match calculate_sma(closes, period) {
        Some(v) => v,
        None => return 0,
    };

    // Sample standard deviation over the trailing window
    let window = &closes[closes.len() - period..];
    let variance =
        window.iter().map(|v| (v - ma).powi(2)).sum::<f64>() / (period as f64 - 1.0);
    let std = variance.sqrt();

    let upper = ma + std * k;
    let lower = ma - std * k;

    let curr = closes[closes.len() - 1];
    let prev = closes[closes.len() - 2];
    let open = opens[opens.len() - 1];

    let near_lower = curr <= lower * threshold;
    let rebounding = curr > prev && curr >= open;

    if near_lower && rebounding {
        1
    } else if curr >= upper {
        -1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_band_rebound() {
        // Quiet market, a crash through the lower band, then a bullish tick up
        let mut closes = vec![100.0; 18];
        closes.push(90.0);
        closes.push(91.0); // above prev close of 90
        let mut opens = closes.clone();
        opens[19] = 90.5; // close above open

        assert_eq!(bollinger_signal(&closes, &opens, 20, 2.0, 1.02), 1);
    }

    #[test]
    fn test_upper_band_touch() {
        let mut closes = vec![100.0; 19];
        // Need some dispersion so the band has width
        closes[10] = 102.0;
        closes[12] = 98.0;
        closes.push(120.0);
        let opens = closes.clone();

        assert_eq!(bollinger_signal(&closes, &opens, 20, 2.0, 1.02), -1);
    }

    #[test]
    fn test_mid_band_is_neutral() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + ((i % 4) as f64 - 1.5)).collect();
        let opens = closes.clone();
        assert_eq!(bollinger_signal(&closes, &opens, 20, 2.0, 1.02), 0);
    }

    #[test]
    fn test_short_series_is_neutral() {
        let closes = vec![100.0, 101.0];
        let opens = closes.clone();
        assert_eq!(bollinger_signal(&closes, &opens, 20, 2.0, 1.02), 0);
    }
}
