use super::moving_average::ewma_series;

fn span_alpha(span: f64) -> f64 {
    2.0 / (span + 1.0)
}

/// MACD(12, 26, 9) position signal, diagnostic only
///
/// +1 when the MACD line is above its signal line, -1 below, 0 otherwise.
pub fn macd_signal(closes: &[f64]) -> i8 {
    if closes.len() < 2 {
        return 0;
    }

    let fast = ewma_series(closes, span_alpha(12.0));
    let slow = ewma_series(closes, span_alpha(26.0));
    let macd_line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal_line = ewma_series(&macd_line, span_alpha(9.0));

    let curr = macd_line[macd_line.len() - 1];
    let sig = signal_line[signal_line.len() - 1];

    if curr > sig {
        1
    } else if curr < sig {
        -1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uptrend_is_positive() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + 2.0 * i as f64).collect();
        assert_eq!(macd_signal(&closes), 1);
    }

    #[test]
    fn test_downtrend_is_negative() {
        let closes: Vec<f64> = (0..40).map(|i| 180.0 - 2.0 * i as f64).collect();
        assert_eq!(macd_signal(&closes), -1);
    }

    #[test]
    fn test_flat_is_neutral() {
        let closes = vec![100.0; 40];
        assert_eq!(macd_signal(&closes), 0);
    }

    #[test]
    fn test_short_series_is_neutral() {
        assert_eq!(macd_signal(&[100.0]), 0);
    }
}
