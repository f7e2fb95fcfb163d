use crate::models::Candle;

/// Cumulative VWAP position signal
///
/// +1 when the last close sits above the volume-weighted average price of
/// the whole series, 0 otherwise (including zero cumulative volume).
pub fn vwap_signal(candles: &[Candle]) -> i8 {
    if candles.is_empty() {
        return 0;
    }

    let mut cum_volume = 0.0;
    let mut cum_flow = 0.0;
    for c in candles {
        let typical = (c.high + c.low + c.close) / 3.0;
        cum_volume += c.volume;
        cum_flow += typical * c.volume;
    }

    if cum_volume <= 0.0 {
        return 0;
    }

    let vwap = cum_flow / cum_volume;
    let close = candles[candles.len() - 1].close;

    if close > vwap {
        1
    } else {
        0
    }
}
