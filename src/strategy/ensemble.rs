use crate::indicators::{
    bollinger_signal, calculate_adx, calculate_atr, calculate_mfi, calculate_rsi, calculate_sma,
    macd_signal, volume_signal, vwap_signal,
};
use crate::models::Candle;
use serde::{Deserialize, Serialize};

/// Sum of all weights; the composite score never exceeds this.
pub const MAX_SCORE: f64 = 12.0;

const MIN_BARS: usize = 30;

/// Weight of each indicator group in the composite score
#[derive(Debug, Clone)]
pub struct Weights {
    /// Close above its 20-day moving average
    pub trend: f64,
    /// ADX trend strength with +DI dominance
    pub adx: f64,
    /// Volume expansion on a bullish bar
    pub volume: f64,
    /// Close above cumulative VWAP
    pub vwap: f64,
    /// RSI/MFI reversal votes, averaged
    pub oscillator_group: f64,
    /// Lower Bollinger band rebound
    pub bollinger: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            trend: 3.0,
            adx: 1.5,
            volume: 1.0,
            vwap: 1.5,
            oscillator_group: 3.0,
            bollinger: 2.0,
        }
    }
}

/// Per-indicator vote (-1 / 0 / +1), kept for inspection and ranking labels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSignals {
    pub trend: i8,
    pub adx: i8,
    pub volume: i8,
    pub vwap: i8,
    pub bollinger: i8,
    pub macd: i8,
    pub rsi: i8,
    pub mfi: i8,
}

impl IndicatorSignals {
    /// Names of the indicators currently voting +1
    pub fn active(&self) -> Vec<&'static str> {
        let pairs = [
            ("trend", self.trend),
            ("adx", self.adx),
            ("volume", self.volume),
            ("vwap", self.vwap),
            ("bollinger", self.bollinger),
            ("macd", self.macd),
            ("rsi", self.rsi),
            ("mfi", self.mfi),
        ];
        pairs
            .into_iter()
            .filter(|(_, v)| *v == 1)
            .map(|(name, _)| name)
            .collect()
    }
}

/// Outcome of one ensemble evaluation; immutable value, created fresh per call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalResult {
    pub score: f64,
    pub should_buy: bool,
    pub current_price: f64,
    pub target_price: f64,
    pub stop_loss_price: f64,
    pub atr: f64,
    pub rsi: f64,
    pub mfi: f64,
    pub signals: IndicatorSignals,
    /// Ordered scoring log; populated only in debug evaluations
    pub breakdown: Vec<String>,
}

/// Entry filter shared by the trading engine and the backtest simulator.
///
/// Blocks overheated candidates (RSI >= 70 or MFI >= 80) and the
/// rising-price/no-inflow fakeout pattern (RSI >= 60 with MFI < 40).
pub fn overheat_filter(rsi: f64, mfi: f64) -> bool {
    rsi >= 70.0 || mfi >= 80.0 || (rsi >= 60.0 && mfi < 40.0)
}

/// Composite buy/sell scorer over a daily and an intraday candle series.
///
/// Trend, trend strength and volume read the daily series; oscillators,
/// VWAP, Bollinger and ATR read the intraday series. Deterministic: same
/// bars in, same score out.
#[derive(Debug, Clone)]
pub struct EnsembleStrategy {
    weights: Weights,
    buy_threshold: f64,
    exit_threshold: f64,
}

impl Default for EnsembleStrategy {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            buy_threshold: 7.0,
            exit_threshold: 3.5,
        }
    }
}

impl EnsembleStrategy {
    pub fn new(weights: Weights, buy_threshold: f64, exit_threshold: f64) -> Self {
        Self {
            weights,
            buy_threshold,
            exit_threshold,
        }
    }

    /// Score at or above which a candidate qualifies for entry
    pub fn buy_threshold(&self) -> f64 {
        self.buy_threshold
    }

    /// Score below which a held position is exited
    pub fn exit_threshold(&self) -> f64 {
        self.exit_threshold
    }

    /// Evaluate the ensemble over `daily` and `intraday` bars.
    ///
    /// Returns None when fewer than 30 daily bars are available. An intraday
    /// series shorter than 30 bars falls back to the daily series. `debug`
    /// fills the breakdown log and never changes the score.
    pub fn evaluate(
        &self,
        daily: &[Candle],
        intraday: &[Candle],
        debug: bool,
    ) -> Option<SignalResult> {
        if daily.len() < MIN_BARS {
            return None;
        }
        let intraday = if intraday.len() < MIN_BARS {
            daily
        } else {
            intraday
        };

        // Daily: trend, trend strength, volume
        let day_closes: Vec<f64> = daily.iter().map(|c| c.close).collect();
        let ma20 = calculate_sma(&day_closes, 20)?;
        let current_price = *day_closes.last()?;
        let is_bull = current_price >= ma20;

        let adx_sig = match calculate_adx(daily, 14) {
            Some((adx, plus_di, minus_di)) if adx >= 20.0 && plus_di > minus_di => 1,
            _ => 0,
        };
        let vol_sig = volume_signal(daily, 20, 1.5);

        // Intraday: oscillators, VWAP, Bollinger, ATR
        let min_closes: Vec<f64> = intraday.iter().map(|c| c.close).collect();
        let min_opens: Vec<f64> = intraday.iter().map(|c| c.open).collect();

        let rsi = calculate_rsi(&min_closes, 14).unwrap_or(50.0);
        let mfi = calculate_mfi(intraday, 14).unwrap_or(50.0);
        let vwap_sig = vwap_signal(intraday);
        let boll_sig = bollinger_signal(&min_closes, &min_opens, 20, 2.0, 1.02);
        let atr = calculate_atr(intraday, 14).unwrap_or(0.0);
        let macd_sig = macd_signal(&min_closes);

        // Oscillator group: RSI/MFI votes averaged into one contribution
        let rsi_vote: i8 = if rsi < 35.0 {
            1
        } else if rsi > 65.0 {
            -1
        } else {
            0
        };
        let mfi_vote: i8 = if mfi < 25.0 {
            1
        } else if mfi > 80.0 {
            -1
        } else {
            0
        };
        let osc_ratio = f64::from(rsi_vote + mfi_vote) / 2.0;
        let osc_score = osc_ratio * self.weights.oscillator_group;

        let mut total = 0.0;
        let mut breakdown = Vec::new();

        if is_bull {
            total += self.weights.trend;
            if debug {
                breakdown.push(format!("[Trend] close above MA20 (+{})", self.weights.trend));
            }
        } else if debug {
            breakdown.push("[Trend] close below MA20 (0.0)".to_string());
        }

        if adx_sig == 1 {
            total += self.weights.adx;
            if debug {
                breakdown.push(format!("[ADX] strong directional trend (+{})", self.weights.adx));
            }
        }

        if vol_sig == 1 {
            total += self.weights.volume;
            if debug {
                breakdown.push(format!("[Volume] bullish expansion (+{})", self.weights.volume));
            }
        }

        if vwap_sig == 1 {
            total += self.weights.vwap;
            if debug {
                breakdown.push(format!("[VWAP] close above VWAP (+{})", self.weights.vwap));
            }
        }

        if osc_score > 0.0 {
            total += osc_score;
            if debug {
                breakdown.push(format!("[Oscillators] reversal setup (+{osc_score:.2})"));
            }
        } else if osc_score < 0.0 {
            // Sell-side oscillator pressure counts at half magnitude
            let deduction = osc_score.abs() * 0.5;
            total -= deduction;
            if debug {
                breakdown.push(format!("[Oscillators] overheated (-{deduction:.2})"));
            }
        }

        if boll_sig == 1 {
            total += self.weights.bollinger;
            if debug {
                breakdown.push(format!(
                    "[Bollinger] lower-band rebound (+{})",
                    self.weights.bollinger
                ));
            }
        } else if boll_sig == -1 {
            // Upper-band touch: half-magnitude deduction
            total -= self.weights.bollinger * 0.5;
            if debug {
                breakdown.push(format!(
                    "[Bollinger] upper-band touch (-{})",
                    self.weights.bollinger * 0.5
                ));
            }
        }

        let score = (total.max(0.0) * 100.0).round() / 100.0;

        Some(SignalResult {
            score,
            should_buy: score >= self.buy_threshold,
            current_price,
            target_price: (current_price + atr * 3.0).round(),
            stop_loss_price: (current_price - atr * 2.0).round(),
            atr,
            rsi,
            mfi,
            signals: IndicatorSignals {
                trend: if is_bull { 1 } else { -1 },
                adx: adx_sig,
                volume: vol_sig,
                vwap: vwap_sig,
                bollinger: boll_sig,
                macd: macd_sig,
                rsi: if rsi < 30.0 {
                    1
                } else if rsi > 70.0 {
                    -1
                } else {
                    0
                },
                mfi: if mfi < 20.0 {
                    1
                } else if mfi > 80.0 {
                    -1
                } else {
                    0
                },
            },
            breakdown,
        })
    }
}
