use crate::models::Candle;
use crate::strategy::{overheat_filter, EnsembleStrategy};
use serde::{Deserialize, Serialize};

/// Taker fee per side
pub const FEE_RATE: f64 = 0.0005;
const INITIAL_CAPITAL: f64 = 1_000_000.0;
const MAX_TEST_DAYS: usize = 90;

/// Aggregate outcome of one simulated run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub win_rate: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub trades: u32,
}

/// Action taken on one simulated day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayCall {
    Buy,
    Sell,
    Hold,
}

/// Replay the ensemble over the trailing window of `daily` bars.
///
/// Entry applies the same overheat filters as the live buying pass; exit
/// fires when the score decays below the strategy's exit threshold.
pub fn simulate(strategy: &EnsembleStrategy, daily: &[Candle]) -> BacktestSummary {
    simulate_with(daily, |bars| {
        let res = strategy.evaluate(bars, bars, false)?;
        Some(
            if res.score >= strategy.buy_threshold() && !overheat_filter(res.rsi, res.mfi) {
                DayCall::Buy
            } else if res.score < strategy.exit_threshold() {
                DayCall::Sell
            } else {
                DayCall::Hold
            },
        )
    })
}

/// Core replay loop with an injectable decision function.
///
/// The decision for day `i` sees bars `[..=i]` only; the resulting order
/// always fills at bar `i+1`'s open, so a signal can never execute at the
/// price that produced it.
pub fn simulate_with(
    daily: &[Candle],
    mut decide: impl FnMut(&[Candle]) -> Option<DayCall>,
) -> BacktestSummary {
    if daily.len() < 21 {
        return BacktestSummary::default();
    }

    let mut balance = INITIAL_CAPITAL;
    let mut shares = 0.0;
    let mut avg_buy_price = 0.0;
    let mut trades = 0u32;
    let mut wins = 0u32;
    let mut max_balance = INITIAL_CAPITAL;
    let mut max_drawdown: f64 = 0.0;

    let days = MAX_TEST_DAYS.min(daily.len() - 20);
    let start = daily.len() - days;

    for i in start..daily.len() - 1 {
        let Some(call) = decide(&daily[..=i]) else {
            continue;
        };
        let next_open = daily[i + 1].open;
        if next_open <= 0.0 {
            continue;
        }

        match call {
            DayCall::Buy if shares == 0.0 => {
                shares = balance * (1.0 - FEE_RATE) / next_open;
                avg_buy_price = next_open;
                balance = 0.0;
            }
            DayCall::Sell if shares > 0.0 => {
                let proceeds = shares * next_open * (1.0 - FEE_RATE);
                if proceeds > shares * avg_buy_price {
                    wins += 1;
                }
                balance = proceeds;
                shares = 0.0;
                trades += 1;

                max_balance = max_balance.max(balance);
                let drawdown = (max_balance - balance) / max_balance * 100.0;
                max_drawdown = max_drawdown.max(drawdown);
            }
            _ => {}
        }
    }

    let final_asset = if balance > 0.0 {
        balance
    } else {
        shares * daily[daily.len() - 1].close
    };

    BacktestSummary {
        win_rate: if trades > 0 {
            round1(f64::from(wins) / f64::from(trades) * 100.0)
        } else {
            0.0
        },
        total_return: round1((final_asset / INITIAL_CAPITAL - 1.0) * 100.0),
        max_drawdown: round1(max_drawdown),
        trades,
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Opens carry a recognizable 1000+ price level; closes sit far away at
    /// 1.0 so any fill taken from a close is immediately visible in totals.
    fn candles_with_marked_opens(len: usize) -> Vec<Candle> {
        (0..len)
            .map(|i| Candle {
                market: "KRW-TEST".to_string(),
                timestamp: Utc::now() + chrono::Duration::days(i as i64),
                open: 1000.0 + i as f64,
                high: 2000.0,
                low: 0.5,
                close: 1.0,
                volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn test_fills_use_next_day_open_not_close() {
        let bars = candles_with_marked_opens(60);
        let mut seen_lengths = Vec::new();

        let summary = simulate_with(&bars, |slice| {
            seen_lengths.push(slice.len());
            Some(match slice.len() {
                30 => DayCall::Buy,  // decision on bars[..=29]
                35 => DayCall::Sell, // decision on bars[..=34]
                _ => DayCall::Hold,
            })
        });

        // Buy fills at open[30], sell at open[35]
        let buy_price = 1030.0;
        let sell_price = 1035.0;
        let shares = INITIAL_CAPITAL * (1.0 - FEE_RATE) / buy_price;
        let expected = (shares * sell_price * (1.0 - FEE_RATE) / INITIAL_CAPITAL - 1.0) * 100.0;

        assert_eq!(summary.trades, 1);
        assert_eq!(summary.win_rate, 100.0);
        assert!((summary.total_return - (expected * 10.0).round() / 10.0).abs() < 1e-9);
        // The decision never sees the full series: the last slice ends one
        // bar before the end, which reserves a next open for execution.
        assert_eq!(*seen_lengths.last().unwrap(), bars.len() - 1);
    }

    #[test]
    fn test_trailing_window_is_bounded() {
        let bars = candles_with_marked_opens(200);
        let mut first_len = None;

        simulate_with(&bars, |slice| {
            first_len.get_or_insert(slice.len());
            Some(DayCall::Hold)
        });

        // 200 bars -> 90 decision days -> first slice holds 111 bars
        assert_eq!(first_len, Some(111));
    }

    #[test]
    fn test_hold_only_run_is_flat() {
        let bars = candles_with_marked_opens(60);
        let summary = simulate_with(&bars, |_| Some(DayCall::Hold));

        assert_eq!(summary.trades, 0);
        assert_eq!(summary.total_return, 0.0);
        assert_eq!(summary.win_rate, 0.0);
    }

    #[test]
    fn test_losing_trade_counts_drawdown() {
        let mut bars = candles_with_marked_opens(60);
        // Crash the open used for the sell fill
        bars[44].open = 500.0;

        let summary = simulate_with(&bars, |slice| {
            Some(match slice.len() {
                40 => DayCall::Buy,  // fills at open[40] = 1040
                44 => DayCall::Sell, // fills at open[44] = 500
                _ => DayCall::Hold,
            })
        });

        assert_eq!(summary.trades, 1);
        assert_eq!(summary.win_rate, 0.0);
        assert!(summary.max_drawdown > 50.0);
        assert!(summary.total_return < -50.0);
    }

    #[test]
    fn test_open_position_marked_at_last_close() {
        let bars = candles_with_marked_opens(60);
        let summary = simulate_with(&bars, |slice| {
            Some(if slice.len() == 30 {
                DayCall::Buy
            } else {
                DayCall::Hold
            })
        });

        // Bought at 1030, never sold: final asset = shares * last close (1.0)
        assert_eq!(summary.trades, 0);
        assert!(summary.total_return < -99.0);
    }

    #[test]
    fn test_short_history_is_empty_summary() {
        let bars = candles_with_marked_opens(10);
        let summary = simulate_with(&bars, |_| Some(DayCall::Buy));
        assert_eq!(summary.trades, 0);
        assert_eq!(summary.total_return, 0.0);
    }

    #[test]
    fn test_ensemble_simulation_runs_clean() {
        let bars: Vec<Candle> = (0..120)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.7).sin() * 10.0 + i as f64 * 0.1;
                Candle {
                    market: "KRW-TEST".to_string(),
                    timestamp: Utc::now() + chrono::Duration::days(i as i64),
                    open: close * 0.995,
                    high: close * 1.01,
                    low: close * 0.99,
                    close,
                    volume: 1000.0,
                }
            })
            .collect();

        let summary = simulate(&EnsembleStrategy::default(), &bars);
        assert!(summary.max_drawdown >= 0.0);
        assert!(summary.win_rate >= 0.0 && summary.win_rate <= 100.0);
    }
}
