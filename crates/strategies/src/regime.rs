use chrono::Utc;
use core_types::{Kline, Regime, RegimeState};
use rust_decimal::prelude::*;
use ta::indicators::AverageTrueRange;
use ta::Next as _;

/// Classifies a symbol's coarse market state from a closed hourly candle
/// history: trend strength from a simple EMA-slope proxy, volatility from
/// ATR normalized by price. Shared by every strategy engine so a Grid bot
/// and a Trend-Follower bot looking at the same symbol agree on the regime.
pub struct MarketRegimeDetector {
    atr: AverageTrueRange,
    trend_window: usize,
}

/// Below this normalized-ATR threshold a market is considered low-volatility
/// enough to classify by trend slope alone; above it, `Volatile` takes
/// priority over a trend read.
const VOLATILITY_THRESHOLD_PCT: f64 = 0.05;
/// Minimum fractional move across the trend window to call a direction
/// instead of `Ranging`.
const TREND_THRESHOLD_PCT: f64 = 0.02;

impl MarketRegimeDetector {
    pub fn new(atr_period: usize, trend_window: usize) -> Self {
        Self {
            atr: AverageTrueRange::new(atr_period).unwrap_or_else(|_| {
                AverageTrueRange::new(14).expect("default ATR period is always valid")
            }),
            trend_window,
        }
    }

    /// Recomputes the regime from the most recent `trend_window` closed
    /// candles. Intended to be called on the Bot Orchestrator's 60-second
    /// regime-refresh tick, not every order-evaluation tick.
    pub fn classify(&mut self, history: &[Kline]) -> RegimeState {
        if history.len() < self.trend_window {
            return RegimeState::default();
        }
        let window = &history[history.len() - self.trend_window..];
        let last_close = window.last().map(|c| c.close).unwrap_or_default();
        let first_close = window.first().map(|c| c.close).unwrap_or_default();

        let mut atr_value = 0.0;
        for candle in window {
            let close_f64 = candle.close.to_f64().unwrap_or(0.0);
            atr_value = self.atr.next(close_f64);
        }
        let normalized_atr = if !last_close.is_zero() {
            atr_value / last_close.to_f64().unwrap_or(1.0)
        } else {
            0.0
        };

        if normalized_atr > VOLATILITY_THRESHOLD_PCT {
            return RegimeState {
                regime: Regime::Volatile,
                confidence: Decimal::new((normalized_atr * 100.0) as i64, 2),
                computed_at: Utc::now(),
            };
        }

        if first_close.is_zero() {
            return RegimeState::default();
        }
        let move_pct = ((last_close - first_close) / first_close)
            .to_f64()
            .unwrap_or(0.0);

        let regime = if move_pct > TREND_THRESHOLD_PCT {
            Regime::TrendingUp
        } else if move_pct < -TREND_THRESHOLD_PCT {
            Regime::TrendingDown
        } else {
            Regime::Ranging
        };

        RegimeState {
            regime,
            confidence: Decimal::new((move_pct.abs() * 100.0).min(100.0) as i64, 2),
            computed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn flat_candles(n: usize, price: Decimal) -> Vec<Kline> {
        let now = Utc::now();
        (0..n)
            .map(|_| Kline {
                open_time: now,
                open: price,
                high: price,
                low: price,
                close: price,
                volume: dec!(1),
                close_time: now,
                interval: "1h".to_string(),
            })
            .collect()
    }

    #[test]
    fn classifies_ranging_when_flat() {
        let mut detector = MarketRegimeDetector::new(14, 20);
        let candles = flat_candles(20, dec!(100));
        let state = detector.classify(&candles);
        assert_eq!(state.regime, Regime::Ranging);
    }

    #[test]
    fn returns_unknown_with_insufficient_history() {
        let mut detector = MarketRegimeDetector::new(14, 20);
        let candles = flat_candles(5, dec!(100));
        let state = detector.classify(&candles);
        assert_eq!(state.regime, Regime::Unknown);
    }
}
