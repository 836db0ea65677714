use crate::error::StrategyError;
use crate::{Intent, Strategy};
use chrono::{DateTime, Duration, Utc};
use configuration::SmcParams;
use core_types::{
    CloseReason, Deal, Direction, Kline, MarketSnapshot, Order, OrderRole, OrderSide, OrderType,
    Signal, StrategyKind, TakeProfitTarget,
};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A price imbalance left by a three-candle sequence where candle 1's high
/// (low) doesn't overlap candle 3's low (high) — the gap price action
/// tends to revisit before continuing in the direction of the move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FairValueGap {
    pub direction: Direction,
    pub top: Decimal,
    pub bottom: Decimal,
}

/// Finds fair value gaps across a candle history. A bullish gap requires
/// `candles[i-2].high < candles[i].low`; a bearish gap requires
/// `candles[i-2].low > candles[i].high`.
pub fn find_fair_value_gaps(candles: &[Kline], min_gap_pct: Decimal) -> Vec<FairValueGap> {
    let mut gaps = Vec::new();
    if candles.len() < 3 {
        return gaps;
    }
    for i in 2..candles.len() {
        let left = &candles[i - 2];
        let right = &candles[i];
        if right.low > left.high {
            let gap_pct = (right.low - left.high) / left.high;
            if gap_pct >= min_gap_pct {
                gaps.push(FairValueGap {
                    direction: Direction::Long,
                    top: right.low,
                    bottom: left.high,
                });
            }
        } else if left.low > right.high {
            let gap_pct = (left.low - right.high) / left.low;
            if gap_pct >= min_gap_pct {
                gaps.push(FairValueGap {
                    direction: Direction::Short,
                    top: left.low,
                    bottom: right.high,
                });
            }
        }
    }
    gaps
}

/// A local swing point: a high (low) strictly greater (less) than
/// `lookback` candles on either side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPoint {
    pub index: usize,
    pub price: Decimal,
    pub is_high: bool,
}

/// Finds fractal swing highs/lows using a symmetric lookback window.
pub fn find_swings(candles: &[Kline], lookback: usize) -> Vec<SwingPoint> {
    let mut swings = Vec::new();
    if candles.len() < lookback * 2 + 1 {
        return swings;
    }
    for i in lookback..candles.len() - lookback {
        let window = &candles[i - lookback..=i + lookback];
        let high = candles[i].high;
        let low = candles[i].low;
        if window.iter().all(|c| c.high <= high) && window.iter().filter(|c| c.high == high).count() == 1 {
            swings.push(SwingPoint { index: i, price: high, is_high: true });
        }
        if window.iter().all(|c| c.low >= low) && window.iter().filter(|c| c.low == low).count() == 1 {
            swings.push(SwingPoint { index: i, price: low, is_high: false });
        }
    }
    swings
}

/// Detects a break of structure: the most recent close trading beyond the
/// prior swing high (bullish BOS) or swing low (bearish BOS).
pub fn detect_break_of_structure(swings: &[SwingPoint], last_close: Decimal) -> Option<Direction> {
    let last_swing_high = swings.iter().filter(|s| s.is_high).last()?;
    let last_swing_low = swings.iter().filter(|s| !s.is_high).last()?;
    if last_close > last_swing_high.price {
        Some(Direction::Long)
    } else if last_close < last_swing_low.price {
        Some(Direction::Short)
    } else {
        None
    }
}

struct ZoneCache {
    gaps: Vec<FairValueGap>,
    swings: Vec<SwingPoint>,
    computed_at: DateTime<Utc>,
}

/// The Smart Money Concepts Engine: trades breaks of structure confirmed by
/// an unfilled fair value gap in the same direction, targeting a minimum
/// risk:reward off the most recent opposing swing. Zone detection (swings,
/// FVGs) is expensive relative to a single tick, so it's cached and only
/// recomputed every `zone_refresh_secs`.
pub struct SmcEngine {
    bot_name: String,
    symbol: String,
    params: SmcParams,
    cache: Option<ZoneCache>,
    pending_signal: Option<Signal>,
    deal: Option<Deal>,
    stop_order_id: Option<Uuid>,
    tp_order_ids: Vec<Uuid>,
}

impl SmcEngine {
    pub fn new(bot_name: impl Into<String>, symbol: impl Into<String>, params: SmcParams) -> Self {
        Self {
            bot_name: bot_name.into(),
            symbol: symbol.into(),
            params,
            cache: None,
            pending_signal: None,
            deal: None,
            stop_order_id: None,
            tp_order_ids: Vec::new(),
        }
    }

    fn exit_side(direction: Direction) -> OrderSide {
        match direction {
            Direction::Long => OrderSide::Sell,
            Direction::Short => OrderSide::Buy,
        }
    }

    fn refresh_cache_if_stale(&mut self, history: &[Kline]) {
        let stale = match &self.cache {
            None => true,
            Some(cache) => {
                Utc::now() - cache.computed_at > Duration::seconds(self.params.zone_refresh_secs as i64)
            }
        };
        if stale {
            self.cache = Some(ZoneCache {
                gaps: find_fair_value_gaps(history, self.params.fair_value_gap_min_pct),
                swings: find_swings(history, self.params.swing_lookback),
                computed_at: Utc::now(),
            });
        }
    }
}

impl Strategy for SmcEngine {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Smc
    }

    fn deals_snapshot(&self) -> Vec<Deal> {
        self.deal.iter().cloned().collect()
    }

    fn evaluate(
        &mut self,
        _snapshot: &MarketSnapshot,
        history: &[Kline],
    ) -> Result<Vec<Intent>, StrategyError> {
        let needed = self.params.swing_lookback * 2 + 1;
        if history.len() < needed {
            return Err(StrategyError::InsufficientData(needed, history.len()));
        }
        if self.deal.is_some() || self.pending_signal.is_some() {
            return Ok(vec![]);
        }
        self.refresh_cache_if_stale(history);
        let cache = self.cache.as_ref().expect("just populated above");
        let last = history.last().expect("checked non-empty above");

        let Some(bos_direction) = detect_break_of_structure(&cache.swings, last.close) else {
            return Ok(vec![]);
        };
        let has_supporting_gap = cache.gaps.iter().any(|g| g.direction == bos_direction);
        if !has_supporting_gap {
            return Ok(vec![]);
        }

        let opposing_swing = match bos_direction {
            Direction::Long => cache.swings.iter().filter(|s| !s.is_high).last(),
            Direction::Short => cache.swings.iter().filter(|s| s.is_high).last(),
        };
        let Some(opposing_swing) = opposing_swing else {
            return Ok(vec![]);
        };

        let entry = last.close;
        let stop_loss_price = opposing_swing.price;
        let stop_distance = (entry - stop_loss_price).abs();
        if stop_distance.is_zero() {
            return Ok(vec![]);
        }
        let take_profit_price = match bos_direction {
            Direction::Long => entry + stop_distance * self.params.risk_reward_min,
            Direction::Short => entry - stop_distance * self.params.risk_reward_min,
        };

        tracing::debug!(symbol = %self.symbol, ?bos_direction, "smc signal generated");
        let signal = Signal {
            id: Uuid::new_v4(),
            direction: bos_direction,
            entry_price: entry,
            stop_loss_price,
            take_profits: vec![TakeProfitTarget {
                price: take_profit_price,
                close_fraction: Decimal::ONE,
            }],
            confidence: Decimal::new(8, 1),
            risk_reward: self.params.risk_reward_min,
            generated_at: last.close_time,
            source_strategy: StrategyKind::Smc,
            staleness_budget: Duration::minutes(3),
        };
        self.pending_signal = Some(signal.clone());
        Ok(vec![Intent::Propose(signal)])
    }

    fn on_order_filled(&mut self, order: &Order, fill_price: Decimal) -> Vec<Intent> {
        match order.role {
            OrderRole::BaseOrder => {
                let Some(signal) = self.pending_signal.clone() else {
                    return Vec::new();
                };
                let tag_matches = order.strategy_tag.as_deref() == Some(signal.id.to_string().as_str());
                if !tag_matches {
                    return Vec::new();
                }
                self.pending_signal = None;
                self.deal = Some(Deal::open(
                    self.bot_name.clone(),
                    self.symbol.clone(),
                    signal.direction,
                    fill_price,
                    order.filled_amount,
                    serde_json::to_value(&signal).unwrap_or_default(),
                ));

                let exit_side = Self::exit_side(signal.direction);
                let stop_order = Order::new(
                    self.bot_name.clone(),
                    self.symbol.clone(),
                    exit_side,
                    OrderType::Limit,
                    Some(signal.stop_loss_price),
                    order.filled_amount,
                    OrderRole::StopLoss,
                );
                self.stop_order_id = Some(stop_order.local_id);
                let mut intents = vec![Intent::PlaceOrder(stop_order)];

                self.tp_order_ids.clear();
                for tp in &signal.take_profits {
                    let tp_order = Order::new(
                        self.bot_name.clone(),
                        self.symbol.clone(),
                        exit_side,
                        OrderType::Limit,
                        Some(tp.price),
                        order.filled_amount * tp.close_fraction,
                        OrderRole::TakeProfit,
                    );
                    self.tp_order_ids.push(tp_order.local_id);
                    intents.push(Intent::PlaceOrder(tp_order));
                }
                intents
            }
            OrderRole::StopLoss | OrderRole::TakeProfit => {
                let Some(deal) = self.deal.as_mut() else {
                    return Vec::new();
                };
                let pnl = match deal.direction {
                    Direction::Long => (fill_price - deal.average_entry) * order.filled_amount,
                    Direction::Short => (deal.average_entry - fill_price) * order.filled_amount,
                };
                let reason = if order.role == OrderRole::StopLoss {
                    CloseReason::StopLoss
                } else {
                    CloseReason::TakeProfit
                };
                deal.close(reason, pnl, Utc::now());
                let mut cancels = Vec::new();
                if order.role == OrderRole::StopLoss {
                    cancels.extend(self.tp_order_ids.drain(..).map(Intent::CancelOrder));
                } else if let Some(id) = self.stop_order_id.take() {
                    cancels.push(Intent::CancelOrder(id));
                }
                cancels
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Kline {
        let now = Utc::now();
        Kline {
            open_time: now,
            open,
            high,
            low,
            close,
            volume: dec!(1),
            close_time: now,
            interval: "1h".to_string(),
        }
    }

    #[test]
    fn finds_bullish_fair_value_gap() {
        let candles = vec![
            candle(dec!(100), dec!(101), dec!(99), dec!(100)),
            candle(dec!(101), dec!(110), dec!(101), dec!(109)),
            candle(dec!(109), dec!(112), dec!(108), dec!(111)),
        ];
        let gaps = find_fair_value_gaps(&candles, dec!(0.01));
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].direction, Direction::Long);
    }

    #[test]
    fn no_gap_when_candles_overlap() {
        let candles = vec![
            candle(dec!(100), dec!(105), dec!(99), dec!(102)),
            candle(dec!(102), dec!(106), dec!(101), dec!(103)),
            candle(dec!(103), dec!(104), dec!(100), dec!(101)),
        ];
        let gaps = find_fair_value_gaps(&candles, dec!(0.001));
        assert!(gaps.is_empty());
    }
}
