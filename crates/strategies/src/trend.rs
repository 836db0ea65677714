use crate::error::StrategyError;
use crate::{Intent, Strategy};
use chrono::{Duration, Utc};
use configuration::TrendParams;
use core_types::{
    CloseReason, Deal, Direction, Kline, MarketSnapshot, Order, OrderRole, OrderSide, OrderType,
    Signal, StrategyKind, TakeProfitTarget,
};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use ta::indicators::{AverageTrueRange, ExponentialMovingAverage, RelativeStrengthIndex};
use ta::Next as _;
use uuid::Uuid;

/// The take-profit multiplier applied to the ATR stop distance when the
/// EMA divergence classifies the trend as sideways.
const TP_MULT_SIDEWAYS: Decimal = dec!(1.2);
/// ... weak.
const TP_MULT_WEAK: Decimal = dec!(1.8);
/// ... strong.
const TP_MULT_STRONG: Decimal = dec!(2.5);
/// Stop moves to breakeven once price has moved this many ATRs in favor.
const BREAKEVEN_ATR_MULT: Decimal = dec!(1.0);
/// Once at breakeven, the stop trails this many ATRs behind the high-water
/// mark.
const TRAILING_ATR_MULT: Decimal = dec!(1.5);
/// Fraction of the distance to the first take-profit target at which a
/// partial close is taken.
const PARTIAL_CLOSE_TRIGGER_PCT: Decimal = dec!(0.7);
/// Fraction of the remaining position closed at the partial-close trigger.
const PARTIAL_CLOSE_FRACTION: Decimal = dec!(0.5);
/// New entries are sized at this fraction of normal after a loss streak.
const LOSS_STREAK_SIZE_FACTOR: Decimal = dec!(0.5);

/// The market phase implied by a fast/slow EMA pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendPhase {
    Bullish,
    Bearish,
    Neutral,
}

/// Classifies the trend phase from a fast/slow EMA pair, the way a crossover
/// system reads its own indicator state: fast above slow is bullish, fast
/// below slow is bearish, equal is neutral (never fires a flip on its own).
pub fn classify_phase(fast: f64, slow: f64) -> TrendPhase {
    if fast > slow {
        TrendPhase::Bullish
    } else if fast < slow {
        TrendPhase::Bearish
    } else {
        TrendPhase::Neutral
    }
}

/// How far apart the fast and slow EMAs have pulled, classified into the
/// bands that drive the take-profit multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendStrength {
    Sideways,
    Weak,
    Strong,
}

/// Classifies divergence (a fraction of the slow EMA) against the two
/// configured thresholds.
pub fn classify_strength(
    divergence_pct: Decimal,
    weak_threshold: Decimal,
    strong_threshold: Decimal,
) -> TrendStrength {
    if divergence_pct >= strong_threshold {
        TrendStrength::Strong
    } else if divergence_pct >= weak_threshold {
        TrendStrength::Weak
    } else {
        TrendStrength::Sideways
    }
}

fn take_profit_multiplier(strength: TrendStrength) -> Decimal {
    match strength {
        TrendStrength::Sideways => TP_MULT_SIDEWAYS,
        TrendStrength::Weak => TP_MULT_WEAK,
        TrendStrength::Strong => TP_MULT_STRONG,
    }
}

/// The Trend-Follower Engine: rides directional momentum using an EMA
/// crossover, confirmed by RSI to avoid entries against an already-extended
/// move, with an ATR-scaled stop-loss and take-profit whose multiplier
/// widens with how strongly the EMAs have diverged. Once in a position it
/// manages its own exit: the stop moves to breakeven and then trails at a
/// fixed ATR distance, and part of the position is taken off once price
/// closes most of the way to the first take-profit target.
pub struct TrendFollowerEngine {
    bot_name: String,
    symbol: String,
    params: TrendParams,
    ema_fast: ExponentialMovingAverage,
    ema_slow: ExponentialMovingAverage,
    atr: AverageTrueRange,
    rsi: RelativeStrengthIndex,
    prev_phase: Option<TrendPhase>,
    pending_signal: Option<Signal>,
    deal: Option<Deal>,
    entry_atr: Decimal,
    stop_price: Decimal,
    stop_order_id: Option<Uuid>,
    tp_order_ids: Vec<Uuid>,
    first_take_profit: Option<Decimal>,
    breakeven_moved: bool,
    partial_closed: bool,
    banked_pnl: Decimal,
    consecutive_losses: u32,
}

impl TrendFollowerEngine {
    pub fn new(
        bot_name: impl Into<String>,
        symbol: impl Into<String>,
        params: TrendParams,
    ) -> Result<Self, StrategyError> {
        let ema_fast = ExponentialMovingAverage::new(params.ema_fast_period)
            .map_err(|e| StrategyError::IndicatorError(format!("ema_fast: {e:?}")))?;
        let ema_slow = ExponentialMovingAverage::new(params.ema_slow_period)
            .map_err(|e| StrategyError::IndicatorError(format!("ema_slow: {e:?}")))?;
        let atr = AverageTrueRange::new(params.atr_period)
            .map_err(|e| StrategyError::IndicatorError(format!("atr: {e:?}")))?;
        let rsi = RelativeStrengthIndex::new(params.rsi_period)
            .map_err(|e| StrategyError::IndicatorError(format!("rsi: {e:?}")))?;
        Ok(Self {
            bot_name: bot_name.into(),
            symbol: symbol.into(),
            params,
            ema_fast,
            ema_slow,
            atr,
            rsi,
            prev_phase: None,
            pending_signal: None,
            deal: None,
            entry_atr: Decimal::ZERO,
            stop_price: Decimal::ZERO,
            stop_order_id: None,
            tp_order_ids: Vec::new(),
            first_take_profit: None,
            breakeven_moved: false,
            partial_closed: false,
            banked_pnl: Decimal::ZERO,
            consecutive_losses: 0,
        })
    }

    fn to_f64(value: Decimal, field: &str) -> Result<f64, StrategyError> {
        value
            .to_f64()
            .ok_or_else(|| StrategyError::IndicatorError(format!("failed to convert {field} to f64")))
    }

    fn exit_side(direction: Direction) -> OrderSide {
        match direction {
            Direction::Long => OrderSide::Sell,
            Direction::Short => OrderSide::Buy,
        }
    }

    /// Cancels the current resting stop order (if any) and places a new one
    /// at `new_stop_price`, recording the replacement.
    fn replace_stop(&mut self, direction: Direction, new_stop_price: Decimal, amount: Decimal) -> Vec<Intent> {
        let mut intents = Vec::new();
        if let Some(old_id) = self.stop_order_id.take() {
            intents.push(Intent::CancelOrder(old_id));
        }
        let order = Order::new(
            self.bot_name.clone(),
            self.symbol.clone(),
            Self::exit_side(direction),
            OrderType::Limit,
            Some(new_stop_price),
            amount,
            OrderRole::StopLoss,
        );
        self.stop_order_id = Some(order.local_id);
        self.stop_price = new_stop_price;
        intents.push(Intent::PlaceOrder(order));
        intents
    }

    /// Manages an already-open position: breakeven, ATR trailing, and the
    /// 70%-to-target partial close. Runs every tick regardless of whether a
    /// new entry signal could fire this bar.
    fn manage_open_position(&mut self, price: Decimal) -> Vec<Intent> {
        let mut intents = Vec::new();
        if self.deal.is_none() || price.is_zero() {
            return intents;
        }
        let deal = self.deal.as_mut().expect("checked Some above");
        deal.update_highest_price(price);
        let direction = deal.direction;
        let average_entry = deal.average_entry;
        let highest = deal.highest_price_since_entry;
        let base_amount = deal.base_amount;

        let favorable_move = match direction {
            Direction::Long => price - average_entry,
            Direction::Short => average_entry - price,
        };

        if !self.breakeven_moved {
            if favorable_move >= self.entry_atr * BREAKEVEN_ATR_MULT {
                self.breakeven_moved = true;
                intents.extend(self.replace_stop(direction, average_entry, base_amount));
            }
        } else {
            let candidate = match direction {
                Direction::Long => highest - self.entry_atr * TRAILING_ATR_MULT,
                Direction::Short => highest + self.entry_atr * TRAILING_ATR_MULT,
            };
            let improves = match direction {
                Direction::Long => candidate > self.stop_price,
                Direction::Short => candidate < self.stop_price,
            };
            if improves {
                intents.extend(self.replace_stop(direction, candidate, base_amount));
            }
        }

        if !self.partial_closed {
            if let Some(target) = self.first_take_profit {
                let trigger = match direction {
                    Direction::Long => average_entry + (target - average_entry) * PARTIAL_CLOSE_TRIGGER_PCT,
                    Direction::Short => average_entry - (average_entry - target) * PARTIAL_CLOSE_TRIGGER_PCT,
                };
                let reached = match direction {
                    Direction::Long => price >= trigger,
                    Direction::Short => price <= trigger,
                };
                if reached {
                    let deal = self.deal.as_mut().expect("checked Some above");
                    let close_amount = deal.base_amount * PARTIAL_CLOSE_FRACTION;
                    let leg_pnl = match direction {
                        Direction::Long => (price - deal.average_entry) * close_amount,
                        Direction::Short => (deal.average_entry - price) * close_amount,
                    };
                    self.banked_pnl += leg_pnl;
                    deal.quote_spent -= deal.average_entry * close_amount;
                    deal.base_amount -= close_amount;
                    self.partial_closed = true;
                    intents.push(Intent::PlaceOrder(Order::new(
                        self.bot_name.clone(),
                        self.symbol.clone(),
                        Self::exit_side(direction),
                        OrderType::Market,
                        None,
                        close_amount,
                        OrderRole::PartialClose,
                    )));
                }
            }
        }
        intents
    }

    fn build_signal(
        &self,
        bar: &Kline,
        direction: Direction,
        close: f64,
        atr: f64,
        atr_multiplier: f64,
        tp_mult: Decimal,
        size_factor: Decimal,
    ) -> Signal {
        let entry = Decimal::from_f64(close).unwrap_or_default();
        let stop_distance = Decimal::from_f64(atr * atr_multiplier).unwrap_or(Decimal::ZERO);
        let stop_loss_price = match direction {
            Direction::Long => entry - stop_distance,
            Direction::Short => entry + stop_distance,
        };
        let take_profit_price = match direction {
            Direction::Long => entry + stop_distance * tp_mult,
            Direction::Short => entry - stop_distance * tp_mult,
        };
        tracing::debug!(symbol = %self.symbol, ?direction, ?tp_mult, "trend-follower signal generated");
        Signal {
            id: Uuid::new_v4(),
            direction,
            entry_price: entry,
            stop_loss_price,
            take_profits: vec![TakeProfitTarget {
                price: take_profit_price,
                close_fraction: dec!(1),
            }],
            confidence: dec!(0.75) * size_factor,
            risk_reward: tp_mult,
            generated_at: bar.close_time,
            source_strategy: StrategyKind::TrendFollower,
            staleness_budget: Duration::minutes(5),
        }
    }
}

impl Strategy for TrendFollowerEngine {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TrendFollower
    }

    fn deals_snapshot(&self) -> Vec<Deal> {
        self.deal.iter().cloned().collect()
    }

    fn evaluate(
        &mut self,
        snapshot: &MarketSnapshot,
        history: &[Kline],
    ) -> Result<Vec<Intent>, StrategyError> {
        let needed = self.params.ema_slow_period.max(self.params.atr_period).max(self.params.rsi_period);
        if history.len() < needed {
            return Err(StrategyError::InsufficientData(needed, history.len()));
        }
        let bar = history.last().expect("checked non-empty above");
        let close = Self::to_f64(bar.close, "close")?;

        let fast = self.ema_fast.next(close);
        let slow = self.ema_slow.next(close);
        let atr = self.atr.next(close);
        let rsi = self.rsi.next(close);
        let phase = classify_phase(fast, slow);

        let mut intents = Vec::new();
        let live_price = if snapshot.last_price.is_zero() { bar.close } else { snapshot.last_price };
        intents.extend(self.manage_open_position(live_price));

        let Some(prev) = self.prev_phase else {
            self.prev_phase = Some(phase);
            return Ok(intents);
        };
        self.prev_phase = Some(phase);

        if self.deal.is_some() || self.pending_signal.is_some() {
            return Ok(intents);
        }

        let atr_pct = if close == 0.0 { 0.0 } else { atr / close };
        let atr_pct_dec = Decimal::from_f64(atr_pct).unwrap_or(Decimal::ZERO);
        if atr_pct_dec > self.params.max_atr_filter_pct {
            tracing::debug!(symbol = %self.symbol, %atr_pct_dec, "entry suppressed: volatility above max_atr_filter_pct");
            return Ok(intents);
        }

        let rsi_filter_threshold = Self::to_f64(self.params.rsi_filter_threshold, "rsi_filter_threshold")?;
        let atr_multiplier = Self::to_f64(self.params.atr_multiplier, "atr_multiplier")?;

        let divergence_pct = if slow.abs() < f64::EPSILON { 0.0 } else { (fast - slow).abs() / slow.abs() };
        let divergence_dec = Decimal::from_f64(divergence_pct).unwrap_or(Decimal::ZERO);
        let strength = classify_strength(divergence_dec, self.params.weak_divergence_pct, self.params.strong_divergence_pct);
        let tp_mult = take_profit_multiplier(strength);
        let size_factor = if self.consecutive_losses >= self.params.loss_streak_threshold {
            LOSS_STREAK_SIZE_FACTOR
        } else {
            dec!(1)
        };

        let flipped_bullish = prev == TrendPhase::Bearish && phase == TrendPhase::Bullish;
        let flipped_bearish = prev == TrendPhase::Bullish && phase == TrendPhase::Bearish;

        if flipped_bullish && rsi < (100.0 - rsi_filter_threshold) {
            let signal = self.build_signal(bar, Direction::Long, close, atr, atr_multiplier, tp_mult, size_factor);
            self.pending_signal = Some(signal.clone());
            self.entry_atr = Decimal::from_f64(atr).unwrap_or(Decimal::ZERO);
            intents.push(Intent::Propose(signal));
        } else if flipped_bearish && rsi > rsi_filter_threshold {
            let signal = self.build_signal(bar, Direction::Short, close, atr, atr_multiplier, tp_mult, size_factor);
            self.pending_signal = Some(signal.clone());
            self.entry_atr = Decimal::from_f64(atr).unwrap_or(Decimal::ZERO);
            intents.push(Intent::Propose(signal));
        }
        Ok(intents)
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
                self.breakeven_moved = false;
                self.partial_closed = false;
                self.banked_pnl = Decimal::ZERO;
                self.stop_price = signal.stop_loss_price;
                self.first_take_profit = signal.take_profits.first().map(|tp| tp.price);

                let deal = Deal::open(
                    self.bot_name.clone(),
                    self.symbol.clone(),
                    signal.direction,
                    fill_price,
                    order.filled_amount,
                    serde_json::to_value(&signal).unwrap_or_default(),
                );
                self.deal = Some(deal);

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
                let leg_pnl = match deal.direction {
                    Direction::Long => (fill_price - deal.average_entry) * order.filled_amount,
                    Direction::Short => (deal.average_entry - fill_price) * order.filled_amount,
                };
                let total_pnl = self.banked_pnl + leg_pnl;
                let reason = if order.role == OrderRole::StopLoss {
                    CloseReason::StopLoss
                } else {
                    CloseReason::TakeProfit
                };
                deal.close(reason, total_pnl, Utc::now());
                if total_pnl < Decimal::ZERO {
                    self.consecutive_losses += 1;
                } else {
                    self.consecutive_losses = 0;
                }
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

    #[test]
    fn classifies_bullish_when_fast_above_slow() {
        assert_eq!(classify_phase(105.0, 100.0), TrendPhase::Bullish);
    }

    #[test]
    fn classifies_bearish_when_fast_below_slow() {
        assert_eq!(classify_phase(95.0, 100.0), TrendPhase::Bearish);
    }

    #[test]
    fn classifies_neutral_when_equal() {
        assert_eq!(classify_phase(100.0, 100.0), TrendPhase::Neutral);
    }

    #[test]
    fn classifies_strength_bands() {
        assert_eq!(classify_strength(dec!(0.005), dec!(0.01), dec!(0.03)), TrendStrength::Sideways);
        assert_eq!(classify_strength(dec!(0.02), dec!(0.01), dec!(0.03)), TrendStrength::Weak);
        assert_eq!(classify_strength(dec!(0.05), dec!(0.01), dec!(0.03)), TrendStrength::Strong);
    }

    #[test]
    fn strong_trend_uses_wider_take_profit_multiple() {
        assert_eq!(take_profit_multiplier(TrendStrength::Strong), dec!(2.5));
        assert_eq!(take_profit_multiplier(TrendStrength::Weak), dec!(1.8));
        assert_eq!(take_profit_multiplier(TrendStrength::Sideways), dec!(1.2));
    }
}
