use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Scales a bot's allocated capital up through fixed phases as it
/// demonstrates consistent, error-free performance, and halts it outright
/// after repeated adapter/execution errors. A phase only advances forward;
/// there is no automatic demotion — a human (or a future control surface)
/// must intervene to resume a halted bot.
#[derive(Debug, Clone)]
pub struct CapitalManager {
    total_capital: Decimal,
    phase: u32,
    allocated_capital: Decimal,
    trades_in_phase: u32,
    errors_in_phase: u32,
    phase_started_at: DateTime<Utc>,
    halted: bool,
}

/// Phase 1 trades a conservative slice of total capital; each subsequent
/// phase doubles the allocation, capped at `total_capital`.
const PHASE_1_ALLOCATION_PCT: Decimal = dec!(0.1);
/// A phase advances once this many trades have closed in it without a halt.
const TRADES_TO_ADVANCE: u32 = 20;
/// Three consecutive adapter/execution errors within a phase halts the bot.
const MAX_ERRORS_BEFORE_HALT: u32 = 3;

impl CapitalManager {
    /// Starts a fresh allocation at phase 1.
    ///
    /// On process restart the orchestrator should reconstruct this from the
    /// persisted phase/allocation/trade counters rather than calling this
    /// again — see the phase-timer resume decision in the design notes.
    pub fn start_phase_1(total_capital: Decimal) -> Self {
        Self {
            total_capital,
            phase: 1,
            allocated_capital: total_capital * PHASE_1_ALLOCATION_PCT,
            trades_in_phase: 0,
            errors_in_phase: 0,
            phase_started_at: Utc::now(),
            halted: false,
        }
    }

    pub fn phase(&self) -> u32 {
        self.phase
    }

    pub fn allocated_capital(&self) -> Decimal {
        self.allocated_capital
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Records a closed trade. Profitability is not itself a scaling
    /// criterion here — `evaluate_scaling` only counts trade volume and the
    /// error rate, leaving P&L-driven scaling to the Risk Manager's own
    /// drawdown gate.
    pub fn record_trade(&mut self) {
        if self.halted {
            return;
        }
        self.trades_in_phase += 1;
    }

    /// Records an adapter/execution error. Three within a phase halts the
    /// bot outright.
    pub fn record_error(&mut self) {
        if self.halted {
            return;
        }
        self.errors_in_phase += 1;
        if self.errors_in_phase >= MAX_ERRORS_BEFORE_HALT {
            self.halt();
        }
    }

    /// Whether the current phase has earned a promotion.
    pub fn evaluate_scaling(&self) -> bool {
        !self.halted
            && self.trades_in_phase >= TRADES_TO_ADVANCE
            && self.errors_in_phase == 0
            && self.allocated_capital < self.total_capital
    }

    /// Advances to the next phase, doubling the allocation (capped at
    /// `total_capital`) and resetting the per-phase counters.
    pub fn advance_phase(&mut self) {
        if self.halted {
            return;
        }
        self.phase += 1;
        self.allocated_capital = (self.allocated_capital * dec!(2)).min(self.total_capital);
        self.trades_in_phase = 0;
        self.errors_in_phase = 0;
        self.phase_started_at = Utc::now();
    }

    /// Halts the bot: no further capital is allocated until a human resumes it.
    pub fn halt(&mut self) {
        self.halted = true;
        self.allocated_capital = Decimal::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_1_allocates_ten_percent() {
        let cm = CapitalManager::start_phase_1(dec!(10_000));
        assert_eq!(cm.allocated_capital(), dec!(1_000));
        assert_eq!(cm.phase(), 1);
    }

    #[test]
    fn advances_after_twenty_clean_trades() {
        let mut cm = CapitalManager::start_phase_1(dec!(10_000));
        for _ in 0..20 {
            cm.record_trade();
        }
        assert!(cm.evaluate_scaling());
        cm.advance_phase();
        assert_eq!(cm.phase(), 2);
        assert_eq!(cm.allocated_capital(), dec!(2_000));
    }

    #[test]
    fn halts_after_three_errors() {
        let mut cm = CapitalManager::start_phase_1(dec!(10_000));
        cm.record_error();
        cm.record_error();
        assert!(!cm.is_halted());
        cm.record_error();
        assert!(cm.is_halted());
        assert_eq!(cm.allocated_capital(), Decimal::ZERO);
    }

    #[test]
    fn allocation_never_exceeds_total_capital() {
        let mut cm = CapitalManager::start_phase_1(dec!(1_000));
        for _ in 0..4 {
            for _ in 0..20 {
                cm.record_trade();
            }
            cm.advance_phase();
        }
        assert!(cm.allocated_capital() <= dec!(1_000));
    }
}
