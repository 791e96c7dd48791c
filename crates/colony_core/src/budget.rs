//! Per-tick compute budget.
//!
//! The tick driver asks the budget before each agent. When the budget says
//! stop, the remaining agents are skipped for this tick; every agent's work
//! is self-contained, so skipping only delays it.

/// Decides whether the per-agent loop may continue.
pub trait CpuBudget {
    /// Called before processing an agent, with the number already processed
    /// this tick.
    fn should_continue(&mut self, processed: usize) -> bool;
}

/// Never truncates.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl CpuBudget for Unlimited {
    fn should_continue(&mut self, _processed: usize) -> bool {
        true
    }
}

/// Processes at most `n` agents per tick.
#[derive(Debug, Clone, Copy)]
pub struct AgentQuota(pub usize);

impl CpuBudget for AgentQuota {
    fn should_continue(&mut self, processed: usize) -> bool {
        processed < self.0
    }
}

impl<F: FnMut(usize) -> bool> CpuBudget for F {
    fn should_continue(&mut self, processed: usize) -> bool {
        self(processed)
    }
}
