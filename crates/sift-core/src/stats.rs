//! Evaluation counters

use crate::fact::FactId;
use serde::Serialize;

/// Counters from running one rule once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Join passes whose odometer ran
    pub passes: usize,
    /// Join passes skipped by the touched-type or empty-column checks
    pub pruned: usize,
    /// Combinations evaluated against the conditions
    pub combinations: usize,
    /// Combinations that satisfied every condition
    pub fired: usize,
    /// Consequence facts appended to a store
    pub asserted: usize,
    /// Consequence facts dropped by dedupe
    pub duplicates: usize,
}

impl RunStats {
    pub fn merge(&mut self, other: &RunStats) {
        self.passes += other.passes;
        self.pruned += other.pruned;
        self.combinations += other.combinations;
        self.fired += other.fired;
        self.asserted += other.asserted;
        self.duplicates += other.duplicates;
    }
}

/// Lifetime counters of a world
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorldStats {
    pub ticks: u64,
    pub startup_runs: usize,
    pub rule_runs: usize,
    pub rules: RunStats,
    /// Facts injected through the public assert API
    pub external_assertions: usize,
    pub query_requests: usize,
}

impl WorldStats {
    pub fn record_run(&mut self, run: &RunStats) {
        self.rule_runs += 1;
        self.rules.merge(run);
    }

    /// Share of planned join passes that the pruning checks skipped
    pub fn prune_rate(&self) -> f64 {
        let planned = self.rules.passes + self.rules.pruned;
        if planned == 0 { 0.0 } else { self.rules.pruned as f64 / planned as f64 * 100.0 }
    }
}

/// Outcome of one `simulate` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Number of the tick just completed, starting at 1
    pub tick: u64,
    /// Types with changed facts when the tick started
    pub touched_types: Vec<FactId>,
    pub rules: RunStats,
    /// Facts moved from changed to settled by the commit
    pub settled: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_rate() {
        let mut stats = WorldStats::default();
        assert_eq!(stats.prune_rate(), 0.0);
        stats.record_run(&RunStats { passes: 1, pruned: 3, ..Default::default() });
        assert_eq!(stats.rule_runs, 1);
        assert_eq!(stats.prune_rate(), 75.0);
    }
}
