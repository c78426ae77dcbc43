//! Rules: condition lists with consequences
//!
//! A rule joins K patterns (its join shape, repeats allowed for self-joins) and, for
//! every combination that satisfies all of them, builds its consequence facts from the
//! bound local variables.
//!
//! Facts derived during one join pass are buffered and asserted when the pass ends. The
//! pass holds a read view over the stores, so its own output never feeds back into the
//! enumeration that produced it; later passes and later rules see it.

use crate::condition::{Bindings, EvalContext, Expr, Pattern, Slot, matches_all};
use crate::error::{EngineError, EngineResult};
use crate::fact::{Fact, FactId};
use crate::fact_store::FactBase;
use crate::join::{JoinPasses, JoinVisitor, Touched, iterate_all, iterate_all_with_change_check};
use crate::stats::RunStats;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// When a rule runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    /// Every tick, incrementally
    Ordinary,
    /// Once, from `World::init`, over the full fact set
    Startup,
}

/// Builds one new fact from the bindings of a satisfied combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consequence {
    fact_type: FactId,
    args: Vec<Expr>,
}

impl Consequence {
    pub fn new(fact_type: FactId, args: Vec<Expr>) -> Self {
        Self { fact_type, args }
    }

    /// Consequence whose arguments are the given slots, in order
    pub fn from_slots(fact_type: FactId, slots: &[Slot]) -> Self {
        Self::new(fact_type, slots.iter().map(|slot| Expr::Local(*slot)).collect())
    }

    pub fn fact_type(&self) -> FactId {
        self.fact_type
    }

    pub fn args(&self) -> &[Expr] {
        &self.args
    }

    pub fn build(&self, ctx: &EvalContext<'_, '_>) -> EngineResult<Fact> {
        let args = self.args.iter().map(|arg| arg.eval(ctx)).collect::<EngineResult<Vec<_>>>()?;
        Ok(Fact::new(self.fact_type, args))
    }
}

/// A compiled rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    name: String,
    patterns: Vec<Pattern>,
    consequences: Vec<Consequence>,
    dedupe: Option<bool>,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), patterns: Vec::new(), consequences: Vec::new(), dedupe: None }
    }

    /// Append a join position
    pub fn when(mut self, pattern: Pattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn then(mut self, consequence: Consequence) -> Self {
        self.consequences.push(consequence);
        self
    }

    /// Only assert consequence facts that are not already present
    pub fn dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = Some(dedupe);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn consequences(&self) -> &[Consequence] {
        &self.consequences
    }

    /// Join shape, one fact type per position
    pub fn fact_types(&self) -> Vec<FactId> {
        self.patterns.iter().map(Pattern::fact_type).collect()
    }

    pub fn width(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_dedupe(&self) -> bool {
        self.dedupe.unwrap_or(false)
    }

    pub(crate) fn dedupe_or(&mut self, default: bool) {
        self.dedupe.get_or_insert(default);
    }

    /// Size of the local variable buffer
    pub fn slot_count(&self) -> usize {
        let from_patterns = self.patterns.iter().filter_map(Pattern::max_slot);
        let from_consequences =
            self.consequences.iter().flat_map(|c| c.args.iter()).filter_map(Expr::max_slot);
        from_patterns.chain(from_consequences).max().map_or(0, |slot| slot + 1)
    }

    pub(crate) fn validate(&self, facts: &FactBase) -> EngineResult<()> {
        if self.patterns.is_empty() {
            return Err(EngineError::invalid_rule(&self.name, "rule has no patterns"));
        }
        validate_patterns(&self.name, &self.patterns, facts)?;

        let width = self.width();
        for consequence in &self.consequences {
            let store = facts.store(consequence.fact_type)?;
            if let Some(expected) = store.arity() {
                if expected != consequence.args.len() {
                    return Err(EngineError::ArityMismatch {
                        name: store.name().to_string(),
                        expected,
                        actual: consequence.args.len(),
                    });
                }
            }
            for arg in &consequence.args {
                arg.validate(width, false)
                    .map_err(|message| EngineError::invalid_rule(&self.name, message))?;
            }
        }
        Ok(())
    }

    /// Run over the full fact set of every operand
    pub fn run_full(&self, facts: &mut FactBase) -> EngineResult<RunStats> {
        let mut pass = RulePass::new(self);
        let tuples = {
            let stores = facts.stores_for(&self.fact_types())?;
            iterate_all(&stores, |tuple| pass.visit(tuple))?
        };
        pass.end_pass(facts)?;
        let stats = pass.finish(JoinPasses { passes: 1, pruned: 0, tuples });

        debug!(rule = %self.name, fired = stats.fired, asserted = stats.asserted, "Full-scan run");
        Ok(stats)
    }

    /// Semi-naive run: only combinations that include at least one changed fact
    pub fn run_incremental(
        &self,
        facts: &mut FactBase,
        touched: &Touched,
    ) -> EngineResult<RunStats> {
        let mut pass = RulePass::new(self);
        let counts = iterate_all_with_change_check(facts, &self.fact_types(), touched, &mut pass)?;
        let stats = pass.finish(counts);

        debug!(
            rule = %self.name,
            passes = stats.passes,
            pruned = stats.pruned,
            fired = stats.fired,
            asserted = stats.asserted,
            "Incremental run"
        );
        Ok(stats)
    }
}

/// Evaluates one rule against the tuples of a join, buffering consequences until the
/// pass ends
struct RulePass<'r> {
    rule: &'r Rule,
    bindings: Bindings,
    derived: Vec<Fact>,
    stats: RunStats,
}

impl<'r> RulePass<'r> {
    fn new(rule: &'r Rule) -> Self {
        Self {
            rule,
            bindings: Bindings::with_slots(rule.slot_count()),
            derived: Vec::new(),
            stats: RunStats::default(),
        }
    }

    fn finish(self, counts: JoinPasses) -> RunStats {
        RunStats {
            passes: counts.passes,
            pruned: counts.pruned,
            combinations: counts.tuples,
            ..self.stats
        }
    }
}

impl JoinVisitor for RulePass<'_> {
    fn visit(&mut self, tuple: &[&Fact]) -> EngineResult<()> {
        if matches_all(&self.rule.patterns, tuple, &mut self.bindings)? {
            self.stats.fired += 1;
            let ctx = EvalContext { bindings: &self.bindings, tuple, current: None };
            for consequence in &self.rule.consequences {
                self.derived.push(consequence.build(&ctx)?);
            }
        }
        Ok(())
    }

    fn end_pass(&mut self, facts: &mut FactBase) -> EngineResult<()> {
        let dedupe = self.rule.is_dedupe();
        for fact in self.derived.drain(..) {
            if facts.assert(fact, dedupe)? {
                self.stats.asserted += 1;
            } else {
                self.stats.duplicates += 1;
            }
        }
        Ok(())
    }
}

pub(crate) fn validate_patterns(
    name: &str,
    patterns: &[Pattern],
    facts: &FactBase,
) -> EngineResult<()> {
    for pattern in patterns {
        if !facts.contains_type(pattern.fact_type()) {
            return Err(EngineError::UnknownFactType { fact_type: pattern.fact_type() });
        }
        pattern
            .validate(patterns.len())
            .map_err(|message| EngineError::invalid_rule(name, message))?;
    }
    Ok(())
}
