//! The world: fact stores, registered rules and queries, and the tick driver
//!
//! `World::init` runs startup rules once over the full fact set. Every
//! `World::simulate` call is one tick: ordinary rules run in registration order with the
//! incremental join, then changed facts are committed to settled.

use crate::config::{CommitPolicy, EngineConfig, TouchedTypes};
use crate::error::{EngineError, EngineResult};
use crate::fact::{Fact, FactId};
use crate::fact_store::{FactBase, FactStore};
use crate::join::Touched;
use crate::query::{Query, QueryRow};
use crate::rule::{Rule, RuleKind};
use crate::stats::{RunStats, TickReport, WorldStats};
use sift_types::Value;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Owner of every fact, rule and query
#[derive(Debug, Default)]
pub struct World {
    facts: FactBase,
    rules: Vec<Rule>,
    startup_rules: Vec<Rule>,
    queries: HashMap<String, Query>,
    config: EngineConfig,
    stats: WorldStats,
    initialized: bool,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        info!(
            commit_policy = ?config.commit_policy,
            touched_types = ?config.touched_types,
            "Creating world"
        );
        Self { config, ..Default::default() }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---------------------------------------------------------------------------------------
    // Fact types
    // ---------------------------------------------------------------------------------------

    /// Idempotent name interning
    pub fn get_or_allocate_id(&mut self, name: &str) -> FactId {
        self.facts.get_or_allocate_id(name)
    }

    /// Intern a name and fix its arity
    pub fn declare(&mut self, name: &str, arity: usize) -> EngineResult<FactId> {
        self.facts.declare(name, arity)
    }

    pub fn fact_id(&self, name: &str) -> Option<FactId> {
        self.facts.fact_id(name)
    }

    pub fn fact_name(&self, id: FactId) -> Option<&str> {
        self.facts.name(id)
    }

    pub fn facts(&self) -> &FactBase {
        &self.facts
    }

    pub fn store(&self, id: FactId) -> EngineResult<&FactStore> {
        self.facts.store(id)
    }

    pub fn store_by_name(&self, name: &str) -> Option<&FactStore> {
        self.facts.fact_id(name).and_then(|id| self.facts.store(id).ok())
    }

    // ---------------------------------------------------------------------------------------
    // Assertion
    // ---------------------------------------------------------------------------------------

    /// Assert a built fact. With `dedupe`, equal facts already in the store are skipped.
    pub fn assert_fact(&mut self, fact: Fact, dedupe: bool) -> EngineResult<bool> {
        let appended = self.facts.assert(fact, dedupe)?;
        if appended {
            self.stats.external_assertions += 1;
        }
        Ok(appended)
    }

    /// Assert a fact by type name, interning the name if needed
    pub fn assert<I>(&mut self, name: &str, args: I) -> EngineResult<bool>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let id = self.get_or_allocate_id(name);
        let args: Vec<Value> = args.into_iter().map(Into::into).collect();
        self.assert_fact(Fact::new(id, args), false)
    }

    /// Like [`World::assert`], but skipped when an equal fact already exists
    pub fn assert_if_absent<I>(&mut self, name: &str, args: I) -> EngineResult<bool>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let id = self.get_or_allocate_id(name);
        let args: Vec<Value> = args.into_iter().map(Into::into).collect();
        self.assert_fact(Fact::new(id, args), true)
    }

    // ---------------------------------------------------------------------------------------
    // Rules
    // ---------------------------------------------------------------------------------------

    /// Register an ordinary rule; rules run in registration order
    #[instrument(skip(self, rule), fields(rule = %rule.name()))]
    pub fn add_rule(&mut self, rule: Rule) -> EngineResult<()> {
        self.register(rule, RuleKind::Ordinary)
    }

    /// Register a rule that runs once from `init`
    #[instrument(skip(self, rule), fields(rule = %rule.name()))]
    pub fn add_startup_rule(&mut self, rule: Rule) -> EngineResult<()> {
        self.register(rule, RuleKind::Startup)
    }

    fn register(&mut self, mut rule: Rule, kind: RuleKind) -> EngineResult<()> {
        rule.validate(&self.facts)?;
        rule.dedupe_or(self.config.default_dedupe);
        debug!(width = rule.width(), dedupe = rule.is_dedupe(), ?kind, "Rule registered");
        match kind {
            RuleKind::Ordinary => self.rules.push(rule),
            RuleKind::Startup => self.startup_rules.push(rule),
        }
        Ok(())
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn startup_rules(&self) -> &[Rule] {
        &self.startup_rules
    }

    // ---------------------------------------------------------------------------------------
    // Evaluation
    // ---------------------------------------------------------------------------------------

    /// Run every startup rule once over the full fact set.
    ///
    /// Derived facts stay in the changed partition for the first tick. Returns the number
    /// of facts derived.
    ///
    /// The world counts as initialised once this is called, even if a startup rule fails.
    /// Facts derived by the rules that ran before the failure are kept, and calling `init`
    /// again returns [`EngineError::AlreadyInitialized`] instead of deriving them twice.
    #[instrument(skip(self))]
    pub fn init(&mut self) -> EngineResult<usize> {
        if self.initialized {
            return Err(EngineError::AlreadyInitialized);
        }
        self.initialized = true;

        let mut total = RunStats::default();
        for rule in &self.startup_rules {
            let run = rule.run_full(&mut self.facts).inspect_err(|err| {
                warn!(rule = %rule.name(), category = err.category(), error = %err, "Startup rule failed");
            })?;
            self.stats.startup_runs += 1;
            total.merge(&run);
        }

        info!(
            startup_rules = self.startup_rules.len(),
            fired = total.fired,
            derived = total.asserted,
            "World initialised"
        );
        Ok(total.asserted)
    }

    /// Run one tick.
    ///
    /// A rule error aborts the tick before the commit, leaving every fact asserted so far
    /// in the changed partition. Under [`CommitPolicy::AfterEachRule`] each rule's output is
    /// settled as soon as the rule finishes; facts that were changed when the tick started
    /// stay changed until the tick-end commit.
    #[instrument(skip(self), fields(tick = self.stats.ticks + 1))]
    pub fn simulate(&mut self) -> EngineResult<TickReport> {
        let touched_types = self.facts.touched_types();
        let touched = match self.config.touched_types {
            TouchedTypes::Snapshot => Touched::Snapshot(touched_types.iter().copied().collect()),
            TouchedTypes::Live => Touched::Live,
        };

        let mut report = TickReport {
            tick: self.stats.ticks + 1,
            touched_types,
            ..Default::default()
        };

        let marks = self.facts.change_marks();
        for rule in &self.rules {
            let run = rule.run_incremental(&mut self.facts, &touched).inspect_err(|err| {
                warn!(rule = %rule.name(), category = err.category(), error = %err, "Tick aborted");
            })?;
            self.stats.record_run(&run);
            report.rules.merge(&run);

            if self.config.commit_policy == CommitPolicy::AfterEachRule {
                report.settled += self.facts.commit_since(&marks);
            }
        }
        report.settled += self.facts.commit_all();
        self.stats.ticks = report.tick;

        info!(
            touched = report.touched_types.len(),
            fired = report.rules.fired,
            derived = report.rules.asserted,
            settled = report.settled,
            "Tick complete"
        );
        Ok(report)
    }

    pub fn tick(&self) -> u64 {
        self.stats.ticks
    }

    pub fn stats(&self) -> &WorldStats {
        &self.stats
    }

    // ---------------------------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------------------------

    /// Register a named query, replacing any previous query of that name
    pub fn add_world_query(&mut self, name: &str, query: Query) -> EngineResult<()> {
        query.validate(name, &self.facts)?;
        if self.queries.insert(name.to_string(), query).is_some() {
            debug!(query = name, "Replaced world query");
        }
        Ok(())
    }

    /// Alias of [`World::add_world_query`]
    pub fn register_query(&mut self, name: &str, query: Query) -> EngineResult<()> {
        self.add_world_query(name, query)
    }

    pub fn get_world_query(&self, name: &str) -> Option<&Query> {
        self.queries.get(name)
    }

    /// Re-evaluate a query from scratch and return its rows
    #[instrument(skip(self))]
    pub fn request(&mut self, name: &str) -> EngineResult<&[QueryRow]> {
        let query = self
            .queries
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownQuery { name: name.to_string() })?;
        self.stats.query_requests += 1;
        let rows = query.request(&self.facts)?;
        debug!(rows = rows.len(), "Query evaluated");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{CompareOp, Expr, Pattern};
    use crate::rule::Consequence;

    fn path_world(config: EngineConfig) -> (World, FactId, FactId) {
        let mut world = World::with_config(config);
        let adjacent = world.declare("Adjacent", 2).unwrap();
        let path = world.declare("Path", 2).unwrap();
        world
            .add_rule(
                Rule::new("path")
                    .when(Pattern::new(adjacent).bind(0, 0).bind(1, 1))
                    .when(Pattern::new(adjacent).bind(0, 1).bind(1, 2))
                    .then(Consequence::from_slots(path, &[0, 2])),
            )
            .unwrap();
        (world, adjacent, path)
    }

    fn pairs(store: &FactStore) -> Vec<(i64, i64)> {
        store
            .all()
            .iter()
            .map(|fact| (fact[0].as_int().unwrap(), fact[1].as_int().unwrap()))
            .collect()
    }

    #[test]
    fn test_simulate_derives_only_new_combinations() {
        let (mut world, _, path) = path_world(EngineConfig::default());
        world.assert("Adjacent", [1, 2]).unwrap();
        world.assert("Adjacent", [2, 3]).unwrap();

        let report = world.simulate().unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.rules.asserted, 1);
        assert_eq!(pairs(world.store(path).unwrap()), vec![(1, 3)]);
        assert!(!world.store(path).unwrap().has_changes());

        world.assert("Adjacent", [3, 4]).unwrap();
        let report = world.simulate().unwrap();
        assert_eq!(report.rules.asserted, 1);
        assert_eq!(pairs(world.store(path).unwrap()), vec![(1, 3), (2, 4)]);
        assert_eq!(world.tick(), 2);
    }

    #[test]
    fn test_quiet_tick_runs_no_passes() {
        let (mut world, _, _) = path_world(EngineConfig::default());
        world.assert("Adjacent", [1, 2]).unwrap();
        world.simulate().unwrap();

        let report = world.simulate().unwrap();
        assert!(report.touched_types.is_empty());
        assert_eq!(report.rules.passes, 0);
        assert_eq!(report.rules.pruned, 3);
        assert_eq!(report.settled, 0);
    }

    #[test]
    fn test_init_runs_startup_rules_once() {
        let mut world = World::new();
        let seed = world.declare("Seed", 1).unwrap();
        let grown = world.declare("Grown", 1).unwrap();
        world.assert("Seed", [7]).unwrap();
        world
            .add_startup_rule(
                Rule::new("grow")
                    .when(Pattern::new(seed).bind(0, 0))
                    .then(Consequence::new(grown, vec![Expr::arith(
                        crate::condition::ArithOp::Mul,
                        Expr::local(0),
                        Expr::constant(2),
                    )])),
            )
            .unwrap();

        assert_eq!(world.init().unwrap(), 1);
        let store = world.store(grown).unwrap();
        assert_eq!(store.changed()[0][0], Value::Int(14));
        assert_eq!(world.init().unwrap_err(), EngineError::AlreadyInitialized);
        assert_eq!(world.stats().startup_runs, 1);
    }

    #[test]
    fn test_failed_init_is_not_repeated() {
        let mut world = World::new();
        let seed = world.declare("Seed", 1).unwrap();
        let grown = world.declare("Grown", 1).unwrap();
        world.assert("Seed", [7]).unwrap();
        world
            .add_startup_rule(
                Rule::new("grow")
                    .when(Pattern::new(seed).bind(0, 0))
                    .then(Consequence::from_slots(grown, &[0])),
            )
            .unwrap();
        world
            .add_startup_rule(
                Rule::new("broken")
                    .when(Pattern::new(seed).bind(0, 0))
                    .then(Consequence::from_slots(grown, &[1])),
            )
            .unwrap();

        assert_eq!(world.init().unwrap_err(), EngineError::UnboundVariable { slot: 1 });
        assert_eq!(world.init().unwrap_err(), EngineError::AlreadyInitialized);
        assert_eq!(world.store(grown).unwrap().len(), 1);
        assert_eq!(world.stats().startup_runs, 1);
    }

    #[test]
    fn test_default_dedupe_applies_to_unflagged_rules() {
        let config = EngineConfig { default_dedupe: true, ..Default::default() };
        let (world, _, _) = path_world(config);
        assert!(world.rules()[0].is_dedupe());

        let mut world = World::new();
        let tag = world.declare("Tag", 1).unwrap();
        world
            .add_rule(Rule::new("copy").when(Pattern::new(tag).bind(0, 0)).dedupe(true))
            .unwrap();
        assert!(world.rules()[0].is_dedupe());
    }

    #[test]
    fn test_assert_if_absent() {
        let mut world = World::new();
        assert!(world.assert_if_absent("Flag", ["on"]).unwrap());
        assert!(!world.assert_if_absent("Flag", ["on"]).unwrap());
        assert!(world.assert("Flag", ["on"]).unwrap());
        assert_eq!(world.store_by_name("Flag").unwrap().len(), 2);
        assert_eq!(world.stats().external_assertions, 2);
        assert!(world.store_by_name("Missing").is_none());
    }

    #[test]
    fn test_rule_error_aborts_tick_without_commit() {
        let mut world = World::new();
        let reading = world.declare("Reading", 1).unwrap();
        let alarm = world.declare("Alarm", 1).unwrap();
        world
            .add_rule(
                Rule::new("threshold")
                    .when(Pattern::new(reading).bind(0, 0).compare(
                        CompareOp::Gt,
                        Expr::arg(0),
                        Expr::constant(10),
                    ))
                    .then(Consequence::from_slots(alarm, &[0])),
            )
            .unwrap();
        world.assert("Reading", ["high"]).unwrap();

        let err = world.simulate().unwrap_err();
        assert_eq!(err.category(), "evaluation");
        assert!(world.store(reading).unwrap().has_changes());
        assert_eq!(world.tick(), 0);
    }

    #[test]
    fn test_queries() {
        let mut world = World::new();
        let score = world.declare("Score", 2).unwrap();
        world.assert("Score", [1, 30]).unwrap();
        world.assert("Score", [2, 80]).unwrap();

        let query = crate::query::Query::new().when(
            Pattern::new(score).bind(0, 0).compare(CompareOp::Ge, Expr::arg(1), Expr::constant(50)),
        );
        world.add_world_query("high", query).unwrap();
        assert!(world.get_world_query("high").is_some());

        let rows = world.request("high").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Value::Int(2));
        assert_eq!(world.stats().query_requests, 1);

        assert_eq!(
            world.request("low").unwrap_err(),
            EngineError::UnknownQuery { name: "low".to_string() }
        );
        let empty = crate::query::Query::new();
        assert_eq!(world.register_query("empty", empty).unwrap_err().category(), "rule");
    }
}
