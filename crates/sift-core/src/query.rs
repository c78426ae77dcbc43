//! Pull-based queries
//!
//! A query shares the rule's condition machinery but has no consequences. Every
//! [`Query::request`] re-evaluates from scratch over the full fact set and snapshots the
//! bindings of each satisfying combination into a [`QueryRow`].

use crate::condition::{Bindings, Pattern, matches_all};
use crate::error::{EngineError, EngineResult};
use crate::fact::FactId;
use crate::fact_store::FactBase;
use crate::join::iterate_all;
use crate::rule::validate_patterns;
use serde::Serialize;
use sift_types::Value;
use std::ops::Index;

/// Bound local variables of one satisfying combination; unset slots hold `Value::None`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QueryRow(Vec<Value>);

impl QueryRow {
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn get(&self, slot: usize) -> Option<&Value> {
        self.0.get(slot)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.0.iter().map(serde_json::Value::from).collect())
    }
}

impl Index<usize> for QueryRow {
    type Output = Value;

    fn index(&self, slot: usize) -> &Value {
        &self.0[slot]
    }
}

/// A compiled query
#[derive(Debug, Clone, Default)]
pub struct Query {
    patterns: Vec<Pattern>,
    rows: Vec<QueryRow>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(mut self, pattern: Pattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn fact_types(&self) -> Vec<FactId> {
        self.patterns.iter().map(Pattern::fact_type).collect()
    }

    pub fn slot_count(&self) -> usize {
        self.patterns.iter().filter_map(Pattern::max_slot).max().map_or(0, |slot| slot + 1)
    }

    /// Rows from the most recent request
    pub fn rows(&self) -> &[QueryRow] {
        &self.rows
    }

    /// Clear the previous rows and re-run a full-scan join.
    ///
    /// The returned rows stay valid until the next request.
    pub fn request(&mut self, facts: &FactBase) -> EngineResult<&[QueryRow]> {
        self.rows.clear();
        let stores = facts.stores_for(&self.fact_types())?;
        let mut bindings = Bindings::with_slots(self.slot_count());
        let patterns = &self.patterns;
        let rows = &mut self.rows;

        iterate_all(&stores, |tuple| {
            if matches_all(patterns, tuple, &mut bindings)? {
                rows.push(QueryRow(bindings.snapshot()));
            }
            Ok(())
        })?;
        Ok(&self.rows)
    }

    pub(crate) fn validate(&self, name: &str, facts: &FactBase) -> EngineResult<()> {
        if self.patterns.is_empty() {
            return Err(EngineError::invalid_rule(name, "query has no patterns"));
        }
        validate_patterns(name, &self.patterns, facts)
    }
}
