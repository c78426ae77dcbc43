//! Combinatorial N-way join
//!
//! Two enumeration strategies share one odometer:
//!
//! - **Full scan** ([`iterate_all`]): the Cartesian product of every operand's full fact
//!   set. Used by startup rules and queries.
//! - **Incremental** ([`iterate_all_with_change_check`]): semi-naive evaluation. For every
//!   non-empty subset `S` of operand positions, positions in `S` draw from the changed
//!   partition and the rest from the settled partition. Because the two partitions are
//!   disjoint, every tuple containing at least one changed fact belongs to exactly one
//!   subset, and tuples made only of settled facts are never produced.
//!
//! The odometer advances position 0 fastest. That order decides the order in which rule
//! consequences are asserted, so it is part of the engine's observable behaviour.

use crate::error::EngineResult;
use crate::fact::{Fact, FactId};
use crate::fact_store::{FactBase, FactSlice, FactStore};
use std::collections::BTreeSet;
use tracing::trace;

/// Visit every tuple of the Cartesian product of `columns`, position 0 fastest.
///
/// Nothing is visited when any column is empty (or there are no columns). Returns the
/// number of tuples visited.
pub fn odometer<'a, F>(columns: &[FactSlice<'a>], mut visit: F) -> EngineResult<usize>
where
    F: FnMut(&[&'a Fact]) -> EngineResult<()>,
{
    if columns.is_empty() || columns.iter().any(FactSlice::is_empty) {
        return Ok(0);
    }

    let width = columns.len();
    let mut indices = vec![0usize; width];
    let mut tuple: Vec<&'a Fact> = columns.iter().map(|column| column.at(0)).collect();
    let mut visited = 0;

    loop {
        visit(&tuple)?;
        visited += 1;

        // Increment position 0, carrying left to right on overflow
        let mut position = 0;
        loop {
            indices[position] += 1;
            if indices[position] < columns[position].len() {
                tuple[position] = columns[position].at(indices[position]);
                break;
            }
            indices[position] = 0;
            tuple[position] = columns[position].at(0);
            position += 1;
            if position == width {
                return Ok(visited);
            }
        }
    }
}

/// Strictly increasing subsets of `0..width`, by size `1..=width`, lexicographic within a size.
///
/// A subset names the positions that draw from the changed partition in one incremental pass.
#[derive(Debug, Clone)]
pub struct ChangeSubsets {
    width: usize,
    indices: Vec<usize>,
    exhausted: bool,
}

impl ChangeSubsets {
    pub fn new(width: usize) -> Self {
        Self { width, indices: vec![0], exhausted: width == 0 }
    }

    fn advance(&mut self) {
        let size = self.indices.len();
        // Rightmost position still below its upper bound `width - size + position`
        for position in (0..size).rev() {
            if self.indices[position] < self.width - size + position {
                self.indices[position] += 1;
                for next in position + 1..size {
                    self.indices[next] = self.indices[next - 1] + 1;
                }
                return;
            }
        }

        if size == self.width {
            self.exhausted = true;
        } else {
            self.indices = (0..=size).collect();
        }
    }
}

impl Iterator for ChangeSubsets {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.exhausted {
            return None;
        }
        let current = self.indices.clone();
        self.advance();
        Some(current)
    }
}

/// Which fact types count as touched during an incremental pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Touched {
    /// Fixed set, usually taken at the start of a tick
    Snapshot(BTreeSet<FactId>),
    /// Whatever currently has a non-empty changed partition
    Live,
}

impl Touched {
    pub fn snapshot(facts: &FactBase) -> Self {
        Touched::Snapshot(facts.touched_types().into_iter().collect())
    }

    pub fn contains(&self, facts: &FactBase, id: FactId) -> bool {
        match self {
            Touched::Snapshot(ids) => ids.contains(&id),
            Touched::Live => facts.has_changes(id),
        }
    }
}

/// Full fact set of every operand
pub fn all_columns<'a>(stores: &[&'a FactStore]) -> Vec<FactSlice<'a>> {
    stores.iter().map(|store| store.all()).collect()
}

/// Changed partition at positions in `subset`, settled partition everywhere else
pub fn select_columns<'a>(stores: &[&'a FactStore], subset: &[usize]) -> Vec<FactSlice<'a>> {
    stores
        .iter()
        .enumerate()
        .map(|(position, store)| {
            if subset.contains(&position) {
                FactSlice::single(store.changed())
            } else {
                FactSlice::single(store.settled())
            }
        })
        .collect()
}

/// Counters from one incremental enumeration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinPasses {
    /// Subsets whose odometer ran
    pub passes: usize,
    /// Subsets skipped because an operand was untouched or a column was empty
    pub pruned: usize,
    /// Tuples handed to the visitor
    pub tuples: usize,
}

/// Full-scan join over `all()` of every operand
pub fn iterate_all<'a, F>(stores: &[&'a FactStore], visit: F) -> EngineResult<usize>
where
    F: FnMut(&[&'a Fact]) -> EngineResult<()>,
{
    odometer(&all_columns(stores), visit)
}

/// Receives the tuples of a join, one pass at a time
pub trait JoinVisitor {
    fn visit(&mut self, tuple: &[&Fact]) -> EngineResult<()>;

    /// Called after every pass that ran, with write access to the fact base.
    ///
    /// Facts asserted here are visible to the passes that follow.
    fn end_pass(&mut self, _facts: &mut FactBase) -> EngineResult<()> {
        Ok(())
    }
}

/// Incremental join over the join shape `types`: every tuple with at least one changed
/// fact, each exactly once.
///
/// Subsets that put an untouched type in a changed position are pruned without looking
/// at the stores. Columns are fetched fresh for every pass, so facts asserted by
/// [`JoinVisitor::end_pass`] show up in later passes.
pub fn iterate_all_with_change_check<V: JoinVisitor>(
    facts: &mut FactBase,
    types: &[FactId],
    touched: &Touched,
    visitor: &mut V,
) -> EngineResult<JoinPasses> {
    let mut counts = JoinPasses::default();
    for subset in ChangeSubsets::new(types.len()) {
        if subset.iter().any(|&position| !touched.contains(&*facts, types[position])) {
            counts.pruned += 1;
            continue;
        }

        let tuples = {
            let stores = facts.stores_for(types)?;
            let columns = select_columns(&stores, &subset);
            if columns.iter().any(FactSlice::is_empty) {
                counts.pruned += 1;
                continue;
            }
            odometer(&columns, |tuple| visitor.visit(tuple))?
        };
        counts.passes += 1;
        counts.tuples += tuples;
        trace!(?subset, tuples, "Incremental pass");

        visitor.end_pass(facts)?;
    }
    Ok(counts)
}
