//! Fact storage with change tracking
//!
//! Each fact type owns a [`FactStore`] split into two disjoint partitions:
//!
//! - **changed**: facts asserted since the last commit boundary
//! - **settled**: facts committed in earlier ticks
//!
//! The semi-naive join reads the two partitions separately; everything else reads
//! [`FactStore::all`], a view over settled followed by changed. Facts are never removed.

use crate::error::{EngineError, EngineResult};
use crate::fact::{Fact, FactId};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Random-access view over up to two consecutive runs of facts.
///
/// Lets [`FactStore::all`] expose `settled ∪ changed` without copying.
#[derive(Debug, Clone, Copy)]
pub struct FactSlice<'a> {
    head: &'a [Fact],
    tail: &'a [Fact],
}

impl<'a> FactSlice<'a> {
    pub fn new(head: &'a [Fact], tail: &'a [Fact]) -> Self {
        Self { head, tail }
    }

    pub fn single(facts: &'a [Fact]) -> Self {
        Self { head: facts, tail: &[] }
    }

    pub fn len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_empty() && self.tail.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a Fact> {
        let (head, tail) = (self.head, self.tail);
        if index < head.len() { head.get(index) } else { tail.get(index - head.len()) }
    }

    /// Unchecked-by-contract access for callers that already bounded `index` by `len()`
    pub(crate) fn at(&self, index: usize) -> &'a Fact {
        let (head, tail) = (self.head, self.tail);
        if index < head.len() { &head[index] } else { &tail[index - head.len()] }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Fact> + use<'a> {
        let (head, tail) = (self.head, self.tail);
        head.iter().chain(tail.iter())
    }
}

/// All live facts of one type, partitioned into changed and settled
#[derive(Debug, Clone)]
pub struct FactStore {
    id: FactId,
    name: String,
    arity: Option<usize>,
    changed: Vec<Fact>,
    settled: Vec<Fact>,
}

impl FactStore {
    pub fn new(id: FactId, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), arity: None, changed: Vec::new(), settled: Vec::new() }
    }

    pub fn id(&self) -> FactId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared arity; `None` until declared or fixed by the first assertion
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    /// Fix the arity of this type. Redeclaring a different arity is a schema error.
    pub fn declare_arity(&mut self, arity: usize) -> EngineResult<()> {
        match self.arity {
            Some(expected) if expected != arity => {
                Err(EngineError::ArityMismatch { name: self.name.clone(), expected, actual: arity })
            }
            _ => {
                self.arity = Some(arity);
                Ok(())
            }
        }
    }

    /// Append a fact to the changed partition
    pub fn assert(&mut self, fact: Fact) -> EngineResult<()> {
        if fact.fact_type() != self.id {
            return Err(EngineError::UnknownFactType { fact_type: fact.fact_type() });
        }
        self.declare_arity(fact.arity())?;
        trace!(fact_type = %self.name, fact = %fact, "Fact asserted");
        self.changed.push(fact);
        Ok(())
    }

    pub fn changed(&self) -> &[Fact] {
        &self.changed
    }

    pub fn settled(&self) -> &[Fact] {
        &self.settled
    }

    /// Settled facts first, then changed ones
    pub fn all(&self) -> FactSlice<'_> {
        FactSlice::new(&self.settled, &self.changed)
    }

    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Linear scan over both partitions
    pub fn contains(&self, fact: &Fact) -> bool {
        self.all().iter().any(|existing| existing == fact)
    }

    pub fn len(&self) -> usize {
        self.changed.len() + self.settled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.settled.is_empty()
    }

    /// Move every changed fact to the end of the settled partition. Returns how many moved.
    pub fn commit(&mut self) -> usize {
        let moved = self.changed.len();
        self.settled.append(&mut self.changed);
        moved
    }

    /// Settle only the changed facts at or after `mark`, leaving earlier ones changed
    pub fn commit_from(&mut self, mark: usize) -> usize {
        if mark >= self.changed.len() {
            return 0;
        }
        let mut tail = self.changed.split_off(mark);
        let moved = tail.len();
        self.settled.append(&mut tail);
        moved
    }
}

/// Registry of fact types and their stores
///
/// Stores are indexed by [`FactId`]; the name table maps both ways.
#[derive(Debug, Clone, Default)]
pub struct FactBase {
    stores: Vec<FactStore>,
    ids: HashMap<String, FactId>,
}

impl FactBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent name interning
    pub fn get_or_allocate_id(&mut self, name: &str) -> FactId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = FactId(self.stores.len() as u32);
        debug!(name, fact_type = %id, "Allocated fact type");
        self.stores.push(FactStore::new(id, name));
        self.ids.insert(name.to_string(), id);
        id
    }

    /// Intern a name and fix its arity
    pub fn declare(&mut self, name: &str, arity: usize) -> EngineResult<FactId> {
        let id = self.get_or_allocate_id(name);
        self.store_mut(id)?.declare_arity(arity)?;
        Ok(id)
    }

    pub fn fact_id(&self, name: &str) -> Option<FactId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: FactId) -> Option<&str> {
        self.stores.get(id.index()).map(FactStore::name)
    }

    pub fn contains_type(&self, id: FactId) -> bool {
        id.index() < self.stores.len()
    }

    pub fn store(&self, id: FactId) -> EngineResult<&FactStore> {
        self.stores.get(id.index()).ok_or(EngineError::UnknownFactType { fact_type: id })
    }

    pub fn store_mut(&mut self, id: FactId) -> EngineResult<&mut FactStore> {
        self.stores.get_mut(id.index()).ok_or(EngineError::UnknownFactType { fact_type: id })
    }

    pub fn stores(&self) -> impl Iterator<Item = &FactStore> {
        self.stores.iter()
    }

    /// Stores for a join shape, in operand order (repeats allowed)
    pub fn stores_for(&self, types: &[FactId]) -> EngineResult<Vec<&FactStore>> {
        types.iter().map(|id| self.store(*id)).collect()
    }

    /// Assert a fact into its store.
    ///
    /// With `dedupe` the fact is only appended when no equal fact exists in the store's
    /// full set. Returns whether the fact was appended.
    pub fn assert(&mut self, fact: Fact, dedupe: bool) -> EngineResult<bool> {
        let store = self.store_mut(fact.fact_type())?;
        if dedupe && store.contains(&fact) {
            trace!(fact_type = %store.name(), fact = %fact, "Duplicate fact skipped");
            return Ok(false);
        }
        store.assert(fact)?;
        Ok(true)
    }

    /// Types whose changed partition is currently non-empty
    pub fn touched_types(&self) -> Vec<FactId> {
        self.stores.iter().filter(|store| store.has_changes()).map(FactStore::id).collect()
    }

    pub fn has_changes(&self, id: FactId) -> bool {
        self.stores.get(id.index()).is_some_and(FactStore::has_changes)
    }

    /// Commit every store. Returns the number of facts that became settled.
    pub fn commit_all(&mut self) -> usize {
        let moved: usize = self.stores.iter_mut().map(FactStore::commit).sum();
        debug!(facts_settled = moved, "Committed fact stores");
        moved
    }

    /// Length of every store's changed partition, indexed by [`FactId`]
    pub fn change_marks(&self) -> Vec<usize> {
        self.stores.iter().map(|store| store.changed().len()).collect()
    }

    /// Settle facts asserted after `marks` were taken. Stores created since count from zero.
    pub fn commit_since(&mut self, marks: &[usize]) -> usize {
        let moved: usize = self
            .stores
            .iter_mut()
            .enumerate()
            .map(|(i, store)| store.commit_from(marks.get(i).copied().unwrap_or(0)))
            .sum();
        debug!(facts_settled = moved, "Committed facts derived since mark");
        moved
    }

    pub fn fact_count(&self) -> usize {
        self.stores.iter().map(FactStore::len).sum()
    }
}
