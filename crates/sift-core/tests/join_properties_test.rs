//! Join Enumeration Properties
//!
//! Checks the full-scan and incremental joins, and a rule run on top of the incremental
//! join, against a brute-force Cartesian product over randomly partitioned stores,
//! including self-joins where one store fills several positions.

use proptest::prelude::*;
use sift_core::{
    Consequence, EngineResult, Fact, FactBase, FactId, JoinVisitor, Pattern, Rule, Touched, Value,
    iterate_all, iterate_all_with_change_check,
};
use std::collections::BTreeSet;

/// Settled and changed fact counts for each of three fact types
type Partitions = Vec<(usize, usize)>;

/// Facts carry a unique serial so tuples can be compared by identity
fn build(partitions: &[(usize, usize)]) -> (FactBase, Vec<FactId>) {
    let mut facts = FactBase::new();
    let ids: Vec<FactId> =
        (0..partitions.len()).map(|i| facts.declare(&format!("T{i}"), 1).unwrap()).collect();

    let mut serial = 0;
    for (id, &(settled, _)) in ids.iter().zip(partitions) {
        for _ in 0..settled {
            facts.assert(Fact::new(*id, vec![Value::Int(serial)]), false).unwrap();
            serial += 1;
        }
    }
    facts.commit_all();
    for (id, &(_, changed)) in ids.iter().zip(partitions) {
        for _ in 0..changed {
            facts.assert(Fact::new(*id, vec![Value::Int(serial)]), false).unwrap();
            serial += 1;
        }
    }
    (facts, ids)
}

fn serials(tuple: &[&Fact]) -> Vec<i64> {
    tuple.iter().map(|fact| fact[0].as_int().unwrap()).collect()
}

#[derive(Default)]
struct Recorder {
    visited: Vec<Vec<i64>>,
}

impl JoinVisitor for Recorder {
    fn visit(&mut self, tuple: &[&Fact]) -> EngineResult<()> {
        self.visited.push(serials(tuple));
        Ok(())
    }
}

/// Tuples with at least one changed fact, sorted
fn expected_changed_tuples(facts: &FactBase, shape: &[FactId]) -> Vec<Vec<i64>> {
    let changed = changed_serials(facts);
    let mut expected: Vec<Vec<i64>> = reference_product(facts, shape)
        .into_iter()
        .filter(|tuple| tuple.iter().any(|serial| changed.contains(serial)))
        .collect();
    expected.sort();
    expected
}

fn serials_of(fact: &Fact) -> Vec<i64> {
    fact.args().iter().map(|value| value.as_int().unwrap()).collect()
}

/// Every tuple over `all()`, position 0 varying fastest
fn reference_product(facts: &FactBase, shape: &[FactId]) -> Vec<Vec<i64>> {
    let columns: Vec<Vec<i64>> = shape
        .iter()
        .map(|id| {
            let store = facts.store(*id).unwrap();
            store.all().iter().map(|fact| fact[0].as_int().unwrap()).collect()
        })
        .collect();

    let total: usize = columns.iter().map(Vec::len).product();
    (0..total)
        .map(|mut n| {
            columns
                .iter()
                .map(|column| {
                    let value = column[n % column.len()];
                    n /= column.len();
                    value
                })
                .collect()
        })
        .collect()
}

fn changed_serials(facts: &FactBase) -> BTreeSet<i64> {
    facts
        .stores()
        .flat_map(|store| store.changed().iter().map(|fact| fact[0].as_int().unwrap()))
        .collect()
}

fn scenario() -> impl Strategy<Value = (Partitions, Vec<usize>)> {
    (
        prop::collection::vec((0usize..4, 0usize..4), 3),
        prop::collection::vec(0usize..3, 1..=3),
    )
}

proptest! {
    #[test]
    fn test_incremental_join_visits_each_changed_tuple_once((partitions, shape) in scenario()) {
        let (mut facts, ids) = build(&partitions);
        let shape: Vec<FactId> = shape.iter().map(|&i| ids[i]).collect();
        let touched = Touched::snapshot(&facts);

        let mut recorder = Recorder::default();
        let counts =
            iterate_all_with_change_check(&mut facts, &shape, &touched, &mut recorder).unwrap();
        let expected = expected_changed_tuples(&facts, &shape);

        let mut visited = recorder.visited;
        prop_assert_eq!(counts.tuples, visited.len());
        prop_assert_eq!(counts.passes + counts.pruned, (1usize << shape.len()) - 1);
        visited.sort();
        prop_assert_eq!(visited, expected);
    }

    #[test]
    fn test_rule_derives_one_fact_per_changed_tuple((partitions, shape) in scenario()) {
        let (mut facts, ids) = build(&partitions);
        let shape: Vec<FactId> = shape.iter().map(|&i| ids[i]).collect();
        let out = facts.declare("Out", shape.len()).unwrap();
        let expected = expected_changed_tuples(&facts, &shape);

        // Every position binds its own slot, so every combination fires
        let slots: Vec<usize> = (0..shape.len()).collect();
        let rule = shape
            .iter()
            .enumerate()
            .fold(Rule::new("copy"), |rule, (slot, id)| rule.when(Pattern::new(*id).bind(0, slot)))
            .then(Consequence::from_slots(out, &slots));

        let touched = Touched::snapshot(&facts);
        let stats = rule.run_incremental(&mut facts, &touched).unwrap();

        let mut derived: Vec<Vec<i64>> =
            facts.store(out).unwrap().changed().iter().map(serials_of).collect();
        derived.sort();
        prop_assert_eq!(stats.combinations, expected.len());
        prop_assert_eq!(stats.fired, expected.len());
        prop_assert_eq!(stats.asserted, expected.len());
        prop_assert_eq!(derived, expected);
    }

    #[test]
    fn test_full_scan_matches_reference_order((partitions, shape) in scenario()) {
        let (facts, ids) = build(&partitions);
        let shape: Vec<FactId> = shape.iter().map(|&i| ids[i]).collect();
        let stores = facts.stores_for(&shape).unwrap();

        let mut visited = Vec::new();
        let count = iterate_all(&stores, |tuple| {
            visited.push(serials(tuple));
            Ok(())
        })
        .unwrap();

        prop_assert_eq!(count, visited.len());
        prop_assert_eq!(visited, reference_product(&facts, &shape));
    }
}

#[test]
fn test_full_scan_sizes_two_three_one() {
    let (facts, ids) = build(&[(2, 0), (3, 0), (1, 0)]);
    let stores = facts.stores_for(&ids).unwrap();

    let mut visited = Vec::new();
    iterate_all(&stores, |tuple| {
        visited.push(serials(tuple));
        Ok(())
    })
    .unwrap();

    assert_eq!(
        visited,
        vec![
            vec![0, 2, 5],
            vec![1, 2, 5],
            vec![0, 3, 5],
            vec![1, 3, 5],
            vec![0, 4, 5],
            vec![1, 4, 5],
        ]
    );
}

#[test]
fn test_self_join_with_one_changed_fact() {
    // Two settled facts and one changed fact of the same type, joined with itself
    let (mut facts, ids) = build(&[(2, 1)]);
    let touched = Touched::snapshot(&facts);

    let mut recorder = Recorder::default();
    iterate_all_with_change_check(&mut facts, &[ids[0], ids[0]], &touched, &mut recorder)
        .unwrap();

    // {0}: changed x settled, {1}: settled x changed, {0,1}: changed x changed
    assert_eq!(
        recorder.visited,
        vec![vec![2, 0], vec![2, 1], vec![0, 2], vec![1, 2], vec![2, 2]]
    );
}

#[test]
fn test_nothing_visited_without_changes() {
    let (mut facts, ids) = build(&[(3, 0), (2, 0)]);
    let touched = Touched::snapshot(&facts);

    let mut recorder = Recorder::default();
    let counts = iterate_all_with_change_check(&mut facts, &ids, &touched, &mut recorder).unwrap();
    assert!(recorder.visited.is_empty());
    assert_eq!(counts.passes, 0);
    assert_eq!(counts.pruned, 3);
}
