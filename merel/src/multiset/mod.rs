/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

mod grouped;
mod partitioned;

pub use grouped::GroupSet;
pub use partitioned::PartitionedSet;

use crate::binding::Binding;
use crate::error::EvalError;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A bag of solution rows sharing a variable scope. The four algebraic
/// variants behave as identity/absorbing elements of the join algebra;
/// the closed enum keeps operator dispatch exhaustive.
#[derive(Debug, Clone)]
pub enum Multiset {
    /// The neutral element for Join/Product: one conceptual empty solution.
    Identity,
    /// The absorbing empty multiset: no solutions, and no further
    /// evaluation can change that.
    Null,
    Ordinary(SolutionSet),
    Grouped(GroupSet),
    Partitioned(PartitionedSet),
}

impl Multiset {
    pub fn count(&self) -> usize {
        match self {
            Multiset::Identity => 1,
            Multiset::Null => 0,
            Multiset::Ordinary(s) => s.count(),
            Multiset::Grouped(g) => g.keys().count(),
            Multiset::Partitioned(p) => p.count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Multiset::Identity => false,
            Multiset::Null => true,
            Multiset::Ordinary(s) => s.is_empty(),
            Multiset::Grouped(g) => g.keys().is_empty(),
            Multiset::Partitioned(p) => p.count() == 0,
        }
    }

    pub fn variables(&self) -> Vec<String> {
        match self {
            Multiset::Identity | Multiset::Null => Vec::new(),
            Multiset::Ordinary(s) => s.variables().to_vec(),
            Multiset::Grouped(g) => g.keys().variables().to_vec(),
            Multiset::Partitioned(p) => p.variables(),
        }
    }

    pub fn contains_variable(&self, var: &str) -> bool {
        self.variables().iter().any(|v| v == var)
    }

    pub fn is_disjoint_with(&self, other: &Multiset) -> bool {
        let theirs = other.variables();
        !self.variables().iter().any(|v| theirs.contains(v))
    }

    /// Adds a row. Degenerate and read-only variants reject this as a
    /// structural error.
    pub fn add(&mut self, row: Binding) -> Result<usize, EvalError> {
        match self {
            Multiset::Identity => Err(EvalError::Structural("cannot add a row to the identity multiset")),
            Multiset::Null => Err(EvalError::Structural("cannot add a row to the null multiset")),
            Multiset::Grouped(_) => Err(EvalError::Structural("a grouped multiset is a read-only view")),
            Multiset::Partitioned(_) => {
                Err(EvalError::Structural("rows enter a partitioned multiset through its partitions"))
            }
            Multiset::Ordinary(s) => Ok(s.add(row)),
        }
    }

    pub fn remove(&mut self, id: usize) -> Result<(), EvalError> {
        match self {
            Multiset::Ordinary(s) => {
                s.remove(id);
                Ok(())
            }
            _ => Err(EvalError::Structural("rows can only be removed from an ordinary multiset")),
        }
    }

    /// Converts view/partitioned variants into an ordinary multiset so the
    /// result can be trimmed, sorted or mutated. Identity/Null/Ordinary
    /// pass through unchanged.
    pub fn materialize(self) -> Multiset {
        match self {
            Multiset::Grouped(g) => Multiset::Ordinary(g.into_keys()),
            Multiset::Partitioned(p) => Multiset::Ordinary(p.flatten()),
            other => other,
        }
    }

    pub fn as_solutions(&self) -> Option<&SolutionSet> {
        match self {
            Multiset::Ordinary(s) => Some(s),
            _ => None,
        }
    }

    /// Rows as canonical maps, for order-insensitive comparisons.
    pub fn canonical_rows(&self) -> Vec<BTreeMap<String, u32>> {
        let canon = |row: &Binding| -> BTreeMap<String, u32> {
            row.variables()
                .into_iter()
                .filter_map(|v| row.value(&v).map(|t| (v, t)))
                .collect()
        };
        let mut rows: Vec<BTreeMap<String, u32>> = match self {
            Multiset::Identity => vec![BTreeMap::new()],
            Multiset::Null => Vec::new(),
            Multiset::Ordinary(s) => s.iter().map(canon).collect(),
            Multiset::Grouped(g) => g.keys().iter().map(canon).collect(),
            Multiset::Partitioned(p) => p.snapshot().iter().map(canon).collect(),
        };
        rows.sort();
        rows
    }
}

/// Bag equality: same degenerate variant, or the same variable scope and
/// the same rows regardless of IDs, ordering and row representation.
impl PartialEq for Multiset {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Multiset::Identity, Multiset::Identity) => true,
            (Multiset::Null, Multiset::Null) => true,
            (Multiset::Identity, _) | (_, Multiset::Identity) => false,
            (Multiset::Null, _) | (_, Multiset::Null) => false,
            _ => {
                let mut mine = self.variables();
                let mut theirs = other.variables();
                mine.sort();
                theirs.sort();
                mine == theirs && self.canonical_rows() == other.canonical_rows()
            }
        }
    }
}

impl Eq for Multiset {}

/// The ordinary multiset variant: an indexed bag of rows. IDs are assigned
/// from a monotonic counter and never reused, even after removal.
#[derive(Debug, Clone, Default)]
pub struct SolutionSet {
    variables: Vec<String>,
    rows: FxHashMap<usize, Binding>,
    counter: usize,
    ordered_ids: Option<Vec<usize>>,
}

impl SolutionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variables<I, S>(variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for var in variables {
            set.add_variable(&var.into());
        }
        set
    }

    pub fn add_variable(&mut self, var: &str) {
        if !self.variables.iter().any(|v| v == var) {
            self.variables.push(var.to_string());
        }
    }

    /// Adds a row under a fresh ID, widening the scope with any variables
    /// the row carries.
    pub fn add(&mut self, mut row: Binding) -> usize {
        self.counter += 1;
        let id = self.counter;
        row.set_id(id);
        for var in row.variables() {
            self.add_variable(&var);
        }
        if let Some(order) = &mut self.ordered_ids {
            order.push(id);
        }
        self.rows.insert(id, row);
        id
    }

    /// Re-inserts a row under an externally assigned ID (used when
    /// flattening partitioned multisets). The ID must be unused.
    pub(crate) fn insert_raw(&mut self, id: usize, row: Binding) {
        debug_assert!(!self.rows.contains_key(&id));
        for var in row.variables() {
            self.add_variable(&var);
        }
        self.counter = self.counter.max(id);
        self.rows.insert(id, row);
    }

    pub fn remove(&mut self, id: usize) {
        self.rows.remove(&id);
        if let Some(order) = &mut self.ordered_ids {
            order.retain(|&i| i != id);
        }
    }

    pub fn row(&self, id: usize) -> Option<&Binding> {
        self.rows.get(&id)
    }

    pub fn ids(&self) -> Vec<usize> {
        match &self.ordered_ids {
            Some(order) => order.clone(),
            None => self.rows.keys().copied().collect(),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = &Binding> + '_> {
        match &self.ordered_ids {
            Some(order) => Box::new(order.iter().filter_map(move |id| self.rows.get(id))),
            None => Box::new(self.rows.values()),
        }
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn contains_variable(&self, var: &str) -> bool {
        self.variables.iter().any(|v| v == var)
    }

    /// Drops a variable from the scope and from every row. Used to erase
    /// internal/temporary variables; IDs are preserved.
    pub fn trim(&mut self, var: &str) {
        self.variables.retain(|v| v != var);
        for row in self.rows.values_mut() {
            row.unbind(var);
        }
    }

    /// Makes iteration follow insertion order from this point on. Used by
    /// operators that must not disturb an ordering already imposed
    /// upstream (slicing, duplicate removal).
    pub fn keep_insertion_order(&mut self) {
        if self.ordered_ids.is_none() {
            self.ordered_ids = Some(self.ids());
        }
    }

    /// Reorders iteration by an external comparator; `None` clears the
    /// ordering.
    pub fn sort_by<F>(&mut self, comparator: Option<F>)
    where
        F: FnMut(&Binding, &Binding) -> Ordering,
    {
        match comparator {
            Some(mut cmp) => {
                let mut ids: Vec<usize> = self.rows.keys().copied().collect();
                ids.sort_by(|a, b| cmp(&self.rows[a], &self.rows[b]));
                self.ordered_ids = Some(ids);
            }
            None => self.ordered_ids = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_never_reused() {
        let mut set = SolutionSet::new();
        let a = set.add(Binding::from_pairs([("x", 1u32)]));
        let b = set.add(Binding::from_pairs([("x", 2u32)]));
        assert_ne!(a, b);
        set.remove(a);
        let c = set.add(Binding::from_pairs([("x", 3u32)]));
        assert_ne!(c, a);
        assert_ne!(c, b);
    }

    #[test]
    fn trim_drops_variable_from_scope_and_rows() {
        let mut set = SolutionSet::new();
        set.add(Binding::from_pairs([("x", 1u32), ("tmp", 9)]));
        set.trim("tmp");
        assert!(!set.contains_variable("tmp"));
        assert!(set.iter().all(|row| !row.contains("tmp")));
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn degenerate_multisets_reject_mutation() {
        let row = Binding::from_pairs([("x", 1u32)]);
        assert!(matches!(Multiset::Identity.add(row.clone()), Err(EvalError::Structural(_))));
        assert!(matches!(Multiset::Null.add(row), Err(EvalError::Structural(_))));
    }

    #[test]
    fn sorted_iteration_follows_comparator() {
        let mut set = SolutionSet::new();
        set.add(Binding::from_pairs([("x", 3u32)]));
        set.add(Binding::from_pairs([("x", 1u32)]));
        set.add(Binding::from_pairs([("x", 2u32)]));
        set.sort_by(Some(|a: &Binding, b: &Binding| a.value("x").cmp(&b.value("x"))));
        let values: Vec<u32> = set.iter().map(|r| r.value("x").unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }
}
