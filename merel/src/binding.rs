/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::error::EvalError;
use rustc_hash::{FxHashMap, FxHasher};
use std::hash::{Hash, Hasher};

/// Row storage. A composed row wraps the two rows a join produced it from
/// without copying their entries; it is flattened on demand when the row
/// has to be mutated.
#[derive(Debug, Clone)]
enum Row {
    Flat(FxHashMap<String, u32>),
    Composed(Box<Binding>, Box<Binding>),
}

/// One candidate solution row: a partial mapping from variable name to an
/// encoded RDF term. The ID is unique within the owning multiset and is
/// assigned when the row is added to one.
#[derive(Debug, Clone)]
pub struct Binding {
    id: usize,
    row: Row,
}

impl Default for Binding {
    fn default() -> Self {
        Self::new()
    }
}

impl Binding {
    pub fn new() -> Self {
        Self { id: 0, row: Row::Flat(FxHashMap::default()) }
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let map = pairs.into_iter().map(|(v, t)| (v.into(), t)).collect();
        Self { id: 0, row: Row::Flat(map) }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: usize) {
        self.id = id;
    }

    /// Binds a variable. Fails if the variable is already set; rebinding
    /// is a programming error, not a query-time condition.
    pub fn bind(&mut self, var: &str, value: u32) -> Result<(), EvalError> {
        if self.contains(var) {
            return Err(EvalError::AlreadyBound(var.to_string()));
        }
        self.flatten();
        if let Row::Flat(map) = &mut self.row {
            map.insert(var.to_string(), value);
        }
        Ok(())
    }

    pub fn value(&self, var: &str) -> Option<u32> {
        match &self.row {
            Row::Flat(map) => map.get(var).copied(),
            Row::Composed(left, right) => left.value(var).or_else(|| right.value(var)),
        }
    }

    pub fn contains(&self, var: &str) -> bool {
        self.value(var).is_some()
    }

    pub fn unbind(&mut self, var: &str) {
        self.flatten();
        if let Row::Flat(map) = &mut self.row {
            map.remove(var);
        }
    }

    /// Join-composition: the result's value for a variable is this row's
    /// value if bound here, otherwise the other row's. Compatibility is the
    /// caller's responsibility; composition does not re-validate it.
    pub fn compose(&self, other: &Binding) -> Binding {
        Binding {
            id: 0,
            row: Row::Composed(Box::new(self.clone()), Box::new(other.clone())),
        }
    }

    /// Deep, materialized copy with flat storage.
    pub fn copy(&self) -> Binding {
        let mut map = FxHashMap::default();
        self.collect_into(&mut map);
        Binding { id: self.id, row: Row::Flat(map) }
    }

    /// Collapses a composed row into flat storage in place.
    pub fn flatten(&mut self) {
        if let Row::Composed(_, _) = self.row {
            let mut map = FxHashMap::default();
            self.collect_into(&mut map);
            self.row = Row::Flat(map);
        }
    }

    fn collect_into(&self, out: &mut FxHashMap<String, u32>) {
        match &self.row {
            Row::Flat(map) => {
                for (var, value) in map {
                    out.entry(var.clone()).or_insert(*value);
                }
            }
            Row::Composed(left, right) => {
                // left wins on overlap
                left.collect_into(out);
                right.collect_into(out);
            }
        }
    }

    fn collect_pairs<'a>(&'a self, out: &mut FxHashMap<&'a str, u32>) {
        match &self.row {
            Row::Flat(map) => {
                for (var, value) in map {
                    out.entry(var.as_str()).or_insert(*value);
                }
            }
            Row::Composed(left, right) => {
                left.collect_pairs(out);
                right.collect_pairs(out);
            }
        }
    }

    fn pairs(&self) -> FxHashMap<&str, u32> {
        let mut out = FxHashMap::default();
        self.collect_pairs(&mut out);
        out
    }

    pub fn variables(&self) -> Vec<String> {
        self.pairs().keys().map(|v| (*v).to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.pairs().len()
    }

    pub fn is_empty(&self) -> bool {
        match &self.row {
            Row::Flat(map) => map.is_empty(),
            Row::Composed(left, right) => left.is_empty() && right.is_empty(),
        }
    }

    /// Join compatibility over the given variables: for each variable
    /// either side may be unbound (unbound is a wildcard, unlike SQL NULL),
    /// otherwise the bound values must agree.
    pub fn is_compatible_with(&self, other: &Binding, vars: &[String]) -> bool {
        vars.iter().all(|var| match (self.value(var), other.value(var)) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => true,
        })
    }

    /// MINUS compatibility: at least one of the variables must be bound on
    /// both sides with equal values, in addition to plain compatibility.
    /// Rows sharing no common bound variable are not a MINUS match.
    pub fn is_minus_compatible_with(&self, other: &Binding, vars: &[String]) -> bool {
        vars.iter().any(|var| {
            matches!((self.value(var), other.value(var)), (Some(a), Some(b)) if a == b)
        }) && self.is_compatible_with(other, vars)
    }
}

/// Equality over the (variable, value) pairs actually present; the ID and
/// the flat/composed representation are irrelevant. A variable bound on one
/// side but absent on the other makes the rows unequal.
impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        self.pairs() == other.pairs()
    }
}

impl Eq for Binding {}

impl Hash for Binding {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // order-independent combination so flat and composed rows holding
        // the same pairs hash alike
        let mut acc: u64 = 0;
        for (var, value) in self.pairs() {
            let mut h = FxHasher::default();
            var.hash(&mut h);
            value.hash(&mut h);
            acc ^= h.finish();
        }
        state.write_u64(acc);
    }
}
