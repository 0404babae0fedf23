/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Hash-based join algebra over binding multisets: Join, LeftJoin, Minus,
//! ExistsJoin, Product and Union. The degenerate-operand shortcuts at the
//! top of each operator are load-bearing; every operator must reproduce
//! them exactly.

use crate::binding::Binding;
use crate::context::EvaluationContext;
use crate::error::EvalError;
use crate::expression::Expression;
use crate::multiset::{Multiset, PartitionedSet, SolutionSet};
use log::trace;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

pub fn shared_variables(left: &Multiset, right: &Multiset) -> Vec<String> {
    let theirs = right.variables();
    left.variables()
        .into_iter()
        .filter(|v| theirs.contains(v))
        .collect()
}

fn union_variables(left: &Multiset, right: &Multiset) -> Vec<String> {
    let mut vars = left.variables();
    for var in right.variables() {
        if !vars.contains(&var) {
            vars.push(var);
        }
    }
    vars
}

fn solutions(multiset: &Multiset) -> Result<&SolutionSet, EvalError> {
    multiset
        .as_solutions()
        .ok_or(EvalError::Structural("expected an ordinary multiset after materialization"))
}

/// Turns Identity into a one-empty-row ordinary multiset so the general
/// row-wise algorithms apply; other variants just materialize.
fn materialize_rows(multiset: Multiset) -> Multiset {
    match multiset {
        Multiset::Identity => {
            let mut set = SolutionSet::new();
            set.add(Binding::new());
            Multiset::Ordinary(set)
        }
        other => other.materialize(),
    }
}

/// Per-join-variable index over one side of a join: bound term -> row IDs,
/// plus the rows where the variable is unbound. An unbound join variable
/// is compatible with any value, so the unbound list is unioned into every
/// lookup for that variable.
struct JoinIndex {
    vars: Vec<String>,
    values: Vec<FxHashMap<u32, Vec<usize>>>,
    nulls: Vec<Vec<usize>>,
    all_ids: Vec<usize>,
}

impl JoinIndex {
    fn build(set: &SolutionSet, vars: &[String]) -> JoinIndex {
        let mut values = vec![FxHashMap::default(); vars.len()];
        let mut nulls = vec![Vec::new(); vars.len()];
        let mut all_ids = Vec::with_capacity(set.count());
        for row in set.iter() {
            all_ids.push(row.id());
            for (i, var) in vars.iter().enumerate() {
                match row.value(var) {
                    Some(term) => values[i].entry(term).or_insert_with(Vec::new).push(row.id()),
                    None => nulls[i].push(row.id()),
                }
            }
        }
        JoinIndex { vars: vars.to_vec(), values, nulls, all_ids }
    }

    /// Candidate row IDs possibly compatible with `probe`: per variable
    /// the bound matches unioned with the unbound list, intersected across
    /// all join variables. Candidates still need the full compatibility
    /// check before composing.
    fn candidates(&self, probe: &Binding) -> Vec<usize> {
        let mut current: Option<FxHashSet<usize>> = None;
        for (i, var) in self.vars.iter().enumerate() {
            let step: FxHashSet<usize> = match probe.value(var) {
                Some(term) => {
                    let bound = self.values[i].get(&term).map(|ids| ids.as_slice()).unwrap_or(&[]);
                    bound.iter().chain(self.nulls[i].iter()).copied().collect()
                }
                // an unbound probe variable matches every indexed row
                None => self.all_ids.iter().copied().collect(),
            };
            current = Some(match current {
                None => step,
                Some(prev) => prev.intersection(&step).copied().collect(),
            });
            if current.as_ref().map_or(false, |c| c.is_empty()) {
                break;
            }
        }
        current.map(|c| c.into_iter().collect()).unwrap_or_default()
    }
}

/// Inner join. Degenerate rules: Identity is neutral, Null/empty is
/// absorbing. Disjoint variable scopes degrade to a cross product.
pub fn join(
    left: Multiset,
    right: Multiset,
    ctx: &EvaluationContext<'_>,
) -> Result<Multiset, EvalError> {
    match &right {
        Multiset::Identity => return Ok(left),
        Multiset::Null => return Ok(Multiset::Null),
        other if other.is_empty() => return Ok(Multiset::Null),
        _ => {}
    }
    match &left {
        Multiset::Identity => return Ok(right),
        Multiset::Null => return Ok(Multiset::Null),
        other if other.is_empty() => return Ok(Multiset::Null),
        _ => {}
    }

    let join_vars = shared_variables(&left, &right);
    if join_vars.is_empty() {
        trace!("join degrades to product: operands share no variables");
        return product(left, right, ctx);
    }

    let scope = union_variables(&left, &right);
    let left = left.materialize();
    let right = right.materialize();
    let lset = solutions(&left)?;
    let rset = solutions(&right)?;

    let index = JoinIndex::build(lset, &join_vars);
    ctx.check_timeout()?;

    let mut out = SolutionSet::with_variables(scope);
    if ctx.policy().parallel {
        let probes: Vec<&Binding> = rset.iter().collect();
        let composed: Vec<Binding> = probes
            .par_iter()
            .flat_map_iter(|probe| {
                let join_vars = &join_vars;
                index.candidates(probe).into_iter().filter_map(move |id| {
                    lset.row(id)
                        .filter(|row| row.is_compatible_with(probe, join_vars))
                        .map(|row| row.compose(probe))
                })
            })
            .collect();
        for row in composed {
            out.add(row);
        }
    } else {
        for probe in rset.iter() {
            for id in index.candidates(probe) {
                if let Some(row) = lset.row(id) {
                    if row.is_compatible_with(probe, &join_vars) {
                        out.add(row.compose(probe));
                    }
                }
            }
        }
    }
    ctx.check_timeout()?;
    Ok(Multiset::Ordinary(out))
}

fn filter_holds(
    filter: Option<&Expression>,
    row: &Binding,
    ctx: &EvaluationContext<'_>,
) -> bool {
    match filter {
        None => true,
        // expression errors are treated as false (fail-closed)
        Some(expr) => expr
            .effective_boolean_value(row, ctx.dictionary())
            .unwrap_or(false),
    }
}

/// OPTIONAL. Every left row contributes at least one output row: either
/// one composed row per compatible right row passing the filter, or a
/// standalone copy of the left row when no candidate passes.
pub fn left_join(
    left: Multiset,
    right: Multiset,
    filter: Option<&Expression>,
    ctx: &EvaluationContext<'_>,
) -> Result<Multiset, EvalError> {
    match &right {
        Multiset::Identity | Multiset::Null => return Ok(left),
        other if other.is_empty() => return Ok(left),
        _ => {}
    }
    if matches!(left, Multiset::Null) || left.is_empty() {
        return Ok(left);
    }

    let join_vars = shared_variables(&left, &right);
    let scope = union_variables(&left, &right);
    let left = materialize_rows(left);
    let right = right.materialize();
    let lset = solutions(&left)?;
    let rset = solutions(&right)?;

    if join_vars.is_empty() {
        return left_join_product(lset, rset, &scope, filter, ctx);
    }

    // index the right side, then drive from the left so that unmatched
    // left rows survive
    let index = JoinIndex::build(rset, &join_vars);
    ctx.check_timeout()?;

    let emit = |x: &Binding| -> Vec<Binding> {
        let mut rows = Vec::new();
        let mut matched = false;
        for id in index.candidates(x) {
            if let Some(y) = rset.row(id) {
                if x.is_compatible_with(y, &join_vars) {
                    let z = x.compose(y);
                    if filter_holds(filter, &z, ctx) {
                        rows.push(z);
                        matched = true;
                    }
                }
            }
        }
        if !matched {
            rows.push(x.copy());
        }
        rows
    };

    let mut out = SolutionSet::with_variables(scope);
    if ctx.policy().parallel {
        let rows: Vec<&Binding> = lset.iter().collect();
        let produced: Vec<Binding> = rows.par_iter().flat_map_iter(|x| emit(x)).collect();
        for row in produced {
            out.add(row);
        }
    } else {
        for x in lset.iter() {
            for row in emit(x) {
                out.add(row);
            }
        }
    }
    ctx.check_timeout()?;
    Ok(Multiset::Ordinary(out))
}

/// The disjoint-scope LeftJoin: a cross product filtered as it is built,
/// with the standalone fallback per left row. The parallel form writes
/// into a partitioned multiset, one partition per left row.
fn left_join_product(
    lset: &SolutionSet,
    rset: &SolutionSet,
    scope: &[String],
    filter: Option<&Expression>,
    ctx: &EvaluationContext<'_>,
) -> Result<Multiset, EvalError> {
    if ctx.policy().parallel {
        // one slot per right row plus one for the standalone fallback
        let pset = PartitionedSet::new(lset.count(), rset.count() + 1);
        pset.add_variables(scope.iter().cloned());
        let rows: Vec<&Binding> = lset.iter().collect();
        rows.par_iter().try_for_each(|x| -> Result<(), EvalError> {
            let base = pset.next_base_id();
            let mut id = base;
            let mut matched = false;
            for y in rset.iter() {
                let z = x.compose(y);
                if filter_holds(filter, &z, ctx) {
                    let mut z = z;
                    z.set_id(id);
                    id += 1;
                    pset.add(z)?;
                    matched = true;
                }
            }
            if !matched {
                let mut standalone = x.copy();
                standalone.set_id(id);
                pset.add(standalone)?;
            }
            Ok(())
        })?;
        ctx.check_timeout()?;
        return Ok(Multiset::Partitioned(pset));
    }

    let mut out = SolutionSet::with_variables(scope.iter().cloned());
    for x in lset.iter() {
        let mut matched = false;
        for y in rset.iter() {
            let z = x.compose(y);
            if filter_holds(filter, &z, ctx) {
                out.add(z);
                matched = true;
            }
        }
        if !matched {
            out.add(x.copy());
        }
    }
    ctx.check_timeout()?;
    Ok(Multiset::Ordinary(out))
}

/// SPARQL MINUS. A left row is removed when some right row is
/// minus-compatible with it: compatible on the shared variables with at
/// least one of them bound and equal on both sides. Operands with fully
/// disjoint scopes remove everything (the right operand is known non-empty
/// by the time the scopes are compared).
pub fn minus(
    left: Multiset,
    right: Multiset,
    ctx: &EvaluationContext<'_>,
) -> Result<Multiset, EvalError> {
    match &right {
        Multiset::Identity | Multiset::Null => return Ok(left),
        other if other.is_empty() => return Ok(left),
        _ => {}
    }
    if matches!(left, Multiset::Null) || left.is_empty() {
        return Ok(left);
    }

    let join_vars = shared_variables(&left, &right);
    if join_vars.is_empty() {
        trace!("minus over disjoint scopes with a non-empty right operand removes everything");
        return Ok(Multiset::Null);
    }

    let left = left.materialize();
    let right = right.materialize();
    let lset = solutions(&left)?;
    let rset = solutions(&right)?;

    let index = JoinIndex::build(lset, &join_vars);
    ctx.check_timeout()?;

    let mut to_minus: FxHashSet<usize> = FxHashSet::default();
    for probe in rset.iter() {
        for id in index.candidates(probe) {
            if to_minus.contains(&id) {
                continue;
            }
            if let Some(row) = lset.row(id) {
                if row.is_minus_compatible_with(probe, &join_vars) {
                    to_minus.insert(id);
                }
            }
        }
    }
    ctx.check_timeout()?;

    if to_minus.len() == lset.count() {
        return Ok(Multiset::Null);
    }
    if to_minus.is_empty() {
        return Ok(left);
    }
    let mut out = SolutionSet::with_variables(lset.variables().iter().cloned());
    for row in lset.iter() {
        if !to_minus.contains(&row.id()) {
            out.add(row.copy());
        }
    }
    Ok(Multiset::Ordinary(out))
}

/// FILTER EXISTS / NOT EXISTS. Filters the left multiset on whether a
/// compatible right row exists; never binds new variables, so the output
/// scope is the left scope.
pub fn exists_join(
    left: Multiset,
    right: Multiset,
    must_exist: bool,
    ctx: &EvaluationContext<'_>,
) -> Result<Multiset, EvalError> {
    match &right {
        Multiset::Identity => return Ok(left),
        Multiset::Null => return if must_exist { Ok(Multiset::Null) } else { Ok(left) },
        other if other.is_empty() => {
            return if must_exist { Ok(Multiset::Null) } else { Ok(left) };
        }
        _ => {}
    }
    if matches!(left, Multiset::Null) || left.is_empty() {
        return Ok(left);
    }

    let join_vars = shared_variables(&left, &right);
    if join_vars.is_empty() {
        // all disjoint solutions are compatible with the non-empty right
        return if must_exist { Ok(left) } else { Ok(Multiset::Null) };
    }

    let left = left.materialize();
    let right = right.materialize();
    let lset = solutions(&left)?;
    let rset = solutions(&right)?;

    let index = JoinIndex::build(lset, &join_vars);
    ctx.check_timeout()?;

    let mut exists: FxHashSet<usize> = FxHashSet::default();
    for probe in rset.iter() {
        for id in index.candidates(probe) {
            if exists.contains(&id) {
                continue;
            }
            if let Some(row) = lset.row(id) {
                if row.is_compatible_with(probe, &join_vars) {
                    exists.insert(id);
                }
            }
        }
    }
    ctx.check_timeout()?;

    // everything matched or nothing matched collapses without copying
    if exists.len() == lset.count() {
        return if must_exist { Ok(left) } else { Ok(Multiset::Null) };
    }
    if exists.is_empty() {
        return if must_exist { Ok(Multiset::Null) } else { Ok(left) };
    }
    let mut out = SolutionSet::with_variables(lset.variables().iter().cloned());
    for row in lset.iter() {
        if exists.contains(&row.id()) == must_exist {
            out.add(row.copy());
        }
    }
    Ok(Multiset::Ordinary(out))
}

/// Unconditional cross product. In parallel mode the larger side is
/// partitioned so each worker owns a private ID range.
pub fn product(
    left: Multiset,
    right: Multiset,
    ctx: &EvaluationContext<'_>,
) -> Result<Multiset, EvalError> {
    match &right {
        Multiset::Identity => return Ok(left),
        Multiset::Null => return Ok(Multiset::Null),
        other if other.is_empty() => return Ok(Multiset::Null),
        _ => {}
    }
    match &left {
        Multiset::Identity => return Ok(right),
        Multiset::Null => return Ok(Multiset::Null),
        other if other.is_empty() => return Ok(Multiset::Null),
        _ => {}
    }

    let scope = union_variables(&left, &right);
    let left = left.materialize();
    let right = right.materialize();
    let lset = solutions(&left)?;
    let rset = solutions(&right)?;

    if ctx.policy().parallel {
        let (outer, inner) = if lset.count() >= rset.count() { (lset, rset) } else { (rset, lset) };
        let pset = PartitionedSet::new(outer.count(), inner.count());
        pset.add_variables(scope);
        let rows: Vec<&Binding> = outer.iter().collect();
        rows.par_iter().try_for_each(|x| -> Result<(), EvalError> {
            let mut id = pset.next_base_id();
            for y in inner.iter() {
                let mut z = x.compose(y);
                z.set_id(id);
                pset.add(z)?;
                id += 1;
            }
            Ok(())
        })?;
        ctx.check_timeout()?;
        return Ok(Multiset::Partitioned(pset));
    }

    let mut out = SolutionSet::with_variables(scope);
    for x in lset.iter() {
        for y in rset.iter() {
            out.add(x.compose(y));
        }
    }
    ctx.check_timeout()?;
    Ok(Multiset::Ordinary(out))
}

/// Bag union: every right row is copied into the left multiset's backing
/// store under a fresh ID; duplicates are preserved.
pub fn union(
    left: Multiset,
    right: Multiset,
    ctx: &EvaluationContext<'_>,
) -> Result<Multiset, EvalError> {
    match &right {
        Multiset::Identity | Multiset::Null => return Ok(left),
        other if other.is_empty() => return Ok(left),
        _ => {}
    }
    if matches!(left, Multiset::Identity | Multiset::Null) {
        return Ok(right);
    }

    let left = left.materialize();
    let right = right.materialize();
    let mut out = match left {
        Multiset::Ordinary(set) => set,
        _ => return Err(EvalError::Structural("expected an ordinary multiset after materialization")),
    };
    let rset = solutions(&right)?;
    for var in rset.variables() {
        out.add_variable(var);
    }
    for row in rset.iter() {
        out.add(row.copy());
    }
    ctx.check_timeout()?;
    Ok(Multiset::Ordinary(out))
}

/// Duplicate-avoiding union. A right row is skipped when the left multiset
/// already holds a row equal to it on the left scope; used where set
/// semantics are required (e.g. assembling zero-or-one path solutions).
pub fn merge(
    left: Multiset,
    right: Multiset,
    ctx: &EvaluationContext<'_>,
) -> Result<Multiset, EvalError> {
    match &right {
        Multiset::Identity | Multiset::Null => return Ok(left),
        other if other.is_empty() => return Ok(left),
        _ => {}
    }
    if matches!(left, Multiset::Identity) {
        return Ok(left);
    }
    if matches!(left, Multiset::Null) || left.is_empty() {
        return Ok(right);
    }

    let left = left.materialize();
    let right = right.materialize();
    let mut out = match left {
        Multiset::Ordinary(set) => set,
        _ => return Err(EvalError::Structural("expected an ordinary multiset after materialization")),
    };
    let rset = solutions(&right)?;

    // compare right rows trimmed to the left scope so hashes line up
    let scope: Vec<String> = out.variables().to_vec();
    let trim = |row: &Binding| -> Binding {
        let pairs = scope.iter().filter_map(|v| row.value(v).map(|t| (v.clone(), t)));
        Binding::from_pairs(pairs)
    };
    let mut seen: FxHashSet<Binding> = out.iter().map(|row| trim(row)).collect();
    for row in rset.iter() {
        if seen.insert(trim(row)) {
            out.add(row.copy());
        }
    }
    ctx.check_timeout()?;
    Ok(Multiset::Ordinary(out))
}
