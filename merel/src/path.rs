/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Property path evaluation. The transitive-closure operators run a
//! worklist fixpoint over partial paths; structural combinators are
//! rewritten into joins, unions and endpoint swaps instead of being
//! evaluated directly.

use crate::algebra::bgp::{bind_position, is_temporary, match_triple_pattern};
use crate::binding::Binding;
use crate::context::EvaluationContext;
use crate::error::EvalError;
use crate::join;
use crate::multiset::{Multiset, SolutionSet};
use log::trace;
use rustc_hash::FxHashSet;
use shared::terms::Term;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyPath {
    Predicate(u32),
    Inverse(Box<PropertyPath>),
    Sequence(Box<PropertyPath>, Box<PropertyPath>),
    Alternative(Box<PropertyPath>, Box<PropertyPath>),
    ZeroOrOne(Box<PropertyPath>),
    ZeroOrMore(Box<PropertyPath>),
    OneOrMore(Box<PropertyPath>),
    NegatedPropertySet(Vec<u32>),
    FixedLength(usize, Box<PropertyPath>),
}

/// A triple pattern whose predicate position is a path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    pub start: Term,
    pub path: PropertyPath,
    pub end: Term,
}

static FRESH_VAR: AtomicUsize = AtomicUsize::new(0);

/// Internal variable for path rewrites; trimmed from results.
fn fresh_var() -> String {
    format!("_:p{}", FRESH_VAR.fetch_add(1, Ordering::Relaxed))
}

pub fn evaluate_path(
    pattern: &PathPattern,
    ctx: &EvaluationContext<'_>,
) -> Result<Multiset, EvalError> {
    let result = match &pattern.path {
        PropertyPath::Predicate(p) => {
            let triple = (pattern.start.clone(), Term::Constant(*p), pattern.end.clone());
            Multiset::Ordinary(match_triple_pattern(&triple, ctx, None))
        }
        PropertyPath::NegatedPropertySet(excluded) => {
            negated_property_set(pattern, excluded, ctx)
        }
        PropertyPath::Inverse(inner) => {
            let swapped = PathPattern {
                start: pattern.end.clone(),
                path: (**inner).clone(),
                end: pattern.start.clone(),
            };
            evaluate_path(&swapped, ctx)?
        }
        PropertyPath::Sequence(first, second) => {
            let mid = fresh_var();
            let head = evaluate_path(
                &PathPattern {
                    start: pattern.start.clone(),
                    path: (**first).clone(),
                    end: Term::Variable(mid.clone()),
                },
                ctx,
            )?;
            if head.is_empty() {
                return Ok(Multiset::Null);
            }
            let tail = evaluate_path(
                &PathPattern {
                    start: Term::Variable(mid),
                    path: (**second).clone(),
                    end: pattern.end.clone(),
                },
                ctx,
            )?;
            join::join(head, tail, ctx)?
        }
        PropertyPath::Alternative(left, right) => {
            let l = evaluate_path(
                &PathPattern {
                    start: pattern.start.clone(),
                    path: (**left).clone(),
                    end: pattern.end.clone(),
                },
                ctx,
            )?;
            let r = evaluate_path(
                &PathPattern {
                    start: pattern.start.clone(),
                    path: (**right).clone(),
                    end: pattern.end.clone(),
                },
                ctx,
            )?;
            // with fixed endpoints either branch alone proves existence
            if matches!(l, Multiset::Identity) || matches!(r, Multiset::Identity) {
                Multiset::Identity
            } else {
                join::union(l, r, ctx)?
            }
        }
        PropertyPath::ZeroOrOne(inner) => {
            let zero = zero_length(&pattern.start, &pattern.end, ctx);
            let step = evaluate_path(
                &PathPattern {
                    start: pattern.start.clone(),
                    path: (**inner).clone(),
                    end: pattern.end.clone(),
                },
                ctx,
            )?;
            if matches!(zero, Multiset::Identity) || matches!(step, Multiset::Identity) {
                Multiset::Identity
            } else {
                join::merge(zero, step, ctx)?
            }
        }
        PropertyPath::FixedLength(n, inner) => fixed_length(pattern, *n, inner, ctx)?,
        PropertyPath::OneOrMore(inner) => closure_path(pattern, inner, false, ctx)?,
        PropertyPath::ZeroOrMore(inner) => closure_path(pattern, inner, true, ctx)?,
    };
    Ok(finalize(result, &pattern.start, &pattern.end))
}

/// Erases rewrite-internal variables and collapses fixed-endpoint results
/// to Identity (some path exists) or Null (none does). The endpoints of
/// the current pattern are spared even when they are rewrite-internal:
/// the caller still has to join or read them.
fn finalize(multiset: Multiset, start: &Term, end: &Term) -> Multiset {
    let multiset = trim_internal(multiset, start, end);
    if !start.is_var() && !end.is_var() {
        if multiset.is_empty() {
            Multiset::Null
        } else {
            Multiset::Identity
        }
    } else if multiset.is_empty() {
        Multiset::Null
    } else {
        multiset
    }
}

fn trim_internal(multiset: Multiset, start: &Term, end: &Term) -> Multiset {
    match multiset.materialize() {
        Multiset::Ordinary(mut set) => {
            let keep = |v: &str| start.as_variable() == Some(v) || end.as_variable() == Some(v);
            let temps: Vec<String> = set
                .variables()
                .iter()
                .filter(|v| is_temporary(v) && !keep(v))
                .cloned()
                .collect();
            for var in &temps {
                set.trim(var);
            }
            Multiset::Ordinary(set)
        }
        other => other,
    }
}

fn negated_property_set(
    pattern: &PathPattern,
    excluded: &[u32],
    ctx: &EvaluationContext<'_>,
) -> Multiset {
    let triples = ctx.dataset().match_pattern(
        &ctx.active_graph,
        pattern.start.as_constant(),
        None,
        pattern.end.as_constant(),
    );
    let mut set = SolutionSet::new();
    for term in [&pattern.start, &pattern.end] {
        if let Some(var) = term.as_variable() {
            set.add_variable(var);
        }
    }
    for triple in triples {
        if excluded.contains(&triple.predicate) {
            continue;
        }
        let mut row = Binding::new();
        if bind_position(&mut row, &pattern.start, triple.subject)
            && bind_position(&mut row, &pattern.end, triple.object)
        {
            set.add(row);
        }
    }
    Multiset::Ordinary(set)
}

/// Zero-length path: an identity constraint between the endpoints.
fn zero_length(start: &Term, end: &Term, ctx: &EvaluationContext<'_>) -> Multiset {
    match (start.as_constant(), end.as_constant()) {
        (Some(s), Some(e)) => {
            if s == e {
                Multiset::Identity
            } else {
                Multiset::Null
            }
        }
        (Some(s), None) => singleton_pairs(&[(s, s)], start, end),
        (None, Some(e)) => singleton_pairs(&[(e, e)], start, end),
        (None, None) => {
            let nodes = ctx.dataset().nodes(&ctx.active_graph);
            let pairs: Vec<(u32, u32)> = nodes.into_iter().map(|n| (n, n)).collect();
            singleton_pairs(&pairs, start, end)
        }
    }
}

/// Builds the result multiset from endpoint pairs, binding whichever
/// endpoints are variables. A shared variable name forces equal endpoints.
fn singleton_pairs(pairs: &[(u32, u32)], start: &Term, end: &Term) -> Multiset {
    let mut set = SolutionSet::new();
    for term in [start, end] {
        if let Some(var) = term.as_variable() {
            set.add_variable(var);
        }
    }
    for &(a, b) in pairs {
        let mut row = Binding::new();
        if bind_position(&mut row, start, a) && bind_position(&mut row, end, b) {
            set.add(row);
        }
    }
    Multiset::Ordinary(set)
}

fn fixed_length(
    pattern: &PathPattern,
    n: usize,
    inner: &PropertyPath,
    ctx: &EvaluationContext<'_>,
) -> Result<Multiset, EvalError> {
    if n == 0 {
        return Ok(zero_length(&pattern.start, &pattern.end, ctx));
    }
    // chain n copies of the inner path through internal variables
    let mut acc = Multiset::Identity;
    let mut current = pattern.start.clone();
    for step in 0..n {
        let next = if step + 1 == n { pattern.end.clone() } else { Term::Variable(fresh_var()) };
        let local = evaluate_path(
            &PathPattern { start: current, path: inner.clone(), end: next.clone() },
            ctx,
        )?;
        acc = join::join(acc, local, ctx)?;
        if acc.is_empty() {
            return Ok(Multiset::Null);
        }
        current = next;
        ctx.check_timeout()?;
    }
    Ok(acc)
}

/// One-or-more / zero-or-more via the worklist fixpoint in `Closure`.
fn closure_path(
    pattern: &PathPattern,
    inner: &PropertyPath,
    include_zero: bool,
    ctx: &EvaluationContext<'_>,
) -> Result<Multiset, EvalError> {
    let closure = Closure { inner, ctx };
    let reachable = match (pattern.start.as_constant(), pattern.end.as_constant()) {
        (Some(s), Some(e)) => {
            if include_zero && s == e {
                return Ok(Multiset::Identity);
            }
            let pairs = closure.run(&[s], Some(e))?;
            return if pairs.contains(&(s, e)) {
                Ok(Multiset::Identity)
            } else {
                Ok(Multiset::Null)
            };
        }
        (Some(s), None) => closure.run(&[s], None)?,
        (None, Some(e)) => {
            // traverse backwards from the bound end, then swap the pairs
            let inverted = invert(inner);
            let back = Closure { inner: &inverted, ctx };
            let pairs = back.run(&[e], None)?;
            pairs.into_iter().map(|(a, b)| (b, a)).collect()
        }
        (None, None) => {
            let seeds = closure.seeds()?;
            closure.run(&seeds, None)?
        }
    };

    let steps = singleton_pairs(
        &reachable.into_iter().collect::<Vec<_>>(),
        &pattern.start,
        &pattern.end,
    );
    if include_zero {
        let zero = zero_length(&pattern.start, &pattern.end, ctx);
        join::merge(zero, steps, ctx)
    } else {
        Ok(steps)
    }
}

fn invert(path: &PropertyPath) -> PropertyPath {
    match path {
        PropertyPath::Inverse(inner) => (**inner).clone(),
        other => PropertyPath::Inverse(Box::new(other.clone())),
    }
}

/// The fixpoint worklist. Partial paths are node sequences doubling as
/// cycle-avoidance sets; a path stops growing once it has no successor
/// outside itself.
struct Closure<'a, 'c> {
    inner: &'a PropertyPath,
    ctx: &'a EvaluationContext<'c>,
}

impl Closure<'_, '_> {
    /// Reachable pairs `(seed, node)` over one or more applications of the
    /// inner path. `(seed, seed)` enters only through a genuine cycle.
    /// With a fixed `target`, stops as soon as any path reaches it.
    fn run(
        &self,
        seeds: &[u32],
        target: Option<u32>,
    ) -> Result<FxHashSet<(u32, u32)>, EvalError> {
        let mut pairs: FxHashSet<(u32, u32)> = FxHashSet::default();
        let mut worklist: Vec<Vec<u32>> = seeds.iter().map(|&s| vec![s]).collect();
        while !worklist.is_empty() {
            if self.ctx.deadline_elapsed() {
                if self.ctx.policy().partial_results {
                    trace!("path fixpoint timed out, returning pairs found so far");
                    self.ctx.mark_partial();
                    break;
                }
                return Err(EvalError::Timeout);
            }
            let mut next = Vec::new();
            for path in worklist {
                let head = path[0];
                let tail = path[path.len() - 1];
                for succ in self.successors(tail)? {
                    if path.contains(&succ) {
                        // revisiting the head closes a cycle; anything else
                        // is a shorter loop already covered by other paths
                        if succ == head {
                            pairs.insert((head, head));
                        }
                        continue;
                    }
                    pairs.insert((head, succ));
                    if target == Some(succ) {
                        return Ok(pairs);
                    }
                    let mut grown = path.clone();
                    grown.push(succ);
                    next.push(grown);
                }
            }
            worklist = next;
        }
        Ok(pairs)
    }

    /// One-step successors of `node` under the inner path.
    fn successors(&self, node: u32) -> Result<Vec<u32>, EvalError> {
        match self.inner {
            PropertyPath::Predicate(p) => {
                Ok(self.ctx.dataset().objects_for(&self.ctx.active_graph, node, *p))
            }
            PropertyPath::Inverse(inner) => {
                if let PropertyPath::Predicate(p) = &**inner {
                    return Ok(self.ctx.dataset().subjects_for(&self.ctx.active_graph, *p, node));
                }
                self.successors_general(node)
            }
            _ => self.successors_general(node),
        }
    }

    /// Falls back to full path evaluation for composite inner paths.
    fn successors_general(&self, node: u32) -> Result<Vec<u32>, EvalError> {
        let out = fresh_var();
        let result = evaluate_path(
            &PathPattern {
                start: Term::Constant(node),
                path: self.inner.clone(),
                end: Term::Variable(out.clone()),
            },
            self.ctx,
        )?;
        let mut successors = Vec::new();
        if let Some(set) = result.as_solutions() {
            for row in set.iter() {
                if let Some(value) = row.value(&out) {
                    successors.push(value);
                }
            }
        }
        successors.sort_unstable();
        successors.dedup();
        Ok(successors)
    }

    /// Seed nodes when neither endpoint is bound: every node with at least
    /// one outgoing step under the inner path.
    fn seeds(&self) -> Result<Vec<u32>, EvalError> {
        if let PropertyPath::Predicate(p) = self.inner {
            let mut subjects: Vec<u32> = self
                .ctx
                .dataset()
                .match_pattern(&self.ctx.active_graph, None, Some(*p), None)
                .into_iter()
                .map(|t| t.subject)
                .collect();
            subjects.sort_unstable();
            subjects.dedup();
            return Ok(subjects);
        }
        let start = fresh_var();
        let end = fresh_var();
        let result = evaluate_path(
            &PathPattern {
                start: Term::Variable(start.clone()),
                path: self.inner.clone(),
                end: Term::Variable(end),
            },
            self.ctx,
        )?;
        let mut seeds = Vec::new();
        if let Some(set) = result.as_solutions() {
            for row in set.iter() {
                if let Some(value) = row.value(&start) {
                    seeds.push(value);
                }
            }
        }
        seeds.sort_unstable();
        seeds.dedup();
        Ok(seeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::dataset::Dataset;
    use shared::dictionary::Dictionary;
    use shared::triple::Triple;

    fn var(name: &str) -> Term {
        Term::Variable(name.to_string())
    }

    #[test]
    fn fixed_endpoints_collapse_to_identity_or_null() {
        let mut dict = Dictionary::new();
        let (a, b, c, p) =
            (dict.encode("a"), dict.encode("b"), dict.encode("c"), dict.encode("p"));
        let mut dataset = Dataset::new();
        dataset.insert(Triple::new(a, p, b));
        dataset.insert(Triple::new(b, p, c));
        let ctx = EvaluationContext::new(&dataset, &dict);

        let reachable = PathPattern {
            start: Term::Constant(a),
            path: PropertyPath::OneOrMore(Box::new(PropertyPath::Predicate(p))),
            end: Term::Constant(c),
        };
        assert_eq!(evaluate_path(&reachable, &ctx).unwrap(), Multiset::Identity);

        let unreachable = PathPattern { start: Term::Constant(c), end: Term::Constant(a), ..reachable };
        assert_eq!(evaluate_path(&unreachable, &ctx).unwrap(), Multiset::Null);
    }

    #[test]
    fn sequence_rewrites_through_an_internal_variable() {
        let mut dict = Dictionary::new();
        let (a, b, c) = (dict.encode("a"), dict.encode("b"), dict.encode("c"));
        let (p, q) = (dict.encode("p"), dict.encode("q"));
        let mut dataset = Dataset::new();
        dataset.insert(Triple::new(a, p, b));
        dataset.insert(Triple::new(b, q, c));
        let ctx = EvaluationContext::new(&dataset, &dict);

        let pattern = PathPattern {
            start: var("s"),
            path: PropertyPath::Sequence(
                Box::new(PropertyPath::Predicate(p)),
                Box::new(PropertyPath::Predicate(q)),
            ),
            end: var("o"),
        };
        let result = evaluate_path(&pattern, &ctx).unwrap();
        assert_eq!(result.count(), 1);
        let vars = result.variables();
        assert!(vars.iter().all(|v| v == "s" || v == "o"), "internal variable leaked: {vars:?}");
    }
}
