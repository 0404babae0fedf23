/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The algebra operator tree. Every node evaluates to a binding multiset;
//! binary nodes fork child contexts so branches never share mutable
//! input/output slots, and in parallel mode run on scoped worker threads.

pub mod bgp;
pub mod streaming;

pub use bgp::PatternStep;
pub use streaming::BgpStream;

use crate::binding::Binding;
use crate::context::EvaluationContext;
use crate::error::EvalError;
use crate::expression::Expression;
use crate::join;
use crate::multiset::{GroupSet, Multiset, SolutionSet};
use crate::path::{self, PathPattern};
use log::debug;
use rustc_hash::FxHashSet;
use shared::dataset::ActiveGraph;
use std::cmp::Ordering;
use std::mem;

/// One ORDER BY key: an expression plus direction. Rows where the
/// expression errors sort before all others, like unbound values.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderComparator {
    pub expression: Expression,
    pub ascending: bool,
}

/// Graph scoping: a fixed dataset view, or a variable ranging over the
/// dataset's named graphs.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphSpec {
    Fixed(ActiveGraph),
    Var(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Algebra {
    Bgp(Vec<PatternStep>),
    Path(PathPattern),
    Join(Box<Algebra>, Box<Algebra>),
    LeftJoin(Box<Algebra>, Box<Algebra>, Option<Expression>),
    Union(Box<Algebra>, Box<Algebra>),
    Minus(Box<Algebra>, Box<Algebra>),
    Filter(Expression, Box<Algebra>),
    Exists { inner: Box<Algebra>, pattern: Box<Algebra>, must_exist: bool },
    Extend(Box<Algebra>, String, Expression),
    Project(Box<Algebra>, Vec<String>),
    OrderBy(Box<Algebra>, Vec<OrderComparator>),
    Slice { inner: Box<Algebra>, offset: usize, limit: Option<usize> },
    Group(Box<Algebra>, Vec<String>),
    Distinct(Box<Algebra>),
    Reduced(Box<Algebra>),
    Graph(GraphSpec, Box<Algebra>),
    Table(Vec<String>, Vec<Binding>),
}

impl Algebra {
    /// Evaluates this node against the context's input multiset, writing
    /// the result to the output slot. The input slot is consumed; callers
    /// set it before each evaluation and take the output afterwards.
    pub fn evaluate(&self, ctx: &mut EvaluationContext<'_>) -> Result<(), EvalError> {
        let input = mem::replace(&mut ctx.input, Multiset::Identity);
        ctx.output = self.eval_with(ctx, input)?;
        Ok(())
    }

    fn eval_with(
        &self,
        ctx: &EvaluationContext<'_>,
        input: Multiset,
    ) -> Result<Multiset, EvalError> {
        ctx.check_timeout()?;
        match self {
            Algebra::Bgp(steps) => bgp::evaluate_bgp(steps, ctx, input),
            Algebra::Path(pattern) => {
                let local = path::evaluate_path(pattern, ctx)?;
                ctx.check_timeout()?;
                join::join(input, local, ctx)
            }
            Algebra::Join(left, right) => {
                if ctx.policy().parallel {
                    let (l, r) = eval_parallel(left, right, ctx, input)?;
                    return join::join(l, r, ctx);
                }
                let l = eval_branch(left, ctx, input.clone())?;
                // a Null left side cannot be resurrected by the right
                if matches!(l, Multiset::Null) {
                    debug!("join short-circuits on a null left operand");
                    return Ok(Multiset::Null);
                }
                let r = eval_branch(right, ctx, input)?;
                join::join(l, r, ctx)
            }
            Algebra::LeftJoin(left, right, filter) => {
                if ctx.policy().parallel {
                    let (l, r) = eval_parallel(left, right, ctx, input)?;
                    return join::left_join(l, r, filter.as_ref(), ctx);
                }
                let l = eval_branch(left, ctx, input.clone())?;
                if matches!(l, Multiset::Null) || l.is_empty() {
                    return Ok(l);
                }
                let r = eval_branch(right, ctx, input)?;
                join::left_join(l, r, filter.as_ref(), ctx)
            }
            Algebra::Union(left, right) => {
                // Null-left says nothing about the right side
                let (l, r) = if ctx.policy().parallel {
                    eval_parallel(left, right, ctx, input)?
                } else {
                    let l = eval_branch(left, ctx, input.clone())?;
                    let r = eval_branch(right, ctx, input)?;
                    (l, r)
                };
                join::union(l, r, ctx)
            }
            Algebra::Minus(left, right) => {
                let l = eval_branch(left, ctx, input.clone())?;
                if matches!(l, Multiset::Null) || l.is_empty() {
                    return Ok(l);
                }
                let r = eval_branch(right, ctx, input)?;
                join::minus(l, r, ctx)
            }
            Algebra::Filter(expr, inner) => {
                let result = eval_branch(inner, ctx, input)?;
                apply_filter(expr, result, ctx)
            }
            Algebra::Exists { inner, pattern, must_exist } => {
                let l = eval_branch(inner, ctx, input.clone())?;
                if matches!(l, Multiset::Null) || l.is_empty() {
                    return Ok(l);
                }
                let r = eval_branch(pattern, ctx, input)?;
                join::exists_join(l, r, *must_exist, ctx)
            }
            Algebra::Extend(inner, var, expr) => {
                let result = eval_branch(inner, ctx, input)?;
                extend(result, var, expr, ctx)
            }
            Algebra::Project(inner, vars) => {
                let result = eval_branch(inner, ctx, input)?;
                project(result, vars)
            }
            Algebra::OrderBy(inner, comparators) => {
                let result = eval_branch(inner, ctx, input)?;
                order_by(result, comparators, ctx)
            }
            Algebra::Slice { inner, offset, limit } => {
                let result = eval_branch(inner, ctx, input)?;
                slice(result, *offset, *limit)
            }
            Algebra::Group(inner, vars) => {
                let result = eval_branch(inner, ctx, input)?;
                group(result, vars)
            }
            Algebra::Distinct(inner) => {
                let result = eval_branch(inner, ctx, input)?;
                distinct(result)
            }
            Algebra::Reduced(inner) => {
                let result = eval_branch(inner, ctx, input)?;
                reduced(result)
            }
            Algebra::Graph(spec, inner) => eval_graph(spec, inner, ctx, input),
            Algebra::Table(vars, rows) => {
                // inline data keeps the order it was written in
                let mut set = SolutionSet::with_variables(vars.iter().cloned());
                set.keep_insertion_order();
                for row in rows {
                    set.add(row.copy());
                }
                join::join(input, Multiset::Ordinary(set), ctx)
            }
        }
    }
}

/// Evaluates a child node in a forked context. In partial-results mode a
/// timed-out branch degrades to Null and flags the evaluation as partial
/// instead of failing.
fn eval_branch(
    node: &Algebra,
    ctx: &EvaluationContext<'_>,
    input: Multiset,
) -> Result<Multiset, EvalError> {
    let mut branch = ctx.fork_branch(input);
    match node.evaluate(&mut branch) {
        Ok(()) => Ok(branch.take_output()),
        Err(EvalError::Timeout) if ctx.policy().partial_results => {
            ctx.mark_partial();
            Ok(Multiset::Null)
        }
        Err(e) => Err(e),
    }
}

/// Fork/join evaluation of two independent subtrees on scoped worker
/// threads. The right branch receives a private copy of the shared input;
/// the parent blocks on both and propagates the first error.
fn eval_parallel(
    left: &Algebra,
    right: &Algebra,
    ctx: &EvaluationContext<'_>,
    input: Multiset,
) -> Result<(Multiset, Multiset), EvalError> {
    let right_input = input.clone();
    let (l, r) = crossbeam::scope(|scope| {
        let lh = scope.spawn(move |_| eval_branch(left, ctx, input));
        let rh = scope.spawn(move |_| eval_branch(right, ctx, right_input));
        let l = lh.join().unwrap_or(Err(EvalError::Structural("evaluation worker panicked")));
        let r = rh.join().unwrap_or(Err(EvalError::Structural("evaluation worker panicked")));
        (l, r)
    })
    .map_err(|_| EvalError::Structural("evaluation worker panicked"))?;
    Ok((l?, r?))
}

/// Keeps the rows whose effective boolean value is true; expression
/// errors drop the row (fail-closed). A filter over Identity tests the
/// single empty solution.
pub(crate) fn apply_filter(
    expr: &Expression,
    multiset: Multiset,
    ctx: &EvaluationContext<'_>,
) -> Result<Multiset, EvalError> {
    match multiset {
        Multiset::Identity => {
            let row = Binding::new();
            if expr.effective_boolean_value(&row, ctx.dictionary()).unwrap_or(false) {
                Ok(Multiset::Identity)
            } else {
                Ok(Multiset::Null)
            }
        }
        Multiset::Null => Ok(Multiset::Null),
        other => {
            let set = into_solutions(other)?;
            let mut out = SolutionSet::with_variables(set.variables().iter().cloned());
            for row in set.iter() {
                if expr.effective_boolean_value(row, ctx.dictionary()).unwrap_or(false) {
                    out.add(row.copy());
                }
            }
            ctx.check_timeout()?;
            Ok(Multiset::Ordinary(out))
        }
    }
}

pub(crate) fn into_solutions(multiset: Multiset) -> Result<SolutionSet, EvalError> {
    match multiset.materialize() {
        Multiset::Ordinary(set) => Ok(set),
        Multiset::Identity => {
            // one conceptual empty row, made concrete
            let mut set = SolutionSet::new();
            set.add(Binding::new());
            Ok(set)
        }
        _ => Err(EvalError::Structural("expected a materializable multiset")),
    }
}

/// BIND: computes the expression per row and binds the target variable.
/// An expression error leaves the variable unbound and keeps the row
/// (fail-open); a target variable already in scope is a structural error.
fn extend(
    multiset: Multiset,
    var: &str,
    expr: &Expression,
    ctx: &EvaluationContext<'_>,
) -> Result<Multiset, EvalError> {
    if matches!(multiset, Multiset::Null) {
        return Ok(Multiset::Null);
    }
    if multiset.contains_variable(var) {
        return Err(EvalError::AlreadyBound(var.to_string()));
    }
    let set = into_solutions(multiset)?;
    let mut out = SolutionSet::with_variables(set.variables().iter().cloned());
    out.add_variable(var);
    for row in set.iter() {
        let mut copy = row.copy();
        if let Ok(value) = expr.evaluate(row, ctx.dictionary()) {
            copy.bind(var, value)?;
        }
        out.add(copy);
    }
    ctx.check_timeout()?;
    Ok(Multiset::Ordinary(out))
}

pub(crate) fn project(multiset: Multiset, vars: &[String]) -> Result<Multiset, EvalError> {
    match multiset {
        Multiset::Identity => Ok(Multiset::Identity),
        Multiset::Null => Ok(Multiset::Null),
        other => {
            let set = into_solutions(other)?;
            let mut out = SolutionSet::with_variables(vars.iter().cloned());
            out.keep_insertion_order();
            for row in set.iter() {
                let pairs = vars.iter().filter_map(|v| row.value(v).map(|t| (v.clone(), t)));
                out.add(Binding::from_pairs(pairs));
            }
            Ok(Multiset::Ordinary(out))
        }
    }
}

fn order_by(
    multiset: Multiset,
    comparators: &[OrderComparator],
    ctx: &EvaluationContext<'_>,
) -> Result<Multiset, EvalError> {
    match multiset {
        Multiset::Identity => Ok(Multiset::Identity),
        Multiset::Null => Ok(Multiset::Null),
        other => {
            let mut set = into_solutions(other)?;
            let dict = ctx.dictionary();
            set.sort_by(Some(|a: &Binding, b: &Binding| {
                for cmp in comparators {
                    let va = cmp.expression.evaluate(a, dict).ok();
                    let vb = cmp.expression.evaluate(b, dict).ok();
                    let ordering = compare_values(va, vb, dict);
                    let ordering = if cmp.ascending { ordering } else { ordering.reverse() };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            }));
            ctx.check_timeout()?;
            Ok(Multiset::Ordinary(set))
        }
    }
}

/// Term ordering for ORDER BY: unbound before bound, numbers numerically,
/// everything else by lexical form.
fn compare_values(
    a: Option<u32>,
    b: Option<u32>,
    dict: &shared::dictionary::Dictionary,
) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) if a == b => Ordering::Equal,
        (Some(a), Some(b)) => match (dict.decode(a), dict.decode(b)) {
            (Some(la), Some(lb)) => match (la.parse::<f64>(), lb.parse::<f64>()) {
                (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => la.cmp(lb),
            },
            _ => a.cmp(&b),
        },
    }
}

fn slice(multiset: Multiset, offset: usize, limit: Option<usize>) -> Result<Multiset, EvalError> {
    match multiset {
        Multiset::Identity => {
            if offset == 0 && limit != Some(0) {
                Ok(Multiset::Identity)
            } else {
                Ok(Multiset::Null)
            }
        }
        Multiset::Null => Ok(Multiset::Null),
        other => {
            let set = into_solutions(other)?;
            let mut out = SolutionSet::with_variables(set.variables().iter().cloned());
            out.keep_insertion_order();
            let take = limit.unwrap_or(usize::MAX);
            for row in set.iter().skip(offset).take(take) {
                out.add(row.copy());
            }
            Ok(Multiset::Ordinary(out))
        }
    }
}

fn group(multiset: Multiset, vars: &[String]) -> Result<Multiset, EvalError> {
    match multiset {
        Multiset::Null => Ok(Multiset::Null),
        other => {
            let set = into_solutions(other)?;
            Ok(Multiset::Grouped(GroupSet::group_by(set, vars)))
        }
    }
}

fn distinct(multiset: Multiset) -> Result<Multiset, EvalError> {
    match multiset {
        Multiset::Identity => Ok(Multiset::Identity),
        Multiset::Null => Ok(Multiset::Null),
        other => {
            let set = into_solutions(other)?;
            let mut out = SolutionSet::with_variables(set.variables().iter().cloned());
            out.keep_insertion_order();
            let mut seen: FxHashSet<Binding> = FxHashSet::default();
            for row in set.iter() {
                if seen.insert(row.copy()) {
                    out.add(row.copy());
                }
            }
            Ok(Multiset::Ordinary(out))
        }
    }
}

/// REDUCED only has to remove adjacent duplicates; anything stronger is
/// permitted but not required.
fn reduced(multiset: Multiset) -> Result<Multiset, EvalError> {
    match multiset {
        Multiset::Identity => Ok(Multiset::Identity),
        Multiset::Null => Ok(Multiset::Null),
        other => {
            let set = into_solutions(other)?;
            let mut out = SolutionSet::with_variables(set.variables().iter().cloned());
            out.keep_insertion_order();
            let mut previous: Option<Binding> = None;
            for row in set.iter() {
                if previous.as_ref() != Some(row) {
                    out.add(row.copy());
                    previous = Some(row.copy());
                }
            }
            Ok(Multiset::Ordinary(out))
        }
    }
}

fn eval_graph(
    spec: &GraphSpec,
    inner: &Algebra,
    ctx: &EvaluationContext<'_>,
    input: Multiset,
) -> Result<Multiset, EvalError> {
    match spec {
        GraphSpec::Fixed(active) => {
            let mut branch = ctx.fork_branch(input);
            branch.active_graph = active.clone();
            inner.evaluate(&mut branch)?;
            Ok(branch.take_output())
        }
        GraphSpec::Var(var) => {
            // the variable ranges over every named graph; results from
            // each graph are tagged with its name and unioned
            let mut acc = Multiset::Null;
            let mut graphs: Vec<u32> = ctx.dataset().graph_names().collect();
            graphs.sort_unstable();
            for graph in graphs {
                let mut branch = ctx.fork_branch(input.clone());
                branch.active_graph = ActiveGraph::Named(graph);
                inner.evaluate(&mut branch)?;
                let result = branch.take_output();
                if result.is_empty() {
                    continue;
                }
                let tagged = bind_graph_var(result, var, graph)?;
                acc = join::union(acc, tagged, ctx)?;
                ctx.check_timeout()?;
            }
            Ok(acc)
        }
    }
}

fn bind_graph_var(multiset: Multiset, var: &str, graph: u32) -> Result<Multiset, EvalError> {
    let set = into_solutions(multiset)?;
    let mut out = SolutionSet::with_variables(set.variables().iter().cloned());
    out.add_variable(var);
    for row in set.iter() {
        match row.value(var) {
            Some(existing) if existing != graph => continue,
            Some(_) => {
                out.add(row.copy());
            }
            None => {
                let mut copy = row.copy();
                copy.bind(var, graph)?;
                out.add(copy);
            }
        }
    }
    Ok(Multiset::Ordinary(out))
}
