/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The surface handed to the outer query executor: evaluate an algebra
//! tree and shape the final multiset into an ASK boolean, a SELECT
//! projection or a CONSTRUCT graph.

use crate::algebra::{self, Algebra, BgpStream, PatternStep};
use crate::context::{EvaluationContext, EvaluationOutcome};
use crate::error::EvalError;
use crate::multiset::Multiset;
use log::debug;
use rustc_hash::FxHashSet;
use shared::terms::{Term, TriplePattern};
use shared::triple::Triple;

#[derive(Debug, Clone, PartialEq)]
pub enum QueryShape {
    Ask,
    Select(Vec<String>),
    Construct(Vec<TriplePattern>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Boolean(bool),
    Solutions(Multiset),
    Graph(Vec<Triple>),
}

/// Evaluates an algebra tree to its final multiset. In partial-results
/// mode a top-level timeout yields whatever was computed, flagged partial,
/// instead of an error.
pub fn evaluate_algebra(
    algebra: &Algebra,
    ctx: &mut EvaluationContext<'_>,
) -> Result<EvaluationOutcome, EvalError> {
    match algebra.evaluate(ctx) {
        Ok(()) => Ok(EvaluationOutcome { multiset: ctx.take_output(), partial: ctx.is_partial() }),
        Err(EvalError::Timeout) if ctx.policy().partial_results => {
            ctx.mark_partial();
            Ok(EvaluationOutcome { multiset: Multiset::Null, partial: true })
        }
        Err(e) => Err(e),
    }
}

pub fn execute(
    algebra: &Algebra,
    shape: &QueryShape,
    ctx: &mut EvaluationContext<'_>,
) -> Result<QueryResult, EvalError> {
    match shape {
        QueryShape::Ask => ask(algebra, ctx),
        QueryShape::Select(vars) => {
            let outcome = evaluate_algebra(algebra, ctx)?;
            let projected = algebra::project(outcome.multiset, vars)?;
            Ok(QueryResult::Solutions(projected))
        }
        QueryShape::Construct(templates) => {
            let outcome = evaluate_algebra(algebra, ctx)?;
            Ok(QueryResult::Graph(instantiate(templates, &outcome.multiset)))
        }
    }
}

/// ASK needs existence, not enumeration: a plain-triple BGP is answered by
/// pulling a single row from the backtracking stream; everything else
/// collapses the fully evaluated multiset.
fn ask(algebra: &Algebra, ctx: &mut EvaluationContext<'_>) -> Result<QueryResult, EvalError> {
    if let Algebra::Bgp(steps) = algebra {
        if steps.iter().all(|s| matches!(s, PatternStep::Triple(_))) {
            debug!("answering ASK through the streaming BGP evaluator");
            let found = BgpStream::new(steps, ctx)?.next().is_some();
            if !found && ctx.deadline_elapsed() {
                if !ctx.policy().partial_results {
                    return Err(EvalError::Timeout);
                }
                ctx.mark_partial();
            }
            return Ok(QueryResult::Boolean(found));
        }
    }
    let outcome = evaluate_algebra(algebra, ctx)?;
    Ok(QueryResult::Boolean(!outcome.multiset.is_empty()))
}

/// Instantiates CONSTRUCT templates once per solution row, skipping any
/// template whose positions a row leaves unbound. The output graph is a
/// set, not a bag.
fn instantiate(templates: &[TriplePattern], multiset: &Multiset) -> Vec<Triple> {
    let rows = multiset.canonical_rows();
    let mut seen = FxHashSet::default();
    let mut triples = Vec::new();
    for row in &rows {
        for (s, p, o) in templates {
            let resolve = |term: &Term| match term {
                Term::Constant(c) => Some(*c),
                Term::Variable(var) => row.get(var).copied(),
            };
            if let (Some(s), Some(p), Some(o)) = (resolve(s), resolve(p), resolve(o)) {
                let triple = Triple::new(s, p, o);
                if seen.insert(triple) {
                    triples.push(triple);
                }
            }
        }
    }
    triples.sort_unstable();
    triples
}
