/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Sequential basic-graph-pattern evaluation: each step's local matches
//! are joined into the accumulated multiset, with early termination as
//! soon as the accumulation runs dry.

use super::apply_filter;
use crate::binding::Binding;
use crate::context::EvaluationContext;
use crate::error::EvalError;
use crate::expression::Expression;
use crate::join;
use crate::multiset::{Multiset, SolutionSet};
use log::trace;
use shared::terms::{Term, TriplePattern};
use shared::triple::Triple;

/// One step of a basic graph pattern: a triple pattern to match against
/// the active graph, or an inline filter over the accumulation so far.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternStep {
    Triple(TriplePattern),
    Filter(Expression),
}

/// Variables carrying this prefix are internal to the evaluation (path
/// rewrites introduce them) and are erased from final results.
pub(crate) const TEMP_VAR_PREFIX: &str = "_:";

pub(crate) fn is_temporary(var: &str) -> bool {
    var.starts_with(TEMP_VAR_PREFIX)
}

pub fn evaluate_bgp(
    steps: &[PatternStep],
    ctx: &EvaluationContext<'_>,
    input: Multiset,
) -> Result<Multiset, EvalError> {
    if steps.is_empty() {
        return Ok(input);
    }
    // a leading filter applies to the single empty solution
    let mut acc = input;
    for step in steps {
        acc = match step {
            PatternStep::Filter(expr) => apply_filter(expr, acc, ctx)?,
            PatternStep::Triple(pattern) => {
                let local = match_triple_pattern(pattern, ctx, Some(&acc));
                join::join(acc, Multiset::Ordinary(local), ctx)?
            }
        };
        // once the chain is broken no later step can produce rows
        if acc.is_empty() {
            trace!("BGP accumulation ran dry, terminating early");
            return Ok(Multiset::Null);
        }
        if ctx.deadline_elapsed() {
            if ctx.policy().partial_results {
                trace!("BGP evaluation timed out, keeping the accumulation so far");
                ctx.mark_partial();
                return Ok(trim_temporaries(acc));
            }
            return Err(EvalError::Timeout);
        }
    }
    Ok(trim_temporaries(acc))
}

/// Drops internal variables from the scope and every row.
pub(crate) fn trim_temporaries(multiset: Multiset) -> Multiset {
    match multiset.materialize() {
        Multiset::Ordinary(mut set) => {
            let temps: Vec<String> = set
                .variables()
                .iter()
                .filter(|v| is_temporary(v))
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

/// Matches one triple pattern against the active graph, producing the
/// pattern's local solutions. When the accumulation binds a pattern
/// variable to a single value across all rows, the lookup is narrowed to
/// that constant before hitting the index.
pub(crate) fn match_triple_pattern(
    pattern: &TriplePattern,
    ctx: &EvaluationContext<'_>,
    acc: Option<&Multiset>,
) -> SolutionSet {
    let (s, p, o) = pattern;
    let s = narrow_term(s, acc);
    let p = narrow_term(p, acc);
    let o = narrow_term(o, acc);

    let triples = ctx.dataset().match_pattern(
        &ctx.active_graph,
        s.as_constant(),
        p.as_constant(),
        o.as_constant(),
    );

    // declare the scope up front so empty results still carry it
    let mut set = SolutionSet::new();
    for term in [&s, &p, &o] {
        if let Some(var) = term.as_variable() {
            set.add_variable(var);
        }
    }
    for triple in triples {
        if let Some(row) = bind_triple(&s, &p, &o, &triple) {
            set.add(row);
        }
    }
    set
}

/// Builds the solution row for one matched triple. Returns None when a
/// repeated variable would have to take two different values.
fn bind_triple(s: &Term, p: &Term, o: &Term, triple: &Triple) -> Option<Binding> {
    let mut row = Binding::new();
    if bind_position(&mut row, s, triple.subject)
        && bind_position(&mut row, p, triple.predicate)
        && bind_position(&mut row, o, triple.object)
    {
        Some(row)
    } else {
        None
    }
}

pub(crate) fn bind_position(row: &mut Binding, term: &Term, value: u32) -> bool {
    match term {
        // the index already guaranteed constant positions match
        Term::Constant(c) => *c == value,
        Term::Variable(var) => match row.value(var) {
            Some(existing) => existing == value,
            None => row.bind(var, value).is_ok(),
        },
    }
}

/// Replaces a pattern variable with a constant when every accumulated row
/// binds it to the same term.
fn narrow_term(term: &Term, acc: Option<&Multiset>) -> Term {
    if let (Term::Variable(var), Some(multiset)) = (term, acc) {
        if let Some(set) = multiset.as_solutions() {
            if set.contains_variable(var) && !set.is_empty() {
                let mut rows = set.iter();
                if let Some(first) = rows.next().and_then(|row| row.value(var)) {
                    if rows.all(|row| row.value(var) == Some(first)) {
                        return Term::Constant(first);
                    }
                }
            }
        }
    }
    term.clone()
}
