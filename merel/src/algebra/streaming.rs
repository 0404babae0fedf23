/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Depth-first backtracking search over a basic graph pattern, exposed as
//! a resumable iterator. Consumers control termination by how much they
//! pull: ASK pulls one row, a LIMIT-bounded SELECT pulls its limit.

use super::bgp::{bind_position, PatternStep};
use crate::binding::Binding;
use crate::context::EvaluationContext;
use crate::error::EvalError;
use shared::terms::{Term, TriplePattern};
use shared::triple::Triple;

struct Frame {
    candidates: Vec<Triple>,
    cursor: usize,
    binding: Binding,
}

/// A lazy solution stream over a pattern-order-fixed backtracking search.
/// Each stack frame holds the candidate triples for one pattern level and
/// the binding accumulated before that level's choice, so the search
/// resumes exactly where the previous `next` left off.
pub struct BgpStream<'a, 'c> {
    patterns: Vec<TriplePattern>,
    ctx: &'a EvaluationContext<'c>,
    stack: Vec<Frame>,
    done: bool,
}

impl<'a, 'c> BgpStream<'a, 'c> {
    /// Only plain triple patterns can be streamed; anything else in the
    /// step list is a structural error.
    pub fn new(steps: &[PatternStep], ctx: &'a EvaluationContext<'c>) -> Result<Self, EvalError> {
        let mut patterns = Vec::with_capacity(steps.len());
        for step in steps {
            match step {
                PatternStep::Triple(pattern) => patterns.push(pattern.clone()),
                PatternStep::Filter(_) => {
                    return Err(EvalError::Structural(
                        "only triple patterns can be evaluated as a stream",
                    ));
                }
            }
        }
        let mut stream = BgpStream { patterns, ctx, stack: Vec::new(), done: false };
        if !stream.patterns.is_empty() {
            let binding = Binding::new();
            let candidates = stream.candidates(0, &binding);
            stream.stack.push(Frame { candidates, cursor: 0, binding });
        }
        Ok(stream)
    }

    fn candidates(&self, level: usize, binding: &Binding) -> Vec<Triple> {
        let (s, p, o) = &self.patterns[level];
        self.ctx.dataset().match_pattern(
            &self.ctx.active_graph,
            resolve(s, binding),
            resolve(p, binding),
            resolve(o, binding),
        )
    }
}

fn resolve(term: &Term, binding: &Binding) -> Option<u32> {
    match term {
        Term::Constant(c) => Some(*c),
        Term::Variable(var) => binding.value(var),
    }
}

impl Iterator for BgpStream<'_, '_> {
    type Item = Binding;

    fn next(&mut self) -> Option<Binding> {
        if self.done {
            return None;
        }
        // cooperative deadline: stop yielding, the caller inspects the
        // context to distinguish exhaustion from timeout
        if self.ctx.deadline_elapsed() {
            self.done = true;
            return None;
        }
        if self.patterns.is_empty() {
            // an empty pattern list has exactly the empty solution
            self.done = true;
            return Some(Binding::new());
        }
        loop {
            if self.stack.is_empty() {
                self.done = true;
                return None;
            }
            let level = self.stack.len() - 1;
            let (triple, base) = {
                let frame = &mut self.stack[level];
                if frame.cursor >= frame.candidates.len() {
                    self.stack.pop();
                    continue;
                }
                let triple = frame.candidates[frame.cursor];
                frame.cursor += 1;
                (triple, frame.binding.clone())
            };

            let (s, p, o) = self.patterns[level].clone();
            let mut extended = base;
            // repeated variables within one pattern can still reject a
            // candidate the index could not rule out
            if !(bind_position(&mut extended, &s, triple.subject)
                && bind_position(&mut extended, &p, triple.predicate)
                && bind_position(&mut extended, &o, triple.object))
            {
                continue;
            }
            if level + 1 == self.patterns.len() {
                return Some(extended);
            }
            let candidates = self.candidates(level + 1, &extended);
            self.stack.push(Frame { candidates, cursor: 0, binding: extended });
        }
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
    fn stream_yields_chained_solutions_lazily() {
        let mut dict = Dictionary::new();
        let (a, b, c, knows) =
            (dict.encode("a"), dict.encode("b"), dict.encode("c"), dict.encode("knows"));
        let mut dataset = Dataset::new();
        dataset.insert(Triple::new(a, knows, b));
        dataset.insert(Triple::new(b, knows, c));

        let ctx = EvaluationContext::new(&dataset, &dict);
        let steps = vec![
            PatternStep::Triple((var("x"), Term::Constant(knows), var("y"))),
            PatternStep::Triple((var("y"), Term::Constant(knows), var("z"))),
        ];
        let mut stream = BgpStream::new(&steps, &ctx).unwrap();

        let first = stream.next().expect("one chained solution exists");
        assert_eq!(first.value("x"), Some(a));
        assert_eq!(first.value("y"), Some(b));
        assert_eq!(first.value("z"), Some(c));
        assert_eq!(stream.next(), None);
    }

    #[test]
    fn filters_cannot_stream() {
        let dict = Dictionary::new();
        let dataset = Dataset::new();
        let ctx = EvaluationContext::new(&dataset, &dict);
        let steps = vec![PatternStep::Filter(crate::expression::Expression::Bool(true))];
        assert!(matches!(BgpStream::new(&steps, &ctx), Err(EvalError::Structural(_))));
    }
}
