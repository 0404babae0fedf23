/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use merel::context::EvaluationContext;
use merel::multiset::Multiset;
use merel::path::{evaluate_path, PathPattern, PropertyPath};
use shared::dataset::Dataset;
use shared::dictionary::Dictionary;
use shared::terms::Term;
use shared::triple::Triple;
use std::collections::BTreeSet;

fn var(name: &str) -> Term {
    Term::Variable(name.to_string())
}

fn pairs(result: &Multiset, start: &str, end: &str) -> BTreeSet<(u32, u32)> {
    result
        .canonical_rows()
        .into_iter()
        .filter_map(|row| Some((*row.get(start)?, *row.get(end)?)))
        .collect()
}

struct Chain {
    dict: Dictionary,
    dataset: Dataset,
    a: u32,
    b: u32,
    c: u32,
    p: u32,
}

// a -p-> b -p-> c
fn chain() -> Chain {
    let mut dict = Dictionary::new();
    let (a, b, c, p) = (dict.encode("a"), dict.encode("b"), dict.encode("c"), dict.encode("p"));
    let mut dataset = Dataset::new();
    dataset.insert(Triple::new(a, p, b));
    dataset.insert(Triple::new(b, p, c));
    Chain { dict, dataset, a, b, c, p }
}

#[test]
fn one_or_more_enumerates_the_transitive_closure() {
    // Scenario C: both endpoints unbound, no reflexive pairs
    let g = chain();
    let ctx = EvaluationContext::new(&g.dataset, &g.dict);
    let pattern = PathPattern {
        start: var("s"),
        path: PropertyPath::OneOrMore(Box::new(PropertyPath::Predicate(g.p))),
        end: var("o"),
    };
    let result = evaluate_path(&pattern, &ctx).unwrap();
    let expected: BTreeSet<(u32, u32)> =
        [(g.a, g.b), (g.b, g.c), (g.a, g.c)].into_iter().collect();
    assert_eq!(pairs(&result, "s", "o"), expected);
}

#[test]
fn one_or_more_yields_reflexive_pairs_only_through_cycles() {
    let mut dict = Dictionary::new();
    let (a, b, c, p) = (dict.encode("a"), dict.encode("b"), dict.encode("c"), dict.encode("p"));
    let mut dataset = Dataset::new();
    // a <-> b cycle, plus a dead-end edge b -> c
    dataset.insert(Triple::new(a, p, b));
    dataset.insert(Triple::new(b, p, a));
    dataset.insert(Triple::new(b, p, c));

    let ctx = EvaluationContext::new(&dataset, &dict);
    let pattern = PathPattern {
        start: var("s"),
        path: PropertyPath::OneOrMore(Box::new(PropertyPath::Predicate(p))),
        end: var("o"),
    };
    let found = pairs(&evaluate_path(&pattern, &ctx).unwrap(), "s", "o");
    assert!(found.contains(&(a, a)));
    assert!(found.contains(&(b, b)));
    assert!(!found.contains(&(c, c)), "c is not on any cycle");
}

#[test]
fn zero_or_more_includes_every_node_paired_with_itself() {
    let g = chain();
    let ctx = EvaluationContext::new(&g.dataset, &g.dict);
    let pattern = PathPattern {
        start: var("s"),
        path: PropertyPath::ZeroOrMore(Box::new(PropertyPath::Predicate(g.p))),
        end: var("o"),
    };
    let found = pairs(&evaluate_path(&pattern, &ctx).unwrap(), "s", "o");
    for node in [g.a, g.b, g.c] {
        assert!(found.contains(&(node, node)), "missing reflexive pair for {node}");
    }
    assert!(found.contains(&(g.a, g.c)));
}

#[test]
fn bound_start_restricts_the_traversal() {
    let g = chain();
    let ctx = EvaluationContext::new(&g.dataset, &g.dict);
    let pattern = PathPattern {
        start: Term::Constant(g.b),
        path: PropertyPath::OneOrMore(Box::new(PropertyPath::Predicate(g.p))),
        end: var("o"),
    };
    let result = evaluate_path(&pattern, &ctx).unwrap();
    let ends: BTreeSet<u32> = result
        .canonical_rows()
        .into_iter()
        .filter_map(|row| row.get("o").copied())
        .collect();
    assert_eq!(ends, [g.c].into_iter().collect());
}

#[test]
fn bound_end_traverses_backwards() {
    let g = chain();
    let ctx = EvaluationContext::new(&g.dataset, &g.dict);
    let pattern = PathPattern {
        start: var("s"),
        path: PropertyPath::OneOrMore(Box::new(PropertyPath::Predicate(g.p))),
        end: Term::Constant(g.c),
    };
    let result = evaluate_path(&pattern, &ctx).unwrap();
    let starts: BTreeSet<u32> = result
        .canonical_rows()
        .into_iter()
        .filter_map(|row| row.get("s").copied())
        .collect();
    assert_eq!(starts, [g.a, g.b].into_iter().collect());
}

#[test]
fn inverse_swaps_endpoints() {
    let g = chain();
    let ctx = EvaluationContext::new(&g.dataset, &g.dict);
    let pattern = PathPattern {
        start: var("s"),
        path: PropertyPath::Inverse(Box::new(PropertyPath::Predicate(g.p))),
        end: var("o"),
    };
    let found = pairs(&evaluate_path(&pattern, &ctx).unwrap(), "s", "o");
    assert_eq!(found, [(g.b, g.a), (g.c, g.b)].into_iter().collect());
}

#[test]
fn alternative_unions_both_branches() {
    let mut dict = Dictionary::new();
    let (a, b, c) = (dict.encode("a"), dict.encode("b"), dict.encode("c"));
    let (p, q) = (dict.encode("p"), dict.encode("q"));
    let mut dataset = Dataset::new();
    dataset.insert(Triple::new(a, p, b));
    dataset.insert(Triple::new(a, q, c));

    let ctx = EvaluationContext::new(&dataset, &dict);
    let pattern = PathPattern {
        start: Term::Constant(a),
        path: PropertyPath::Alternative(
            Box::new(PropertyPath::Predicate(p)),
            Box::new(PropertyPath::Predicate(q)),
        ),
        end: var("o"),
    };
    let result = evaluate_path(&pattern, &ctx).unwrap();
    let ends: BTreeSet<u32> = result
        .canonical_rows()
        .into_iter()
        .filter_map(|row| row.get("o").copied())
        .collect();
    assert_eq!(ends, [b, c].into_iter().collect());
}

#[test]
fn zero_or_one_merges_the_reflexive_solution() {
    let g = chain();
    let ctx = EvaluationContext::new(&g.dataset, &g.dict);
    let pattern = PathPattern {
        start: Term::Constant(g.a),
        path: PropertyPath::ZeroOrOne(Box::new(PropertyPath::Predicate(g.p))),
        end: var("o"),
    };
    let result = evaluate_path(&pattern, &ctx).unwrap();
    let ends: BTreeSet<u32> = result
        .canonical_rows()
        .into_iter()
        .filter_map(|row| row.get("o").copied())
        .collect();
    assert_eq!(ends, [g.a, g.b].into_iter().collect());
}

#[test]
fn fixed_length_chains_the_inner_path() {
    let g = chain();
    let ctx = EvaluationContext::new(&g.dataset, &g.dict);
    let pattern = PathPattern {
        start: var("s"),
        path: PropertyPath::FixedLength(2, Box::new(PropertyPath::Predicate(g.p))),
        end: var("o"),
    };
    let found = pairs(&evaluate_path(&pattern, &ctx).unwrap(), "s", "o");
    assert_eq!(found, [(g.a, g.c)].into_iter().collect());
}

#[test]
fn negated_property_set_excludes_listed_predicates() {
    let mut dict = Dictionary::new();
    let (a, b, c) = (dict.encode("a"), dict.encode("b"), dict.encode("c"));
    let (p, q) = (dict.encode("p"), dict.encode("q"));
    let mut dataset = Dataset::new();
    dataset.insert(Triple::new(a, p, b));
    dataset.insert(Triple::new(a, q, c));

    let ctx = EvaluationContext::new(&dataset, &dict);
    let pattern = PathPattern {
        start: Term::Constant(a),
        path: PropertyPath::NegatedPropertySet(vec![p]),
        end: var("o"),
    };
    let result = evaluate_path(&pattern, &ctx).unwrap();
    let ends: BTreeSet<u32> = result
        .canonical_rows()
        .into_iter()
        .filter_map(|row| row.get("o").copied())
        .collect();
    assert_eq!(ends, [c].into_iter().collect());
}

#[test]
fn composite_inner_paths_still_reach_the_fixpoint() {
    // (p/q)+ over a -p-> m -q-> b -p-> n -q-> c
    let mut dict = Dictionary::new();
    let (a, m, b, n, c) = (
        dict.encode("a"),
        dict.encode("m"),
        dict.encode("b"),
        dict.encode("n"),
        dict.encode("c"),
    );
    let (p, q) = (dict.encode("p"), dict.encode("q"));
    let mut dataset = Dataset::new();
    dataset.insert(Triple::new(a, p, m));
    dataset.insert(Triple::new(m, q, b));
    dataset.insert(Triple::new(b, p, n));
    dataset.insert(Triple::new(n, q, c));

    let ctx = EvaluationContext::new(&dataset, &dict);
    let pattern = PathPattern {
        start: Term::Constant(a),
        path: PropertyPath::OneOrMore(Box::new(PropertyPath::Sequence(
            Box::new(PropertyPath::Predicate(p)),
            Box::new(PropertyPath::Predicate(q)),
        ))),
        end: var("o"),
    };
    let result = evaluate_path(&pattern, &ctx).unwrap();
    let ends: BTreeSet<u32> = result
        .canonical_rows()
        .into_iter()
        .filter_map(|row| row.get("o").copied())
        .collect();
    assert_eq!(ends, [b, c].into_iter().collect());
}
