/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use merel::binding::Binding;
use merel::context::{EvaluationContext, ExecutionPolicy};
use merel::expression::{ComparisonOp, Expression};
use merel::join::{exists_join, join, left_join, merge, minus, product, union};
use merel::multiset::{Multiset, SolutionSet};
use shared::dataset::Dataset;
use shared::dictionary::Dictionary;

fn rows(data: &[&[(&str, u32)]]) -> Multiset {
    let mut set = SolutionSet::new();
    for row in data {
        set.add(Binding::from_pairs(row.iter().map(|(v, t)| (v.to_string(), *t))));
    }
    Multiset::Ordinary(set)
}

fn empty_ordinary(vars: &[&str]) -> Multiset {
    Multiset::Ordinary(SolutionSet::with_variables(vars.iter().map(|v| v.to_string())))
}

#[test]
fn identity_is_neutral_for_join_and_product() {
    let dataset = Dataset::new();
    let dict = Dictionary::new();
    let ctx = EvaluationContext::new(&dataset, &dict);
    let x = rows(&[&[("x", 1)], &[("x", 2)]]);

    assert_eq!(join(Multiset::Identity, x.clone(), &ctx).unwrap(), x);
    assert_eq!(join(x.clone(), Multiset::Identity, &ctx).unwrap(), x);
    assert_eq!(product(Multiset::Identity, x.clone(), &ctx).unwrap(), x);
}

#[test]
fn null_and_empty_absorb_join() {
    let dataset = Dataset::new();
    let dict = Dictionary::new();
    let ctx = EvaluationContext::new(&dataset, &dict);
    let x = rows(&[&[("x", 1)]]);

    assert_eq!(join(Multiset::Null, x.clone(), &ctx).unwrap(), Multiset::Null);
    assert_eq!(join(x.clone(), Multiset::Null, &ctx).unwrap(), Multiset::Null);
    assert_eq!(join(x, empty_ordinary(&["y"]), &ctx).unwrap(), Multiset::Null);
}

#[test]
fn disjoint_scopes_degrade_join_to_product() {
    let dataset = Dataset::new();
    let dict = Dictionary::new();
    let ctx = EvaluationContext::new(&dataset, &dict);
    let l = rows(&[&[("x", 1)], &[("x", 2)]]);
    let r = rows(&[&[("y", 10)], &[("y", 20)], &[("y", 30)]]);

    let joined = join(l.clone(), r.clone(), &ctx).unwrap();
    let crossed = product(l, r, &ctx).unwrap();
    assert_eq!(joined.count(), 6);
    assert_eq!(joined, crossed);
}

#[test]
fn join_matches_on_equal_shared_terms() {
    let dataset = Dataset::new();
    let dict = Dictionary::new();
    let ctx = EvaluationContext::new(&dataset, &dict);
    let l = rows(&[&[("x", 1), ("y", 5)], &[("x", 2), ("y", 6)]]);
    let r = rows(&[&[("y", 5), ("z", 9)]]);

    let result = join(l, r, &ctx).unwrap();
    assert_eq!(result, rows(&[&[("x", 1), ("y", 5), ("z", 9)]]));
}

#[test]
fn unbound_join_variable_is_a_wildcard() {
    let dataset = Dataset::new();
    let dict = Dictionary::new();
    let ctx = EvaluationContext::new(&dataset, &dict);

    // second left row leaves ?j unbound, so it matches any right value
    let mut lset = SolutionSet::new();
    lset.add(Binding::from_pairs([("j", 1u32), ("a", 10)]));
    lset.add(Binding::from_pairs([("a", 20u32)]));
    lset.add_variable("j");
    let r = rows(&[&[("j", 1), ("b", 30)]]);

    let result = join(Multiset::Ordinary(lset), r, &ctx).unwrap();
    assert_eq!(
        result,
        rows(&[&[("j", 1), ("a", 10), ("b", 30)], &[("j", 1), ("a", 20), ("b", 30)]])
    );
}

#[test]
fn left_join_covers_every_left_row_exactly_once_or_per_match() {
    let dataset = Dataset::new();
    let dict = Dictionary::new();
    let ctx = EvaluationContext::new(&dataset, &dict);
    let l = rows(&[&[("x", 1)], &[("x", 2)]]);
    let r = rows(&[&[("x", 1), ("y", 9)], &[("x", 1), ("y", 8)]]);

    let result = left_join(l, r, None, &ctx).unwrap();
    assert_eq!(
        result,
        rows(&[&[("x", 1), ("y", 9)], &[("x", 1), ("y", 8)], &[("x", 2)]])
    );
}

#[test]
fn left_join_against_null_or_empty_keeps_left_unchanged() {
    let dataset = Dataset::new();
    let dict = Dictionary::new();
    let ctx = EvaluationContext::new(&dataset, &dict);
    let l = rows(&[&[("x", 1)], &[("x", 2)]]);

    assert_eq!(left_join(l.clone(), Multiset::Null, None, &ctx).unwrap(), l);
    assert_eq!(left_join(l.clone(), empty_ordinary(&["x", "y"]), None, &ctx).unwrap(), l);
    assert_eq!(left_join(l.clone(), Multiset::Identity, None, &ctx).unwrap(), l);
}

#[test]
fn left_join_filter_errors_fail_closed() {
    let dataset = Dataset::new();
    let mut dict = Dictionary::new();
    let five = dict.encode("5");
    let forty = dict.encode("40");
    let ctx = EvaluationContext::new(&dataset, &dict);

    let l = rows(&[&[("x", 1)]]);
    let r = rows(&[&[("x", 1), ("y", five)], &[("x", 1), ("y", forty)]]);

    // the filter references a variable no composed row binds, so it
    // errors everywhere and the left row survives standalone; the output
    // scope is still the union of both sides
    let broken = Expression::compare(
        ComparisonOp::Lt,
        Expression::variable("missing"),
        Expression::Constant(forty),
    );
    let result = left_join(l.clone(), r.clone(), Some(&broken), &ctx).unwrap();
    let mut expected = SolutionSet::with_variables(["x", "y"]);
    expected.add(Binding::from_pairs([("x", 1u32)]));
    assert_eq!(result, Multiset::Ordinary(expected));

    // a working filter keeps only the matches where it holds
    let working = Expression::compare(
        ComparisonOp::Lt,
        Expression::variable("y"),
        Expression::Constant(forty),
    );
    let result = left_join(l, r, Some(&working), &ctx).unwrap();
    assert_eq!(result, rows(&[&[("x", 1), ("y", five)]]));
}

#[test]
fn minus_removes_rows_matching_on_a_shared_bound_variable() {
    // Scenario D: ?x=1 on both sides removes the left row
    let dataset = Dataset::new();
    let dict = Dictionary::new();
    let ctx = EvaluationContext::new(&dataset, &dict);
    let l = rows(&[&[("x", 1), ("y", 1)]]);
    let r = rows(&[&[("x", 1)]]);

    assert_eq!(minus(l, r, &ctx).unwrap(), Multiset::Null);
}

#[test]
fn minus_needs_at_least_one_variable_bound_on_both_sides() {
    // ?x is in both scopes but unbound in the right row, so the rows
    // share no bound variable and the left row is kept
    let dataset = Dataset::new();
    let dict = Dictionary::new();
    let ctx = EvaluationContext::new(&dataset, &dict);

    let l = rows(&[&[("x", 1)]]);
    let mut rset = SolutionSet::new();
    rset.add_variable("x");
    rset.add(Binding::from_pairs([("y", 2u32)]));
    rset.add_variable("y");

    // scopes overlap on ?x, so the disjoint rule does not apply
    let result = minus(l.clone(), Multiset::Ordinary(rset), &ctx).unwrap();
    assert_eq!(result, l);
}

#[test]
fn minus_with_disjoint_scopes_and_nonempty_right_removes_everything() {
    let dataset = Dataset::new();
    let dict = Dictionary::new();
    let ctx = EvaluationContext::new(&dataset, &dict);
    let l = rows(&[&[("x", 1)], &[("x", 2)]]);
    let r = rows(&[&[("y", 1)]]);

    assert_eq!(minus(l.clone(), r, &ctx).unwrap(), Multiset::Null);
    assert_eq!(minus(l.clone(), Multiset::Null, &ctx).unwrap(), l);
    assert_eq!(minus(l.clone(), Multiset::Identity, &ctx).unwrap(), l);
}

#[test]
fn exists_join_filters_without_binding_new_variables() {
    let dataset = Dataset::new();
    let dict = Dictionary::new();
    let ctx = EvaluationContext::new(&dataset, &dict);
    let l = rows(&[&[("x", 1)], &[("x", 2)]]);
    let r = rows(&[&[("x", 1), ("y", 9)]]);

    let kept = exists_join(l.clone(), r.clone(), true, &ctx).unwrap();
    assert_eq!(kept, rows(&[&[("x", 1)]]));
    assert!(!kept.contains_variable("y"));

    let dropped = exists_join(l, r, false, &ctx).unwrap();
    assert_eq!(dropped, rows(&[&[("x", 2)]]));
}

#[test]
fn exists_join_degenerate_right_operands() {
    let dataset = Dataset::new();
    let dict = Dictionary::new();
    let ctx = EvaluationContext::new(&dataset, &dict);
    let l = rows(&[&[("x", 1)]]);

    assert_eq!(exists_join(l.clone(), Multiset::Identity, true, &ctx).unwrap(), l);
    assert_eq!(exists_join(l.clone(), Multiset::Null, true, &ctx).unwrap(), Multiset::Null);
    assert_eq!(exists_join(l.clone(), Multiset::Null, false, &ctx).unwrap(), l);
}

#[test]
fn union_is_bag_preserving() {
    let dataset = Dataset::new();
    let dict = Dictionary::new();
    let ctx = EvaluationContext::new(&dataset, &dict);
    let l = rows(&[&[("x", 1)], &[("x", 1)]]);
    let r = rows(&[&[("x", 1)], &[("y", 2)]]);

    let result = union(l.clone(), r.clone(), &ctx).unwrap();
    assert_eq!(result.count(), l.count() + r.count());
    assert!(result.contains_variable("x"));
    assert!(result.contains_variable("y"));
}

#[test]
fn merge_skips_rows_already_present() {
    let dataset = Dataset::new();
    let dict = Dictionary::new();
    let ctx = EvaluationContext::new(&dataset, &dict);
    let l = rows(&[&[("x", 1)], &[("x", 2)]]);
    let r = rows(&[&[("x", 2)], &[("x", 3)]]);

    let result = merge(l, r, &ctx).unwrap();
    assert_eq!(result, rows(&[&[("x", 1)], &[("x", 2)], &[("x", 3)]]));
}

#[test]
fn parallel_join_and_product_agree_with_serial() {
    let dataset = Dataset::new();
    let dict = Dictionary::new();
    let serial_ctx = EvaluationContext::new(&dataset, &dict);
    let parallel_ctx = EvaluationContext::new(&dataset, &dict)
        .with_policy(ExecutionPolicy { parallel: true, partial_results: false });

    let l = rows(&[&[("x", 1), ("y", 5)], &[("x", 2), ("y", 5)], &[("x", 3), ("y", 6)]]);
    let r = rows(&[&[("y", 5), ("z", 9)], &[("y", 6), ("z", 8)]]);
    assert_eq!(
        join(l.clone(), r.clone(), &serial_ctx).unwrap(),
        join(l.clone(), r.clone(), &parallel_ctx).unwrap()
    );

    let a = rows(&[&[("a", 1)], &[("a", 2)], &[("a", 3)]]);
    let b = rows(&[&[("b", 10)], &[("b", 20)]]);
    let serial = product(a.clone(), b.clone(), &serial_ctx).unwrap();
    let parallel = product(a, b, &parallel_ctx).unwrap();
    assert_eq!(serial.count(), 6);
    assert_eq!(serial, parallel);
}
