/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::binding::Binding;
use shared::dictionary::Dictionary;
use std::cmp::Ordering;
use thiserror::Error;

/// FILTER/BIND value expressions over a single solution row.
///
/// The engine recovers from every `ExpressionError` locally: a failing
/// FILTER drops the row (fail-closed), a failing BIND leaves the target
/// variable unbound (fail-open).
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Constant(u32),
    Bool(bool),
    Variable(String),
    Bound(String),
    SameTerm(Box<Expression>, Box<Expression>),
    Compare(ComparisonOp, Box<Expression>, Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("variable ?{0} is not bound")]
    UnboundVariable(String),
    #[error("values cannot be compared")]
    TypeError,
    #[error("expression does not produce an RDF term")]
    NotATerm,
}

impl Expression {
    pub fn variable(name: &str) -> Expression {
        Expression::Variable(name.to_string())
    }

    pub fn compare(op: ComparisonOp, left: Expression, right: Expression) -> Expression {
        Expression::Compare(op, Box::new(left), Box::new(right))
    }

    /// Evaluates to an encoded RDF term. Boolean-valued expressions are
    /// not terms; BIND of those fails (and fail-open leaves the target
    /// unbound).
    pub fn evaluate(&self, row: &Binding, dict: &Dictionary) -> Result<u32, ExpressionError> {
        match self {
            Expression::Constant(term) => Ok(*term),
            Expression::Variable(var) => row
                .value(var)
                .ok_or_else(|| ExpressionError::UnboundVariable(var.clone())),
            _ => {
                // type check only; the boolean result is not a term
                self.effective_boolean_value(row, dict)?;
                Err(ExpressionError::NotATerm)
            }
        }
    }

    /// The SPARQL effective boolean value of the expression.
    pub fn effective_boolean_value(
        &self,
        row: &Binding,
        dict: &Dictionary,
    ) -> Result<bool, ExpressionError> {
        match self {
            Expression::Bool(b) => Ok(*b),
            Expression::Constant(term) => term_ebv(*term, dict),
            Expression::Variable(var) => {
                let term = row
                    .value(var)
                    .ok_or_else(|| ExpressionError::UnboundVariable(var.clone()))?;
                term_ebv(term, dict)
            }
            Expression::Bound(var) => Ok(row.contains(var)),
            Expression::SameTerm(left, right) => {
                Ok(left.evaluate(row, dict)? == right.evaluate(row, dict)?)
            }
            Expression::Compare(op, left, right) => {
                let l = left.evaluate(row, dict)?;
                let r = right.evaluate(row, dict)?;
                compare_terms(*op, l, r, dict)
            }
            Expression::And(left, right) => {
                // false short-circuits an error on the other side
                match (
                    left.effective_boolean_value(row, dict),
                    right.effective_boolean_value(row, dict),
                ) {
                    (Ok(false), _) | (_, Ok(false)) => Ok(false),
                    (Ok(true), Ok(true)) => Ok(true),
                    (Err(e), _) | (_, Err(e)) => Err(e),
                }
            }
            Expression::Or(left, right) => {
                // true short-circuits an error on the other side
                match (
                    left.effective_boolean_value(row, dict),
                    right.effective_boolean_value(row, dict),
                ) {
                    (Ok(true), _) | (_, Ok(true)) => Ok(true),
                    (Ok(false), Ok(false)) => Ok(false),
                    (Err(e), _) | (_, Err(e)) => Err(e),
                }
            }
            Expression::Not(inner) => Ok(!inner.effective_boolean_value(row, dict)?),
        }
    }
}

fn term_ebv(term: u32, dict: &Dictionary) -> Result<bool, ExpressionError> {
    let lexical = dict.decode(term).ok_or(ExpressionError::TypeError)?;
    match lexical {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => {
            if let Ok(n) = lexical.parse::<f64>() {
                Ok(n != 0.0)
            } else {
                Ok(!lexical.is_empty())
            }
        }
    }
}

fn compare_terms(
    op: ComparisonOp,
    left: u32,
    right: u32,
    dict: &Dictionary,
) -> Result<bool, ExpressionError> {
    // same interned term compares equal without decoding
    if left == right {
        return Ok(matches!(op, ComparisonOp::Eq | ComparisonOp::Le | ComparisonOp::Ge));
    }
    let l = dict.decode(left).ok_or(ExpressionError::TypeError)?;
    let r = dict.decode(right).ok_or(ExpressionError::TypeError)?;
    let ordering = match (l.parse::<f64>(), r.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).ok_or(ExpressionError::TypeError)?,
        (Err(_), Err(_)) => l.cmp(r),
        // a number and a non-number are not comparable
        _ => return Err(ExpressionError::TypeError),
    };
    Ok(match op {
        ComparisonOp::Eq => ordering == Ordering::Equal,
        ComparisonOp::Ne => ordering != Ordering::Equal,
        ComparisonOp::Lt => ordering == Ordering::Less,
        ComparisonOp::Le => ordering != Ordering::Greater,
        ComparisonOp::Gt => ordering == Ordering::Greater,
        ComparisonOp::Ge => ordering != Ordering::Less,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_comparison_decodes_literals() {
        let mut dict = Dictionary::new();
        let five = dict.encode("5");
        let forty = dict.encode("40");
        let row = Binding::from_pairs([("x", five)]);
        let expr = Expression::compare(
            ComparisonOp::Lt,
            Expression::variable("x"),
            Expression::Constant(forty),
        );
        assert_eq!(expr.effective_boolean_value(&row, &dict), Ok(true));
    }

    #[test]
    fn unbound_variable_is_an_expression_error() {
        let dict = Dictionary::new();
        let row = Binding::new();
        let expr = Expression::variable("missing");
        assert!(expr.effective_boolean_value(&row, &dict).is_err());
        // but BOUND of the same variable is simply false
        assert_eq!(
            Expression::Bound("missing".to_string()).effective_boolean_value(&row, &dict),
            Ok(false)
        );
    }

    #[test]
    fn false_and_error_is_false() {
        let dict = Dictionary::new();
        let row = Binding::new();
        let failing = Expression::variable("missing");
        let expr = Expression::And(Box::new(Expression::Bool(false)), Box::new(failing));
        assert_eq!(expr.effective_boolean_value(&row, &dict), Ok(false));
    }
}
