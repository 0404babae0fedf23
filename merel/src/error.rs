/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use thiserror::Error;

/// Errors surfaced by the evaluation engine.
///
/// Expression failures inside FILTER/BIND are deliberately absent: those
/// are recovered locally (fail-closed for filters, fail-open for
/// assignment) and never reach the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvalError {
    /// A variable was bound twice in the same solution row. This is a
    /// programming error in the operator tree, not a query-time condition.
    #[error("variable ?{0} is already bound")]
    AlreadyBound(String),

    /// Invalid operation on a degenerate multiset or malformed operator
    /// construction.
    #[error("invalid operation: {0}")]
    Structural(&'static str),

    /// The cooperative evaluation deadline elapsed.
    #[error("query evaluation timed out")]
    Timeout,

    /// An error propagated unchanged from the dataset collaborator.
    #[error("dataset error: {0}")]
    Dataset(String),
}
