/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! merel is an evaluation engine for a SPARQL-like graph-pattern algebra:
//! binding multisets with null-aware hash joins, an algebra operator tree
//! with streaming BGP evaluation, and a fixpoint property-path evaluator,
//! all under cooperative timeouts and an optional parallel mode.

pub mod algebra;
pub mod binding;
pub mod context;
pub mod error;
pub mod expression;
pub mod join;
pub mod multiset;
pub mod path;
pub mod query;

pub use algebra::{Algebra, BgpStream, GraphSpec, OrderComparator, PatternStep};
pub use binding::Binding;
pub use context::{EvaluationContext, EvaluationOutcome, ExecutionPolicy};
pub use error::EvalError;
pub use expression::{ComparisonOp, Expression, ExpressionError};
pub use multiset::{GroupSet, Multiset, PartitionedSet, SolutionSet};
pub use path::{PathPattern, PropertyPath};
pub use query::{execute, QueryResult, QueryShape};
