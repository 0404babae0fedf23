/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// A position in a triple pattern: either a query variable or an
/// already-encoded constant term.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Variable(String),
    Constant(u32),
}

pub type TriplePattern = (Term, Term, Term);

impl Term {
    pub fn is_var(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    pub fn as_variable(&self) -> Option<&str> {
        match self {
            Term::Variable(v) => Some(v.as_str()),
            Term::Constant(_) => None,
        }
    }

    pub fn as_constant(&self) -> Option<u32> {
        match self {
            Term::Variable(_) => None,
            Term::Constant(c) => Some(*c),
        }
    }
}
