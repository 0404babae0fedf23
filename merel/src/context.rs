/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::error::EvalError;
use crate::multiset::Multiset;
use shared::dataset::{ActiveGraph, Dataset};
use shared::dictionary::Dictionary;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Execution policy threaded through the context instead of a global flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionPolicy {
    /// Evaluate independent subtrees and hash-join passes on worker threads.
    pub parallel: bool,
    /// On timeout, return the best multiset computed so far flagged as
    /// partial instead of an error.
    pub partial_results: bool,
}

/// Carries the active dataset view, the current input/output multisets,
/// the deadline clock and the parallelism policy. Forked branches share
/// the read-only dataset handle and deadline but own their input/output
/// slots.
pub struct EvaluationContext<'a> {
    dataset: &'a Dataset,
    dictionary: &'a Dictionary,
    pub active_graph: ActiveGraph,
    pub input: Multiset,
    pub output: Multiset,
    deadline: Option<Instant>,
    policy: ExecutionPolicy,
    partial: Arc<AtomicBool>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(dataset: &'a Dataset, dictionary: &'a Dictionary) -> Self {
        Self {
            dataset,
            dictionary,
            active_graph: ActiveGraph::Default,
            input: Multiset::Identity,
            output: Multiset::Identity,
            deadline: None,
            policy: ExecutionPolicy::default(),
            partial: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    pub fn dictionary(&self) -> &'a Dictionary {
        self.dictionary
    }

    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    /// Cooperative cancellation checkpoint. Consulted after operand
    /// evaluations, index builds and full multiset passes; it is not
    /// preemptive.
    pub fn check_timeout(&self) -> Result<(), EvalError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(EvalError::Timeout),
            _ => Ok(()),
        }
    }

    pub fn deadline_elapsed(&self) -> bool {
        self.check_timeout().is_err()
    }

    /// A child context for one branch of a fork/join evaluation: shares
    /// the dataset handle, deadline, policy and partial flag, but owns a
    /// private input slot (copy-before-fork is the caller's duty).
    pub fn fork_branch(&self, input: Multiset) -> EvaluationContext<'a> {
        EvaluationContext {
            dataset: self.dataset,
            dictionary: self.dictionary,
            active_graph: self.active_graph.clone(),
            input,
            output: Multiset::Identity,
            deadline: self.deadline,
            policy: self.policy,
            partial: Arc::clone(&self.partial),
        }
    }

    /// Takes the output multiset, leaving Identity in its place.
    pub fn take_output(&mut self) -> Multiset {
        std::mem::replace(&mut self.output, Multiset::Identity)
    }

    /// Records that some subtree returned best-effort partial results.
    pub fn mark_partial(&self) {
        self.partial.store(true, Ordering::Relaxed);
    }

    pub fn is_partial(&self) -> bool {
        self.partial.load(Ordering::Relaxed)
    }
}

/// The result of a top-level evaluation: the final multiset and whether
/// any part of it was cut short by the deadline in partial-results mode.
#[derive(Debug, PartialEq)]
pub struct EvaluationOutcome {
    pub multiset: Multiset,
    pub partial: bool,
}
