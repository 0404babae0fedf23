/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::triple::Triple;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

type Nested = HashMap<u32, HashMap<u32, HashSet<u32>>>;

/// Triple index over all six position permutations, so that any
/// combination of bound pattern positions has a specialized lookup.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TripleIndex {
    pub spo: Nested,
    pub pos: Nested,
    pub osp: Nested,
    pub pso: Nested,
    pub ops: Nested,
    pub sop: Nested,
    count: usize,
}

fn nested_insert(index: &mut Nested, a: u32, b: u32, c: u32) {
    index.entry(a).or_default().entry(b).or_default().insert(c);
}

fn nested_remove(index: &mut Nested, a: u32, b: u32, c: u32) {
    if let Some(inner) = index.get_mut(&a) {
        if let Some(leaf) = inner.get_mut(&b) {
            leaf.remove(&c);
            if leaf.is_empty() {
                inner.remove(&b);
            }
        }
        if inner.is_empty() {
            index.remove(&a);
        }
    }
}

impl TripleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a triple into all six permutations. Returns false if the
    /// triple was already stored.
    pub fn insert(&mut self, triple: &Triple) -> bool {
        let Triple { subject: s, predicate: p, object: o } = *triple;
        if self.contains(triple) {
            return false;
        }
        nested_insert(&mut self.spo, s, p, o);
        nested_insert(&mut self.pos, p, o, s);
        nested_insert(&mut self.osp, o, s, p);
        nested_insert(&mut self.pso, p, s, o);
        nested_insert(&mut self.ops, o, p, s);
        nested_insert(&mut self.sop, s, o, p);
        self.count += 1;
        true
    }

    pub fn delete(&mut self, triple: &Triple) -> bool {
        let Triple { subject: s, predicate: p, object: o } = *triple;
        if !self.contains(triple) {
            return false;
        }
        nested_remove(&mut self.spo, s, p, o);
        nested_remove(&mut self.pos, p, o, s);
        nested_remove(&mut self.osp, o, s, p);
        nested_remove(&mut self.pso, p, s, o);
        nested_remove(&mut self.ops, o, p, s);
        nested_remove(&mut self.sop, s, o, p);
        self.count -= 1;
        true
    }

    /// Bulk-build from a list of triples, indexing chunks in parallel and
    /// merging the partial indexes.
    pub fn build_from_triples(&mut self, triples: &[Triple]) {
        use rayon::prelude::*;

        self.clear();
        if triples.is_empty() {
            return;
        }

        let num_threads = rayon::current_num_threads();
        let chunk_size = (triples.len() / num_threads).max(10_000);

        let partials: Vec<TripleIndex> = triples
            .par_chunks(chunk_size)
            .map(|chunk| {
                let mut local = TripleIndex::new();
                for triple in chunk {
                    local.insert(triple);
                }
                local
            })
            .collect();

        for partial in partials {
            self.merge_from(partial);
        }
    }

    pub fn merge_from(&mut self, other: TripleIndex) {
        for (s, inner) in other.spo {
            for (p, objects) in inner {
                for o in objects {
                    self.insert(&Triple::new(s, p, o));
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.spo.clear();
        self.pos.clear();
        self.osp.clear();
        self.pso.clear();
        self.ops.clear();
        self.sop.clear();
        self.count = 0;
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.spo
            .get(&triple.subject)
            .and_then(|inner| inner.get(&triple.predicate))
            .map_or(false, |objects| objects.contains(&triple.object))
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Pattern lookup, dispatching to the permutation specialized for the
    /// bound positions.
    pub fn match_pattern(&self, s: Option<u32>, p: Option<u32>, o: Option<u32>) -> Vec<Triple> {
        let mut results = Vec::new();
        match (s, p, o) {
            (Some(s), Some(p), Some(o)) => {
                let triple = Triple::new(s, p, o);
                if self.contains(&triple) {
                    results.push(triple);
                }
            }
            (Some(s), Some(p), None) => {
                if let Some(objects) = self.spo.get(&s).and_then(|inner| inner.get(&p)) {
                    results.extend(objects.iter().map(|&o| Triple::new(s, p, o)));
                }
            }
            (Some(s), None, Some(o)) => {
                if let Some(predicates) = self.sop.get(&s).and_then(|inner| inner.get(&o)) {
                    results.extend(predicates.iter().map(|&p| Triple::new(s, p, o)));
                }
            }
            (None, Some(p), Some(o)) => {
                if let Some(subjects) = self.pos.get(&p).and_then(|inner| inner.get(&o)) {
                    results.extend(subjects.iter().map(|&s| Triple::new(s, p, o)));
                }
            }
            (Some(s), None, None) => {
                if let Some(inner) = self.spo.get(&s) {
                    for (&p, objects) in inner {
                        results.extend(objects.iter().map(|&o| Triple::new(s, p, o)));
                    }
                }
            }
            (None, Some(p), None) => {
                if let Some(inner) = self.pso.get(&p) {
                    for (&s, objects) in inner {
                        results.extend(objects.iter().map(|&o| Triple::new(s, p, o)));
                    }
                }
            }
            (None, None, Some(o)) => {
                if let Some(inner) = self.osp.get(&o) {
                    for (&s, predicates) in inner {
                        results.extend(predicates.iter().map(|&p| Triple::new(s, p, o)));
                    }
                }
            }
            (None, None, None) => {
                for (&s, inner) in &self.spo {
                    for (&p, objects) in inner {
                        results.extend(objects.iter().map(|&o| Triple::new(s, p, o)));
                    }
                }
            }
        }
        results
    }

    /// One-step forward successors: objects of (s, p, ?).
    pub fn objects_for(&self, s: u32, p: u32) -> Vec<u32> {
        self.spo
            .get(&s)
            .and_then(|inner| inner.get(&p))
            .map(|objects| objects.iter().copied().collect())
            .unwrap_or_default()
    }

    /// One-step backward successors: subjects of (?, p, o).
    pub fn subjects_for(&self, p: u32, o: u32) -> Vec<u32> {
        self.pos
            .get(&p)
            .and_then(|inner| inner.get(&o))
            .map(|subjects| subjects.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every node occurring in subject or object position.
    pub fn nodes(&self) -> HashSet<u32> {
        let mut nodes: HashSet<u32> = self.spo.keys().copied().collect();
        nodes.extend(self.osp.keys().copied());
        nodes
    }
}
