/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::index::TripleIndex;
use crate::triple::Triple;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Which graphs of a dataset are visible to pattern lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveGraph {
    Default,
    Named(u32),
    Union(Vec<u32>),
}

/// An RDF dataset: one default graph plus zero or more named graphs,
/// each backed by its own permutation index. The dataset is read-only
/// during query evaluation and may be shared across threads.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub default_graph: TripleIndex,
    pub named_graphs: HashMap<u32, TripleIndex>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, triple: Triple) -> bool {
        self.default_graph.insert(&triple)
    }

    pub fn insert_named(&mut self, graph: u32, triple: Triple) -> bool {
        self.named_graphs.entry(graph).or_default().insert(&triple)
    }

    pub fn graph(&self, graph: u32) -> Option<&TripleIndex> {
        self.named_graphs.get(&graph)
    }

    pub fn graph_names(&self) -> impl Iterator<Item = u32> + '_ {
        self.named_graphs.keys().copied()
    }

    fn visible<'a>(&'a self, active: &ActiveGraph) -> Vec<&'a TripleIndex> {
        match active {
            ActiveGraph::Default => vec![&self.default_graph],
            ActiveGraph::Named(g) => self.named_graphs.get(g).into_iter().collect(),
            ActiveGraph::Union(graphs) => graphs
                .iter()
                .filter_map(|g| self.named_graphs.get(g))
                .collect(),
        }
    }

    pub fn match_pattern(
        &self,
        active: &ActiveGraph,
        s: Option<u32>,
        p: Option<u32>,
        o: Option<u32>,
    ) -> Vec<Triple> {
        let indexes = self.visible(active);
        if indexes.len() == 1 {
            return indexes[0].match_pattern(s, p, o);
        }
        // A union view can hold the same triple in several graphs
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for index in indexes {
            for triple in index.match_pattern(s, p, o) {
                if seen.insert(triple) {
                    results.push(triple);
                }
            }
        }
        results
    }

    pub fn objects_for(&self, active: &ActiveGraph, s: u32, p: u32) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .visible(active)
            .iter()
            .flat_map(|index| index.objects_for(s, p))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn subjects_for(&self, active: &ActiveGraph, p: u32, o: u32) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .visible(active)
            .iter()
            .flat_map(|index| index.subjects_for(p, o))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn nodes(&self, active: &ActiveGraph) -> HashSet<u32> {
        let mut nodes = HashSet::new();
        for index in self.visible(active) {
            nodes.extend(index.nodes());
        }
        nodes
    }

    pub fn has_any(&self, active: &ActiveGraph) -> bool {
        self.visible(active).iter().any(|index| !index.is_empty())
    }
}
