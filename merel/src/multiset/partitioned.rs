/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::SolutionSet;
use crate::binding::Binding;
use crate::error::EvalError;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A write-only multiset for parallel producers. Row-ID space is divided
/// into fixed-size partitions keyed by monotonically increasing base
/// offsets: each worker reserves a base with `next_base_id` and assigns
/// IDs `base..base + partition_size` itself, so concurrent writers never
/// contend on the same partition.
#[derive(Debug)]
pub struct PartitionedSet {
    variables: Mutex<Vec<String>>,
    partition_size: usize,
    partitions: Vec<Mutex<FxHashMap<usize, Binding>>>,
    next_base: AtomicUsize,
}

impl PartitionedSet {
    pub fn new(num_partitions: usize, partition_size: usize) -> Self {
        let partition_size = partition_size.max(1);
        let partitions = (0..num_partitions.max(1))
            .map(|_| Mutex::new(FxHashMap::default()))
            .collect();
        Self {
            variables: Mutex::new(Vec::new()),
            partition_size,
            partitions,
            next_base: AtomicUsize::new(0),
        }
    }

    pub fn partition_size(&self) -> usize {
        self.partition_size
    }

    /// Reserves the next partition, returning its base ID.
    pub fn next_base_id(&self) -> usize {
        self.next_base.fetch_add(self.partition_size, Ordering::Relaxed)
    }

    /// Adds a row whose ID was assigned from a reserved base range.
    pub fn add(&self, row: Binding) -> Result<(), EvalError> {
        let index = row.id() / self.partition_size;
        let partition = self
            .partitions
            .get(index)
            .ok_or(EvalError::Structural("row ID outside the reserved partition range"))?;
        let mut guard = partition.lock().expect("partition lock poisoned");
        guard.insert(row.id(), row);
        Ok(())
    }

    pub fn remove(&self, id: usize) {
        if let Some(partition) = self.partitions.get(id / self.partition_size) {
            partition.lock().expect("partition lock poisoned").remove(&id);
        }
    }

    pub fn add_variables<I, S>(&self, vars: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut guard = self.variables.lock().expect("variables lock poisoned");
        for var in vars {
            let var = var.into();
            if !guard.contains(&var) {
                guard.push(var);
            }
        }
    }

    pub fn variables(&self) -> Vec<String> {
        self.variables.lock().expect("variables lock poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.partitions
            .iter()
            .map(|p| p.lock().expect("partition lock poisoned").len())
            .sum()
    }

    /// Clones all rows out of the partitions (IDs preserved).
    pub fn snapshot(&self) -> Vec<Binding> {
        self.partitions
            .iter()
            .flat_map(|p| {
                p.lock()
                    .expect("partition lock poisoned")
                    .values()
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Re-keys every partition into an ordinary multiset. IDs stay unique
    /// because partitions never overlap.
    pub fn flatten(self) -> SolutionSet {
        let mut set = SolutionSet::with_variables(self.variables());
        for partition in self.partitions {
            let rows = partition.into_inner().expect("partition lock poisoned");
            for (id, row) in rows {
                set.insert_raw(id, row);
            }
        }
        set
    }
}

impl Clone for PartitionedSet {
    fn clone(&self) -> Self {
        let partitions = self
            .partitions
            .iter()
            .map(|p| Mutex::new(p.lock().expect("partition lock poisoned").clone()))
            .collect();
        Self {
            variables: Mutex::new(self.variables()),
            partition_size: self.partition_size,
            partitions,
            next_base: AtomicUsize::new(self.next_base.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_bases_do_not_overlap() {
        let set = PartitionedSet::new(4, 8);
        assert_eq!(set.partition_size(), 8);
        let a = set.next_base_id();
        let b = set.next_base_id();
        assert_eq!(a, 0);
        assert_eq!(b, set.partition_size());
    }

    #[test]
    fn flatten_preserves_all_rows() {
        let set = PartitionedSet::new(2, 4);
        set.add_variables(["x"]);
        for _ in 0..2 {
            let base = set.next_base_id();
            for offset in 0..3 {
                let mut row = Binding::from_pairs([("x", (base + offset) as u32)]);
                row.set_id(base + offset);
                set.add(row).unwrap();
            }
        }
        assert_eq!(set.count(), 6);
        let flat = set.flatten();
        assert_eq!(flat.count(), 6);
        assert!(flat.contains_variable("x"));
    }
}
