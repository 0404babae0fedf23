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
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// A read-only GROUP BY view over an ordinary multiset. Each key row binds
/// the grouping variables and carries back-references to the IDs of its
/// member rows in the underlying multiset.
#[derive(Debug, Clone)]
pub struct GroupSet {
    keys: SolutionSet,
    groups: FxHashMap<usize, Vec<usize>>,
    base: SolutionSet,
}

impl GroupSet {
    /// Partitions the rows of `base` by their values for `vars`. Rows
    /// leaving a grouping variable unbound form their own group keyed by
    /// the unbound combination.
    pub fn group_by(base: SolutionSet, vars: &[String]) -> GroupSet {
        let mut buckets: BTreeMap<Vec<Option<u32>>, Vec<usize>> = BTreeMap::new();
        for row in base.iter() {
            let key: Vec<Option<u32>> = vars.iter().map(|v| row.value(v)).collect();
            buckets.entry(key).or_default().push(row.id());
        }

        let mut keys = SolutionSet::with_variables(vars.iter().cloned());
        let mut groups = FxHashMap::default();
        for (key, members) in buckets {
            let pairs = vars
                .iter()
                .zip(&key)
                .filter_map(|(v, t)| t.map(|t| (v.clone(), t)));
            let id = keys.add(Binding::from_pairs(pairs));
            groups.insert(id, members);
        }
        GroupSet { keys, groups, base }
    }

    pub fn keys(&self) -> &SolutionSet {
        &self.keys
    }

    /// Member row IDs of the group behind the given key row.
    pub fn members(&self, key_id: usize) -> &[usize] {
        self.groups.get(&key_id).map(|m| m.as_slice()).unwrap_or(&[])
    }

    pub fn member_rows(&self, key_id: usize) -> Vec<&Binding> {
        self.members(key_id)
            .iter()
            .filter_map(|&id| self.base.row(id))
            .collect()
    }

    pub fn base(&self) -> &SolutionSet {
        &self.base
    }

    pub fn into_keys(self) -> SolutionSet {
        self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_partition_rows_by_key() {
        let mut base = SolutionSet::new();
        base.add(Binding::from_pairs([("x", 1u32), ("y", 10)]));
        base.add(Binding::from_pairs([("x", 1u32), ("y", 20)]));
        base.add(Binding::from_pairs([("x", 2u32), ("y", 30)]));

        let grouped = GroupSet::group_by(base, &["x".to_string()]);
        assert_eq!(grouped.keys().count(), 2);

        for key in grouped.keys().iter() {
            let members = grouped.member_rows(key.id());
            match key.value("x") {
                Some(1) => assert_eq!(members.len(), 2),
                Some(2) => assert_eq!(members.len(), 1),
                other => panic!("unexpected group key {other:?}"),
            }
            assert!(members.iter().all(|m| m.value("x") == key.value("x")));
        }
    }
}
