/*
 * Copyright © 2025 Volodymyr Kadzhaia
 * Copyright © 2025 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Dictionary for encoding and decoding RDF terms as dense u32 IDs
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dictionary {
    string_to_id: HashMap<String, u32>,
    id_to_string: HashMap<u32, String>,
    next_id: u32,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a term, returning its existing ID when already known.
    pub fn encode(&mut self, value: &str) -> u32 {
        if let Some(&id) = self.string_to_id.get(value) {
            return id;
        }
        let id = self.next_id;
        self.string_to_id.insert(value.to_string(), id);
        self.id_to_string.insert(id, value.to_string());
        self.next_id += 1;
        id
    }

    /// Looks up an already-interned term without assigning a new ID.
    pub fn lookup(&self, value: &str) -> Option<u32> {
        self.string_to_id.get(value).copied()
    }

    pub fn decode(&self, id: u32) -> Option<&str> {
        self.id_to_string.get(&id).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.id_to_string.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_string.is_empty()
    }

    pub fn merge(&mut self, other: &Dictionary) {
        for (key, value) in other.string_to_id.iter() {
            self.string_to_id.entry(key.clone()).or_insert(*value);
        }
        for (key, value) in other.id_to_string.iter() {
            self.id_to_string.entry(*key).or_insert_with(|| value.clone());
        }
        self.next_id = self.next_id.max(other.next_id);
    }
}
