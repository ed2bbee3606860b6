// Copyright 2020 by Michael Thies <mail@mhthies.de>
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except in compliance with
// the License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Approximate name lookup, used to resolve the free-text student names of the survey and the
//! configuration.

/// A name → value mapping with case-insensitive keys, which falls back to the most similar key
/// (normalized Levenshtein similarity) if there is no exact match.
#[derive(Clone, Debug)]
pub struct FuzzyDict<V> {
    entries: Vec<(String, V)>,
    cutoff: f64,
}

impl<V> FuzzyDict<V> {
    /// Create an empty dictionary. Approximate matches need a similarity of at least `cutoff`
    /// (0.0 to 1.0).
    pub fn new(cutoff: f64) -> Self {
        FuzzyDict {
            entries: Vec::new(),
            cutoff,
        }
    }

    /// Insert a value. An existing entry with the same (case-insensitive) key is replaced and its
    /// value returned.
    pub fn insert(&mut self, key: &str, value: V) -> Option<V> {
        let key = normalize(key);
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => Some(std::mem::replace(&mut entry.1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Look up the value of the exact key or, if there is none, of the most similar key above
    /// the cutoff
    pub fn get(&self, key: &str) -> Option<&V> {
        let key = normalize(key);
        if let Some((_, v)) = self.entries.iter().find(|(k, _)| *k == key) {
            return Some(v);
        }

        let mut best: Option<(f64, &V)> = None;
        for (k, v) in self.entries.iter() {
            let similarity = strsim::normalized_levenshtein(&key, k);
            if similarity >= self.cutoff && best.map_or(true, |(s, _)| similarity > s) {
                best = Some((similarity, v));
            }
        }
        best.map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize(key: &str) -> String {
    key.trim().to_lowercase()
}
