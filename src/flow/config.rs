// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Ordered configuration overlay

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::FlowValue;

/// Success flag written by runners and stored in every run record
pub const STATUS_KEY: &str = "status";
/// Process exit code written by runners
pub const EXIT_CODE_KEY: &str = "exitCode";
/// Set by a before-script to suppress the tool invocation
pub const IMPEDE_KEY: &str = "impede";
/// Zero-based index of the current loop iteration
pub const LOOP_INDEX_KEY: &str = "loop_index";
/// Rendered command of the step being run, visible to scripts
pub const COMMAND_KEY: &str = "command";
/// Root directory for step output folders
pub const OUTPUT_DIR_KEY: &str = "output_dir";
/// Root directory for input data
pub const DATA_DIR_KEY: &str = "data_dir";
/// Output folder of the step being run
pub const SELF_DIR_KEY: &str = "self_dir";
/// Alias of [`SELF_DIR_KEY`]
pub const LOCATION_KEY: &str = "location";

/// Key under which the current element of a loop is exposed
pub fn loop_item_key(loop_variable: &str) -> String {
    format!("{}_item", loop_variable)
}

/// Ordered key/value configuration.
///
/// Keys are unique and keep insertion order. Cloning produces an
/// independent overlay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowConfig {
    entries: IndexMap<String, FlowValue>,
}

impl FlowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FlowValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FlowValue>) -> Option<FlowValue> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<FlowValue> {
        self.entries.shift_remove(key)
    }

    /// Insert an empty string unless the key is already present
    pub fn insert_default(&mut self, key: &str) {
        if !self.entries.contains_key(key) {
            self.entries.insert(key.to_string(), FlowValue::String(String::new()));
        }
    }

    /// Copy every entry of `other` into this config, overwriting duplicates
    pub fn fill(&mut self, other: &FlowConfig) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// A fresh copy of this config for a child branch
    pub fn overlay(&self) -> FlowConfig {
        self.clone()
    }

    /// Resolve a dotted path such as `sample.reads` through nested maps
    pub fn lookup(&self, path: &str) -> Option<&FlowValue> {
        if let Some(value) = self.entries.get(path) {
            return Some(value);
        }

        let mut segments = path.split('.');
        let mut current = self.entries.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                FlowValue::Map(map) => map.get(segment)?,
                FlowValue::List(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// The `status` flag, if present and boolean
    pub fn status(&self) -> Option<bool> {
        self.get(STATUS_KEY).and_then(FlowValue::as_bool)
    }

    /// The `exitCode` value, if present and numeric
    pub fn exit_code(&self) -> Option<i64> {
        self.get(EXIT_CODE_KEY).and_then(FlowValue::as_i64)
    }

    /// Whether a script asked to skip the tool invocation
    pub fn is_impeded(&self) -> bool {
        self.get(IMPEDE_KEY).and_then(FlowValue::as_bool).unwrap_or(false)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FlowValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, FlowValue)> for FlowConfig {
    fn from_iter<T: IntoIterator<Item = (String, FlowValue)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl From<IndexMap<String, FlowValue>> for FlowConfig {
    fn from(entries: IndexMap<String, FlowValue>) -> Self {
        Self { entries }
    }
}

impl IntoIterator for FlowConfig {
    type Item = (String, FlowValue);
    type IntoIter = indexmap::map::IntoIter<String, FlowValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
