// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Bookkeeping for steps waiting on dependencies in deferred dispatch

use std::collections::BTreeMap;

/// Result of re-checking a pending step that is still blocked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recheck {
    /// Keep waiting
    Waiting,
    /// Gave up; the step has been dropped from the queue
    Stalled { attempts: u32, waiting_on: Vec<String> },
}

#[derive(Debug, Clone)]
struct Pending {
    waiting_on: Vec<String>,
    checks: u32,
}

/// Steps whose classification returned defer, keyed by declaration index
#[derive(Debug, Clone)]
pub struct DeferredQueue {
    pending: BTreeMap<usize, Pending>,
    max_rechecks: u32,
}

impl DeferredQueue {
    pub fn new(max_rechecks: u32) -> Self {
        Self {
            pending: BTreeMap::new(),
            max_rechecks: max_rechecks.max(1),
        }
    }

    /// Park a step; re-parking keeps its check count
    pub fn defer(&mut self, idx: usize, waiting_on: Vec<String>) {
        self.pending
            .entry(idx)
            .and_modify(|p| p.waiting_on = waiting_on.clone())
            .or_insert(Pending { waiting_on, checks: 0 });
    }

    /// Count one more unsuccessful check of `idx`
    pub fn still_waiting(&mut self, idx: usize, waiting_on: Vec<String>) -> Recheck {
        let Some(entry) = self.pending.get_mut(&idx) else {
            return Recheck::Waiting;
        };

        entry.checks += 1;
        entry.waiting_on = waiting_on;

        if entry.checks >= self.max_rechecks {
            let attempts = entry.checks;
            let waiting_on = std::mem::take(&mut entry.waiting_on);
            self.pending.remove(&idx);
            return Recheck::Stalled { attempts, waiting_on };
        }

        Recheck::Waiting
    }

    pub fn remove(&mut self, idx: usize) -> bool {
        self.pending.remove(&idx).is_some()
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.pending.contains_key(&idx)
    }

    /// Pending indices in declaration order
    pub fn pending(&self) -> Vec<usize> {
        self.pending.keys().copied().collect()
    }

    pub fn waiting_on(&self, idx: usize) -> Option<&[String]> {
        self.pending.get(&idx).map(|p| p.waiting_on.as_slice())
    }

    /// Drain everything, e.g. on cancellation
    pub fn drain(&mut self) -> Vec<(usize, Vec<String>)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(idx, p)| (idx, p.waiting_on))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
