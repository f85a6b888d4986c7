// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared key/value store that tree nodes read inputs from and write
//! outputs to.

use crate::value::PvValue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct Blackboard {
    entries: Mutex<HashMap<String, PvValue>>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<PvValue> {
        self.entries.lock().get(key).cloned()
    }

    /// Store `value`, returning the previous entry.
    pub fn set(&self, key: &str, value: impl Into<PvValue>) -> Option<PvValue> {
        self.entries.lock().insert(key.to_string(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<PvValue> {
        self.entries.lock().remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Sorted key list.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries.lock().iter()).finish()
    }
}
