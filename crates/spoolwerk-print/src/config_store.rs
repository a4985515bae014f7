// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Runtime key/value parameters set by clients (`readConfig`/`setConfig`).
// Keys and values are opaque strings; nothing is validated.

use std::collections::HashMap;

use tracing::debug;

#[derive(Debug, Default, Clone)]
pub struct ConfigStore {
    entries: HashMap<String, String>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Set `key` to `value`, silently replacing any earlier value.
    /// Returns the replaced value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let previous = self.entries.insert(key.clone(), value.into());
        debug!(%key, overwritten = previous.is_some(), "config value set");
        previous
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
