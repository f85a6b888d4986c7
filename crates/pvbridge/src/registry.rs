// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Name-keyed registry of shared PV handles.
//!
//! ```text
//! HandleRegistry
//! +-- handles: Mutex<HashMap<String, Weak<PvHandle>>>
//! +-- [strong refs held by the tasks using each handle]
//! ```
//!
//! The registry never keeps a handle alive. Once the last task lets go, the
//! handle is destroyed (and its channel released) but its entry stays until
//! [`HandleRegistry::collect_garbage`] sweeps it or the next `acquire` of the
//! same name replaces it.
//!
//! Handle construction makes no client call, so holding the registry lock
//! across it is safe and gives the one-instance-per-name guarantee.

use crate::context::ContextManager;
use crate::handle::{HandleOptions, PvHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Shares one [`PvHandle`] per PV name between tasks.
pub struct HandleRegistry {
    context: Arc<ContextManager>,
    options: HandleOptions,
    handles: Mutex<HashMap<String, Weak<PvHandle>>>,
}

impl HandleRegistry {
    pub fn new(context: Arc<ContextManager>, options: HandleOptions) -> Self {
        Self {
            context,
            options,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Convenience constructor returning a shared registry.
    pub fn shared(context: Arc<ContextManager>, options: HandleOptions) -> Arc<Self> {
        Arc::new(Self::new(context, options))
    }

    /// Context manager the handles are bound to.
    #[must_use]
    pub fn context(&self) -> &Arc<ContextManager> {
        &self.context
    }

    /// Return the live handle for `name`, creating it if the entry is
    /// absent or expired.
    pub fn acquire(&self, name: &str) -> Arc<PvHandle> {
        let mut handles = self.handles.lock();

        if let Some(strong) = handles.get(name).and_then(Weak::upgrade) {
            return strong;
        }

        let handle = PvHandle::new(name, Arc::clone(&self.context), self.options);
        handles.insert(name.to_string(), Arc::downgrade(&handle));
        log::debug!("[registry] created handle for '{}'", name);
        handle
    }

    /// Live handle for `name`, without creating one.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<PvHandle>> {
        self.handles.lock().get(name).and_then(Weak::upgrade)
    }

    /// Drop the entry for `name` even if the handle is still alive. Tasks
    /// already holding it keep using it; the next `acquire` builds a new one.
    pub fn release(&self, name: &str) -> bool {
        self.handles.lock().remove(name).is_some()
    }

    /// Remove entries whose handle has been destroyed. Returns how many were
    /// removed.
    pub fn collect_garbage(&self) -> usize {
        let mut handles = self.handles.lock();
        let before = handles.len();
        handles.retain(|_, weak| weak.strong_count() > 0);
        let removed = before - handles.len();
        if removed > 0 {
            log::debug!("[registry] collected {} expired handle(s)", removed);
        }
        removed
    }

    /// Whether an entry (live or expired) exists for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handles.lock().contains_key(name)
    }

    /// Entry count, including expired entries not yet collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    /// Entries whose handle is still alive.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.handles
            .lock()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Forget every entry. Live handles are unaffected.
    pub fn clear(&self) {
        let mut handles = self.handles.lock();
        let n = handles.len();
        handles.clear();
        if n > 0 {
            log::debug!("[registry] cleared {} entries", n);
        }
    }
}

impl std::fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handles = self.handles.lock();
        f.debug_struct("HandleRegistry")
            .field("entries", &handles.len())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests;
