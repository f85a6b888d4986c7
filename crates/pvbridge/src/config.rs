// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge configuration.
//!
//! Constants used when a port or config field is left unset, plus
//! [`BridgeConfig`], the serde-friendly settings block the runner reads from
//! its `[bridge]` table.

use crate::handle::HandleOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request timeout applied when a task is started without one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// How often the runner sweeps expired registry entries.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(10);

/// Blackboard port names shared by the PV nodes.
pub mod ports {
    pub const PV: &str = "pv";
    pub const TIMEOUT: &str = "timeout";
    pub const USE_CACHED: &str = "use_cached";
    pub const VALUE: &str = "value";
    pub const FORCE_WRITE: &str = "force_write";
    pub const RESULT: &str = "result";
}

/// Runtime settings for the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Timeout (ms) for tasks whose `timeout` port is unset.
    pub default_timeout_ms: u64,
    /// Subscribe to value updates once a handle connects.
    pub subscribe_on_connect: bool,
    /// Registry sweep period (ms); 0 disables periodic sweeps.
    pub gc_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            subscribe_on_connect: true,
            gc_interval_ms: DEFAULT_GC_INTERVAL.as_millis() as u64,
        }
    }
}

impl BridgeConfig {
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// `None` when periodic sweeps are disabled.
    #[must_use]
    pub fn gc_interval(&self) -> Option<Duration> {
        (self.gc_interval_ms > 0).then(|| Duration::from_millis(self.gc_interval_ms))
    }

    #[must_use]
    pub fn handle_options(&self) -> HandleOptions {
        HandleOptions {
            subscribe_on_connect: self.subscribe_on_connect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.default_timeout(), DEFAULT_TIMEOUT);
        assert_eq!(cfg.gc_interval(), Some(DEFAULT_GC_INTERVAL));
        assert!(cfg.handle_options().subscribe_on_connect);
    }

    #[test]
    fn zero_gc_interval_disables_sweeps() {
        let cfg = BridgeConfig {
            gc_interval_ms: 0,
            ..BridgeConfig::default()
        };
        assert_eq!(cfg.gc_interval(), None);
    }
}
