// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runner configuration.
//!
//! ```toml
//! [bridge]
//! default_timeout_ms = 1000
//! subscribe_on_connect = true
//! gc_interval_ms = 10000
//!
//! [runner]
//! tick_interval_ms = 10
//! log_level = "info"
//!
//! [[sim.pvs]]
//! name = "TEMP:1"
//! kind = "float64"
//! value = "21.5"
//! reply_after_ms = 20
//! ```

use pvbridge::{BridgeConfig, PvValue, SimPv, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level runner configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Library settings (timeouts, monitors, registry sweeps).
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Tick loop settings.
    #[serde(default)]
    pub runner: RunnerSection,

    /// PVs served by the in-process simulated client.
    #[serde(default)]
    pub sim: SimSection,
}

/// `[runner]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSection {
    /// Pause between ticks (milliseconds).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Log level or `EnvFilter` directive.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_tick_interval() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            log_level: default_log_level(),
        }
    }
}

/// `[sim]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimSection {
    #[serde(default)]
    pub pvs: Vec<SimPvConfig>,
}

/// One `[[sim.pvs]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimPvConfig {
    pub name: String,

    /// Native value kind (`int32`, `float32`, `float64`, `enum`, `text`).
    pub kind: ValueKind,

    /// Initial value, parsed as `kind`.
    pub value: String,

    /// Delay before the channel connects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_after_ms: Option<u64>,

    /// Delay before get/put replies are delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_after_ms: Option<u64>,

    #[serde(default)]
    pub never_connect: bool,

    #[serde(default)]
    pub never_reply: bool,

    #[serde(default)]
    pub reject_puts: bool,
}

impl SimPvConfig {
    pub fn new(name: impl Into<String>, kind: ValueKind, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            value: value.into(),
            connect_after_ms: None,
            reply_after_ms: None,
            never_connect: false,
            never_reply: false,
            reject_puts: false,
        }
    }

    /// Build the simulated PV this entry describes.
    pub fn to_sim_pv(&self) -> Result<SimPv, ConfigError> {
        let value = PvValue::parse(self.kind, &self.value).map_err(|e| {
            ConfigError::Invalid(format!("sim PV '{}': {}", self.name, e))
        })?;

        let mut pv = SimPv::new(value);
        if let Some(ms) = self.connect_after_ms {
            pv = pv.connect_after(Duration::from_millis(ms));
        }
        if let Some(ms) = self.reply_after_ms {
            pv = pv.reply_after(Duration::from_millis(ms));
        }
        if self.never_connect {
            pv = pv.never_connect();
        }
        if self.never_reply {
            pv = pv.never_reply();
        }
        if self.reject_puts {
            pv = pv.reject_puts();
        }
        Ok(pv)
    }
}

impl RunnerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.runner.tick_interval_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "bridge.default_timeout_ms must be greater than zero".into(),
            ));
        }

        let mut seen = HashSet::new();
        for (i, pv) in self.sim.pvs.iter().enumerate() {
            if pv.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("sim PV {} has an empty name", i)));
            }
            if !seen.insert(pv.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "sim PV '{}' is defined twice",
                    pv.name
                )));
            }
            if pv.never_connect && pv.connect_after_ms.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "sim PV '{}' sets both never_connect and connect_after_ms",
                    pv.name
                )));
            }
            pv.to_sim_pv()?;
        }

        Ok(())
    }

    /// Configuration written by `gen-config`.
    pub fn example() -> Self {
        let mut slow = SimPvConfig::new("PUMP:SPEED", ValueKind::Int32, "1200");
        slow.reply_after_ms = Some(50);
        let mut offline = SimPvConfig::new("VALVE:STATE", ValueKind::Enum, "0");
        offline.never_connect = true;

        Self {
            bridge: BridgeConfig::default(),
            runner: RunnerSection::default(),
            sim: SimSection {
                pvs: vec![
                    SimPvConfig::new("TEMP:1", ValueKind::Float64, "21.5"),
                    SimPvConfig::new("TEMP:SETPOINT", ValueKind::Float64, "20.0"),
                    slow,
                    offline,
                ],
            },
        }
    }
}

impl std::str::FromStr for RunnerConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}
