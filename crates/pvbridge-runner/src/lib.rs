// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! pvbridge tree runner
//!
//! Loads a behavior tree definition, serves its PVs from the in-process
//! simulated client and ticks the tree until it settles.
//!
//! # Quick Start
//!
//! ```bash
//! # Write an example configuration
//! pvbridge-runner gen-config --output pvbridge.toml
//!
//! # Run a tree against it
//! pvbridge-runner run --config pvbridge.toml tree.xml
//!
//! # Check a configuration and tree without running
//! pvbridge-runner validate --config pvbridge.toml --tree tree.xml
//! ```
//!
//! The exit code reflects the root status: `0` success, `1` failure, `2`
//! anything else (stopped, or aborted by a fatal error).

pub mod config;
pub mod runner;

pub use config::{ConfigError, RunnerConfig, RunnerSection, SimPvConfig, SimSection};
pub use runner::{exit_code, Runner, RunnerError, RunnerHandle};
