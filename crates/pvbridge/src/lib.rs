// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # pvbridge - process variable access for behavior trees
//!
//! Non-blocking read and write tasks over named process variables (PVs),
//! driven by a tick-based behavior tree executor.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pvbridge::{
//!     ContextManager, HandleRegistry, ReadInputs, ReadTask, SimClient, SimPv, TaskStatus,
//!     ValueKind,
//! };
//! use std::time::Duration;
//!
//! fn main() -> pvbridge::Result<()> {
//!     let sim = SimClient::new();
//!     sim.add_pv("TEMP:1", SimPv::new(21.5_f64));
//!
//!     let context = ContextManager::shared(sim.shared());
//!     let registry = HandleRegistry::shared(context.clone(), Default::default());
//!
//!     let mut task = ReadTask::new(context, registry, ValueKind::Float64)?;
//!     let mut status = task.start(ReadInputs::new("TEMP:1"))?;
//!     while status == TaskStatus::Running {
//!         std::thread::sleep(Duration::from_millis(5));
//!         status = task.poll()?;
//!     }
//!     println!("{:?} -> {:?}", status, task.value());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +------------------------------------------------------------------+
//! |  tree:     Tree / NodeFactory / xml loader / PvGet* PvPut* nodes  |
//! +------------------------------------------------------------------+
//! |  task:     ReadTask / WriteTask (start, poll, halt)               |
//! +------------------------------------------------------------------+
//! |  registry: HandleRegistry (one PvHandle per name, weak entries)   |
//! |  handle:   PvHandle (channel, listeners, monitor cache)           |
//! +------------------------------------------------------------------+
//! |  context:  ContextManager (one client context per process)        |
//! |  client:   PvClient trait  <-  sim::SimClient                     |
//! +------------------------------------------------------------------+
//! ```
//!
//! ## Error model
//!
//! [`Error::is_fatal`] separates errors that abort a tick (bad
//! configuration, runtime setup, misuse) from request-level failures, which
//! tasks report as [`TaskStatus::Failed`] with the cause kept in
//! `last_error()`.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod handle;
pub mod registry;
pub mod sim;
pub mod task;
pub mod tree;
pub mod value;

pub use client::{ClientStatus, PvClient};
pub use config::BridgeConfig;
pub use context::ContextManager;
pub use error::{Error, Result};
pub use handle::{ConnectionState, HandleOptions, PvHandle};
pub use registry::HandleRegistry;
pub use sim::{SimClient, SimPv};
pub use task::{ReadInputs, ReadTask, TaskState, TaskStatus, WriteInputs, WriteTask};
pub use tree::{Blackboard, NodeFactory, NodeStatus, Tree, TreeNode};
pub use value::{convert, ConversionError, PvSample, PvValue, ValueKind};
