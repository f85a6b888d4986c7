// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Minimal tick-driven behavior tree executor.
//!
//! A [`Tree`] owns a root [`TreeNode`] and a shared [`Blackboard`]. Each
//! `tick_once` walks the tree from the root; nodes report
//! [`NodeStatus::Running`] while asynchronous work is pending and are ticked
//! again on the next pass. Nothing in a tick blocks.
//!
//! # Architecture
//!
//! ```text
//! xml::load_tree ──> NodeFactory ──> Box<dyn TreeNode> (root)
//!                                        │
//!                  Sequence / Fallback / RetryUntilSuccessful / Inverter
//!                                        │
//!                  Print / Sleep / PvGet<Kind> / PvPut<Kind> ...
//! ```
//!
//! Node errors are split the same way task errors are: a fatal error aborts
//! the tick with `Err`, everything else is a `Failure` status that composites
//! and `RetryUntilSuccessful` can react to.

mod actions;
mod blackboard;
mod control;
mod factory;
mod ports;
mod pv_nodes;
pub mod xml;

pub use actions::{AlwaysFailure, AlwaysSuccess, Print, SetBlackboard, Sleep};
pub use blackboard::Blackboard;
pub use control::{Fallback, Inverter, RetryUntilSuccessful, Sequence};
pub use factory::{NodeArity, NodeBuilder, NodeFactory, NodeDef};
pub use ports::{PortValue, Ports};
pub use pv_nodes::{PvGetNode, PvPutNode};

use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Status returned by a node tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Not ticked since the last reset.
    Idle,
    Running,
    Success,
    Failure,
}

impl NodeStatus {
    #[must_use]
    pub fn is_done(self) -> bool {
        matches!(self, NodeStatus::Success | NodeStatus::Failure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Idle => "IDLE",
            NodeStatus::Running => "RUNNING",
            NodeStatus::Success => "SUCCESS",
            NodeStatus::Failure => "FAILURE",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of a tree.
///
/// `tick` is only ever called from the thread driving the tree.
pub trait TreeNode: Send {
    fn name(&self) -> &str;

    fn tick(&mut self, bb: &Blackboard) -> Result<NodeStatus>;

    /// Stop any running work and return to the idle state.
    fn halt(&mut self);
}

/// A loaded tree ready to be ticked.
pub struct Tree {
    id: String,
    root: Box<dyn TreeNode>,
    blackboard: Arc<Blackboard>,
    status: NodeStatus,
}

impl Tree {
    pub fn new(
        id: impl Into<String>,
        root: Box<dyn TreeNode>,
        blackboard: Arc<Blackboard>,
    ) -> Self {
        Self {
            id: id.into(),
            root,
            blackboard,
            status: NodeStatus::Idle,
        }
    }

    /// ID of the `<BehaviorTree>` this tree was built from.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn blackboard(&self) -> &Arc<Blackboard> {
        &self.blackboard
    }

    /// Status returned by the latest tick.
    #[must_use]
    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Tick the root once.
    pub fn tick_once(&mut self) -> Result<NodeStatus> {
        let status = self.root.tick(&self.blackboard);
        match status {
            Ok(status) => {
                self.status = status;
                Ok(status)
            }
            Err(e) => {
                log::error!("[tree] '{}' aborted: {}", self.id, e);
                self.root.halt();
                self.status = NodeStatus::Idle;
                Err(e)
            }
        }
    }

    /// Tick until the root stops returning `Running`, sleeping `interval`
    /// between ticks.
    pub fn tick_while_running(&mut self, interval: Duration) -> Result<NodeStatus> {
        let mut ticks: u64 = 0;
        loop {
            let status = self.tick_once()?;
            ticks += 1;
            if status != NodeStatus::Running {
                log::debug!("[tree] '{}' finished {} after {} ticks", self.id, status, ticks);
                return Ok(status);
            }
            if !interval.is_zero() {
                std::thread::sleep(interval);
            }
        }
    }

    /// Halt every running node.
    pub fn halt(&mut self) {
        self.root.halt();
        self.status = NodeStatus::Idle;
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("id", &self.id)
            .field("root", &self.root.name())
            .field("status", &self.status)
            .finish()
    }
}
