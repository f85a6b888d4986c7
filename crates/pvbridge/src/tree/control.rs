// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Composite and decorator nodes.

use super::{Blackboard, NodeStatus, TreeNode};
use crate::error::Result;

/// Ticks children in order; fails on the first failure, succeeds when all
/// succeed. A running child resumes on the next tick.
pub struct Sequence {
    name: String,
    children: Vec<Box<dyn TreeNode>>,
    current: usize,
}

impl Sequence {
    pub fn new(name: impl Into<String>, children: Vec<Box<dyn TreeNode>>) -> Self {
        Self {
            name: name.into(),
            children,
            current: 0,
        }
    }
}

impl TreeNode for Sequence {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, bb: &Blackboard) -> Result<NodeStatus> {
        while self.current < self.children.len() {
            match self.children[self.current].tick(bb)? {
                NodeStatus::Success => self.current += 1,
                NodeStatus::Failure => {
                    self.halt();
                    return Ok(NodeStatus::Failure);
                }
                status => return Ok(status),
            }
        }
        self.current = 0;
        Ok(NodeStatus::Success)
    }

    fn halt(&mut self) {
        for child in &mut self.children {
            child.halt();
        }
        self.current = 0;
    }
}

/// Ticks children in order until one succeeds.
pub struct Fallback {
    name: String,
    children: Vec<Box<dyn TreeNode>>,
    current: usize,
}

impl Fallback {
    pub fn new(name: impl Into<String>, children: Vec<Box<dyn TreeNode>>) -> Self {
        Self {
            name: name.into(),
            children,
            current: 0,
        }
    }
}

impl TreeNode for Fallback {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, bb: &Blackboard) -> Result<NodeStatus> {
        while self.current < self.children.len() {
            match self.children[self.current].tick(bb)? {
                NodeStatus::Failure => self.current += 1,
                NodeStatus::Success => {
                    self.halt();
                    return Ok(NodeStatus::Success);
                }
                status => return Ok(status),
            }
        }
        self.current = 0;
        Ok(NodeStatus::Failure)
    }

    fn halt(&mut self) {
        for child in &mut self.children {
            child.halt();
        }
        self.current = 0;
    }
}

/// Re-runs its child after a failure, up to `attempts` times. A negative
/// count retries forever.
pub struct RetryUntilSuccessful {
    name: String,
    child: Box<dyn TreeNode>,
    attempts: i32,
    failures: i32,
}

impl RetryUntilSuccessful {
    pub fn new(name: impl Into<String>, child: Box<dyn TreeNode>, attempts: i32) -> Self {
        Self {
            name: name.into(),
            child,
            attempts,
            failures: 0,
        }
    }
}

impl TreeNode for RetryUntilSuccessful {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, bb: &Blackboard) -> Result<NodeStatus> {
        loop {
            match self.child.tick(bb)? {
                NodeStatus::Success => {
                    self.failures = 0;
                    return Ok(NodeStatus::Success);
                }
                NodeStatus::Failure => {
                    self.failures += 1;
                    self.child.halt();
                    if self.attempts >= 0 && self.failures >= self.attempts {
                        log::debug!(
                            "[tree] '{}' giving up after {} attempts",
                            self.name,
                            self.failures
                        );
                        self.failures = 0;
                        return Ok(NodeStatus::Failure);
                    }
                    // An unbounded retry yields between attempts.
                    if self.attempts < 0 {
                        return Ok(NodeStatus::Running);
                    }
                }
                status => return Ok(status),
            }
        }
    }

    fn halt(&mut self) {
        self.child.halt();
        self.failures = 0;
    }
}

/// Swaps `Success` and `Failure`.
pub struct Inverter {
    name: String,
    child: Box<dyn TreeNode>,
}

impl Inverter {
    pub fn new(name: impl Into<String>, child: Box<dyn TreeNode>) -> Self {
        Self {
            name: name.into(),
            child,
        }
    }
}

impl TreeNode for Inverter {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, bb: &Blackboard) -> Result<NodeStatus> {
        Ok(match self.child.tick(bb)? {
            NodeStatus::Success => NodeStatus::Failure,
            NodeStatus::Failure => NodeStatus::Success,
            status => status,
        })
    }

    fn halt(&mut self) {
        self.child.halt();
    }
}
