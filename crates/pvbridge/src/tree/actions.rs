// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Built-in leaf nodes.

use super::{Blackboard, NodeStatus, Ports, TreeNode};
use crate::error::{Error, Result};
use crate::value::{PvValue, ValueKind};
use std::time::Instant;

/// Writes its `message` port to stdout.
pub struct Print {
    name: String,
    ports: Ports,
}

impl Print {
    pub fn new(name: impl Into<String>, ports: Ports) -> Self {
        Self {
            name: name.into(),
            ports,
        }
    }
}

impl TreeNode for Print {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, bb: &Blackboard) -> Result<NodeStatus> {
        let Some(message) = self.ports.get_text(bb, "message") else {
            return Err(Error::Config(format!(
                "node '{}': missing required input 'message'",
                self.name
            )));
        };
        println!("{}", message);
        log::debug!("[tree] {}: {}", self.name, message);
        Ok(NodeStatus::Success)
    }

    fn halt(&mut self) {}
}

/// Returns `Running` until `msec` milliseconds have passed since its first
/// tick. Never blocks the tick thread.
pub struct Sleep {
    name: String,
    ports: Ports,
    deadline: Option<Instant>,
}

impl Sleep {
    pub fn new(name: impl Into<String>, ports: Ports) -> Self {
        Self {
            name: name.into(),
            ports,
            deadline: None,
        }
    }
}

impl TreeNode for Sleep {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, bb: &Blackboard) -> Result<NodeStatus> {
        let deadline = match self.deadline {
            Some(deadline) => deadline,
            None => {
                let Some(wait) = self.ports.get_millis(bb, "msec")? else {
                    return Err(Error::Config(format!(
                        "node '{}': missing required input 'msec'",
                        self.name
                    )));
                };
                let deadline = Instant::now() + wait;
                self.deadline = Some(deadline);
                deadline
            }
        };
        if Instant::now() >= deadline {
            self.deadline = None;
            Ok(NodeStatus::Success)
        } else {
            Ok(NodeStatus::Running)
        }
    }

    fn halt(&mut self) {
        self.deadline = None;
    }
}

pub struct AlwaysSuccess {
    name: String,
}

impl AlwaysSuccess {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TreeNode for AlwaysSuccess {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, _bb: &Blackboard) -> Result<NodeStatus> {
        Ok(NodeStatus::Success)
    }

    fn halt(&mut self) {}
}

pub struct AlwaysFailure {
    name: String,
}

impl AlwaysFailure {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TreeNode for AlwaysFailure {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, _bb: &Blackboard) -> Result<NodeStatus> {
        Ok(NodeStatus::Failure)
    }

    fn halt(&mut self) {}
}

/// Copies its `value` port into the blackboard entry named by
/// `output_key`. Numeric literals are stored as numbers, anything else as
/// text.
pub struct SetBlackboard {
    name: String,
    ports: Ports,
}

impl SetBlackboard {
    pub fn new(name: impl Into<String>, ports: Ports) -> Self {
        Self {
            name: name.into(),
            ports,
        }
    }
}

impl TreeNode for SetBlackboard {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, bb: &Blackboard) -> Result<NodeStatus> {
        let (Some(key), Some(text)) = (
            self.ports.key("output_key"),
            self.ports.get_text(bb, "value"),
        ) else {
            return Err(Error::Config(format!(
                "node '{}': 'value' and 'output_key' are required",
                self.name
            )));
        };
        let value = if let Ok(i) = text.trim().parse::<i32>() {
            PvValue::Int32(i)
        } else {
            PvValue::parse(ValueKind::Float64, &text).unwrap_or(PvValue::Text(text))
        };
        bb.set(&key, value);
        Ok(NodeStatus::Success)
    }

    fn halt(&mut self) {}
}
