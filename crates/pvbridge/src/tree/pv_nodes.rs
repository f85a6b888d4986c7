// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tree nodes wrapping [`ReadTask`] and [`WriteTask`].
//!
//! | Port          | Node | Type     | Default      |
//! |---------------|------|----------|--------------|
//! | `pv`          | both | text     | required     |
//! | `timeout`     | both | ms       | bridge default |
//! | `use_cached`  | get  | bool     | `false`      |
//! | `value`       | put  | node kind| required     |
//! | `force_write` | put  | bool     | `false`      |
//! | `result`      | get  | output   | not written  |
//! | `severity`    | get  | output   | not written  |
//! | `status`      | get  | output   | not written  |
//! | `timestamp`   | get  | output   | not written  |
//! | `count`       | get  | output   | not written  |
//!
//! `use_monitor` is accepted as a synonym for `use_cached`. The alarm ports
//! receive the sample metadata as `Int32`, and `timestamp` as `Float64`
//! seconds since the Unix epoch.

use super::{Blackboard, NodeStatus, Ports, TreeNode};
use crate::config::ports;
use crate::error::{Error, Result};
use crate::task::{ReadInputs, ReadTask, TaskStatus, WriteInputs, WriteTask};
use crate::value::{PvSample, PvValue};
use std::time::UNIX_EPOCH;

const USE_MONITOR: &str = "use_monitor";
const SEVERITY: &str = "severity";
const STATUS: &str = "status";
const TIMESTAMP: &str = "timestamp";
const COUNT: &str = "count";

fn as_i32(n: impl TryInto<i32>) -> PvValue {
    PvValue::Int32(n.try_into().unwrap_or(i32::MAX))
}

fn node_status(status: TaskStatus) -> NodeStatus {
    match status {
        TaskStatus::Running => NodeStatus::Running,
        TaskStatus::Succeeded => NodeStatus::Success,
        TaskStatus::Failed => NodeStatus::Failure,
    }
}

/// Prefix input errors with the node name.
fn in_node(name: &str, error: Error) -> Error {
    match error {
        Error::Config(msg) => Error::Config(format!("node '{}': {}", name, msg)),
        other => other,
    }
}

/// Reads a PV into the `result` output.
pub struct PvGetNode {
    name: String,
    ports: Ports,
    task: ReadTask,
    running: bool,
}

impl PvGetNode {
    pub fn new(name: impl Into<String>, ports: Ports, task: ReadTask) -> Self {
        Self {
            name: name.into(),
            ports,
            task,
            running: false,
        }
    }

    fn inputs(&self, bb: &Blackboard) -> Result<ReadInputs> {
        let use_cached = match self.ports.get_bool(bb, ports::USE_CACHED)? {
            Some(flag) => flag,
            None => self.ports.get_bool(bb, USE_MONITOR)?.unwrap_or(false),
        };
        Ok(ReadInputs {
            pv: self.ports.get_text(bb, ports::PV),
            timeout: self.ports.get_millis(bb, ports::TIMEOUT)?,
            use_cached,
        })
    }

    fn settle(&mut self, bb: &Blackboard, status: TaskStatus) -> Result<NodeStatus> {
        if status == TaskStatus::Running {
            return Ok(NodeStatus::Running);
        }
        self.running = false;
        if status == TaskStatus::Succeeded {
            if let Some(value) = self.task.value() {
                self.ports.set_output(bb, ports::RESULT, value.clone())?;
            }
            if let Some(sample) = self.task.sample() {
                self.write_metadata(bb, sample)?;
            }
        }
        Ok(node_status(status))
    }

    fn write_metadata(&self, bb: &Blackboard, sample: &PvSample) -> Result<()> {
        let stamp = sample
            .timestamp
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64());
        self.ports.set_output(bb, SEVERITY, as_i32(sample.severity))?;
        self.ports.set_output(bb, STATUS, as_i32(sample.status))?;
        self.ports.set_output(bb, TIMESTAMP, PvValue::Float64(stamp))?;
        self.ports.set_output(bb, COUNT, as_i32(sample.count))?;
        Ok(())
    }
}

impl TreeNode for PvGetNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, bb: &Blackboard) -> Result<NodeStatus> {
        let status = if self.running {
            self.task.poll()?
        } else {
            let inputs = self.inputs(bb)?;
            let status = self.task.start(inputs).map_err(|e| in_node(&self.name, e))?;
            self.running = true;
            status
        };
        self.settle(bb, status)
    }

    fn halt(&mut self) {
        if self.running {
            self.task.halt();
            self.running = false;
        }
    }
}

/// Writes the `value` input to a PV.
pub struct PvPutNode {
    name: String,
    ports: Ports,
    task: WriteTask,
    running: bool,
}

impl PvPutNode {
    pub fn new(name: impl Into<String>, ports: Ports, task: WriteTask) -> Self {
        Self {
            name: name.into(),
            ports,
            task,
            running: false,
        }
    }

    fn inputs(&self, bb: &Blackboard) -> Result<WriteInputs> {
        Ok(WriteInputs {
            pv: self.ports.get_text(bb, ports::PV),
            value: self.ports.get_value(bb, ports::VALUE, self.task.kind())?,
            timeout: self.ports.get_millis(bb, ports::TIMEOUT)?,
            force_write: self.ports.get_bool(bb, ports::FORCE_WRITE)?.unwrap_or(false),
        })
    }
}

impl TreeNode for PvPutNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, bb: &Blackboard) -> Result<NodeStatus> {
        let status = if self.running {
            self.task.poll()?
        } else {
            let inputs = self.inputs(bb)?;
            let status = self.task.start(inputs).map_err(|e| in_node(&self.name, e))?;
            self.running = true;
            status
        };
        if status != TaskStatus::Running {
            self.running = false;
        }
        Ok(node_status(status))
    }

    fn halt(&mut self) {
        if self.running {
            self.task.halt();
            self.running = false;
        }
    }
}
