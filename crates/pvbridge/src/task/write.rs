// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Write task: put one value to a PV and wait for the confirmation.
//!
//! Unless `force_write` is set, a put whose value already matches the
//! handle's monitored sample is skipped and the cycle succeeds immediately.

use super::cell::ResultCell;
use super::{TaskCore, TaskState, TaskStatus};
use crate::config::ports;
use crate::context::ContextManager;
use crate::error::{Error, Result};
use crate::registry::HandleRegistry;
use crate::value::{convert, PvValue, ValueKind};
use std::sync::Arc;
use std::time::Duration;

/// Inputs for one write cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteInputs {
    /// PV name (required).
    pub pv: Option<String>,
    /// Value to write (required). Converted to the task's kind.
    pub value: Option<PvValue>,
    pub timeout: Option<Duration>,
    /// Put even when the monitored value already matches.
    pub force_write: bool,
}

impl WriteInputs {
    pub fn new(pv: impl Into<String>, value: impl Into<PvValue>) -> Self {
        Self {
            pv: Some(pv.into()),
            value: Some(value.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn force_write(mut self, force_write: bool) -> Self {
        self.force_write = force_write;
        self
    }
}

type Outcome = Result<()>;

/// Writes a value of `kind` to a PV.
pub struct WriteTask {
    core: TaskCore,
    kind: ValueKind,
    force_write: bool,
    pending: Option<PvValue>,
    cell: Option<Arc<ResultCell<Outcome>>>,
    skipped: bool,
}

impl WriteTask {
    /// # Errors
    ///
    /// `RuntimeInit`/`Attach` if the calling thread cannot be attached.
    pub fn new(
        context: Arc<ContextManager>,
        registry: Arc<HandleRegistry>,
        kind: ValueKind,
    ) -> Result<Self> {
        Ok(Self {
            core: TaskCore::new("write", context, registry)?,
            kind,
            force_write: false,
            pending: None,
            cell: None,
            skipped: false,
        })
    }

    /// Timeout used when a cycle's inputs leave it unset.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.core.default_timeout = timeout;
        self
    }

    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.core.state
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&Error> {
        self.core.last_error.as_ref()
    }

    /// Whether the latest success skipped the put because the value already
    /// matched.
    #[must_use]
    pub fn skipped(&self) -> bool {
        self.skipped
    }

    /// Begin a new write cycle.
    ///
    /// # Errors
    ///
    /// `Config` when `pv` or `value` is missing, `RuntimeInit`/`Attach` when
    /// the thread cannot be attached. A value not representable as the
    /// task's kind is reported as `Failed`.
    pub fn start(&mut self, inputs: WriteInputs) -> Result<TaskStatus> {
        if let Some(old) = self.cell.take() {
            old.cancel();
        }
        self.pending = None;
        self.skipped = false;

        let Some(value) = inputs.value else {
            return Err(Error::Config(format!(
                "write task: missing required input '{}'",
                ports::VALUE
            )));
        };
        self.core.begin(inputs.pv.as_deref(), inputs.timeout)?;
        self.force_write = inputs.force_write;
        self.cell = Some(ResultCell::new());

        match convert(&value, self.kind) {
            Ok(value) => self.pending = Some(value),
            Err(e) => return Ok(self.core.fail(e.into())),
        }

        if !self.core.is_connected() {
            if let Some(status) = self.core.connect()? {
                return Ok(status);
            }
        }
        self.advance()
    }

    /// Report progress of the current cycle.
    ///
    /// # Errors
    ///
    /// `InvalidState` when polled before `start` or after `halt`.
    pub fn poll(&mut self) -> Result<TaskStatus> {
        if !self.core.state.is_active() {
            return self.core.settled();
        }
        self.advance()
    }

    /// Abandon the current cycle. An issued put is not retracted.
    pub fn halt(&mut self) {
        if let Some(cell) = &self.cell {
            cell.cancel();
        }
        self.core.halt();
    }

    fn advance(&mut self) -> Result<TaskStatus> {
        let Some(cell) = self.cell.clone() else {
            return Err(Error::InvalidState("write task has no active cycle".into()));
        };

        if self.core.state == TaskState::AwaitingConnect && self.core.is_connected() {
            if let Some(status) = self.issue(&cell)? {
                return Ok(status);
            }
        }

        if let Some(outcome) = cell.take() {
            return Ok(self.finish(outcome));
        }

        if self.core.expired() {
            if cell.cancel() {
                let error = self.core.timeout_error();
                return Ok(self.core.fail(error));
            }
            if let Some(outcome) = cell.take() {
                return Ok(self.finish(outcome));
            }
        }
        Ok(TaskStatus::Running)
    }

    /// Skip or issue the put. `Some` when the cycle already settled.
    fn issue(&mut self, cell: &Arc<ResultCell<Outcome>>) -> Result<Option<TaskStatus>> {
        self.core.state = TaskState::AwaitingResult;
        let (Some(handle), Some(value)) = (self.core.handle.clone(), self.pending.clone()) else {
            return Err(Error::InvalidState("write task has nothing to write".into()));
        };

        if !self.force_write {
            if let Some(cached) = handle.cached_value() {
                let same = convert(&value, cached.value.kind()).is_ok_and(|v| v == cached.value);
                if same {
                    log::debug!(
                        "[task] write '{}' skipped, value already {}",
                        handle.name(),
                        cached.value
                    );
                    cell.cancel();
                    self.skipped = true;
                    return Ok(Some(self.core.succeed()));
                }
            }
        }

        let sink = Arc::clone(cell);
        let issued = handle.request_put(value, move |outcome| {
            sink.try_complete(outcome);
        });
        self.core.recover(issued)
    }

    fn finish(&mut self, outcome: Outcome) -> TaskStatus {
        match outcome {
            Ok(()) => self.core.succeed(),
            Err(e) => self.core.fail(e),
        }
    }
}

impl std::fmt::Debug for WriteTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTask")
            .field("pv", &self.core.pv())
            .field("kind", &self.kind)
            .field("state", &self.core.state)
            .field("pending", &self.pending)
            .finish()
    }
}
