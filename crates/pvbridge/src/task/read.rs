// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read task: fetch one PV value, as a fixed kind or as served.

use super::cell::ResultCell;
use super::{TaskCore, TaskState, TaskStatus};
use crate::context::ContextManager;
use crate::error::{Error, Result};
use crate::registry::HandleRegistry;
use crate::value::{convert, PvSample, PvValue, ValueKind};
use std::sync::Arc;
use std::time::Duration;

/// Inputs for one read cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadInputs {
    /// PV name (required).
    pub pv: Option<String>,
    /// Deadline for the whole cycle; the task default when `None`.
    pub timeout: Option<Duration>,
    /// Answer from the handle's monitored value instead of a round trip.
    pub use_cached: bool,
}

impl ReadInputs {
    pub fn new(pv: impl Into<String>) -> Self {
        Self {
            pv: Some(pv.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn use_cached(mut self, use_cached: bool) -> Self {
        self.use_cached = use_cached;
        self
    }
}

type Outcome = Result<PvSample>;

/// Reads a PV and delivers its value converted to `kind`, or unchanged
/// when the task has no target kind.
pub struct ReadTask {
    core: TaskCore,
    kind: Option<ValueKind>,
    use_cached: bool,
    cell: Option<Arc<ResultCell<Outcome>>>,
    value: Option<PvValue>,
    sample: Option<PvSample>,
}

impl ReadTask {
    /// # Errors
    ///
    /// `RuntimeInit`/`Attach` if the calling thread cannot be attached.
    pub fn new(
        context: Arc<ContextManager>,
        registry: Arc<HandleRegistry>,
        kind: ValueKind,
    ) -> Result<Self> {
        Self::with_kind(context, registry, Some(kind))
    }

    /// Task delivering the channel's native value without conversion.
    ///
    /// # Errors
    ///
    /// `RuntimeInit`/`Attach` if the calling thread cannot be attached.
    pub fn native(context: Arc<ContextManager>, registry: Arc<HandleRegistry>) -> Result<Self> {
        Self::with_kind(context, registry, None)
    }

    fn with_kind(
        context: Arc<ContextManager>,
        registry: Arc<HandleRegistry>,
        kind: Option<ValueKind>,
    ) -> Result<Self> {
        Ok(Self {
            core: TaskCore::new("read", context, registry)?,
            kind,
            use_cached: false,
            cell: None,
            value: None,
            sample: None,
        })
    }

    /// Timeout used when a cycle's inputs leave it unset.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.core.default_timeout = timeout;
        self
    }

    /// Target kind; `None` for a native read.
    #[must_use]
    pub fn kind(&self) -> Option<ValueKind> {
        self.kind
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.core.state
    }

    /// Value delivered by the latest successful cycle.
    #[must_use]
    pub fn value(&self) -> Option<&PvValue> {
        self.value.as_ref()
    }

    /// Sample behind the latest successful cycle, with its alarm metadata
    /// and the value as the client served it.
    #[must_use]
    pub fn sample(&self) -> Option<&PvSample> {
        self.sample.as_ref()
    }

    /// Error behind the latest `Failed` status.
    #[must_use]
    pub fn last_error(&self) -> Option<&Error> {
        self.core.last_error.as_ref()
    }

    /// Begin a new read cycle.
    ///
    /// # Errors
    ///
    /// `Config` when `pv` is missing, `RuntimeInit`/`Attach` when the thread
    /// cannot be attached. Client refusals are reported as `Failed`.
    pub fn start(&mut self, inputs: ReadInputs) -> Result<TaskStatus> {
        if let Some(old) = self.cell.take() {
            old.cancel();
        }
        self.value = None;
        self.sample = None;
        self.core.begin(inputs.pv.as_deref(), inputs.timeout)?;
        self.use_cached = inputs.use_cached;
        self.cell = Some(ResultCell::new());

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

    /// Abandon the current cycle. A late completion is ignored.
    pub fn halt(&mut self) {
        if let Some(cell) = &self.cell {
            cell.cancel();
        }
        self.core.halt();
    }

    fn advance(&mut self) -> Result<TaskStatus> {
        let Some(cell) = self.cell.clone() else {
            return Err(Error::InvalidState("read task has no active cycle".into()));
        };

        if self.core.state == TaskState::AwaitingConnect && self.core.is_connected() {
            if let Some(status) = self.issue(&cell)? {
                return Ok(status);
            }
        }

        if self.use_cached && self.core.state == TaskState::AwaitingResult {
            if let Some(sample) = self.cached() {
                cell.try_complete(Ok(sample));
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
            // The completion landed between take() and cancel().
            if let Some(outcome) = cell.take() {
                return Ok(self.finish(outcome));
            }
        }
        Ok(TaskStatus::Running)
    }

    /// Issue the get (or switch to watching the cache). `Some` on failure.
    fn issue(&mut self, cell: &Arc<ResultCell<Outcome>>) -> Result<Option<TaskStatus>> {
        self.core.state = TaskState::AwaitingResult;
        if self.use_cached {
            return Ok(None);
        }
        let Some(handle) = self.core.handle.clone() else {
            return Err(Error::InvalidState("read task has no handle".into()));
        };

        let sink = Arc::clone(cell);
        let issued = handle.request_get(None, move |outcome| {
            sink.try_complete(outcome);
        });
        self.core.recover(issued)
    }

    fn cached(&self) -> Option<PvSample> {
        self.core.handle.as_ref().and_then(|h| h.cached_value())
    }

    fn finish(&mut self, outcome: Outcome) -> TaskStatus {
        let kind = self.kind;
        let converted = outcome.and_then(|sample| {
            let value = match kind {
                Some(kind) => convert(&sample.value, kind)?,
                None => sample.value.clone(),
            };
            Ok((value, sample))
        });
        match converted {
            Ok((value, sample)) => {
                self.value = Some(value);
                self.sample = Some(sample);
                self.core.succeed()
            }
            Err(e) => self.core.fail(e),
        }
    }
}

impl std::fmt::Debug for ReadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadTask")
            .field("pv", &self.core.pv())
            .field("kind", &self.kind)
            .field("state", &self.core.state)
            .finish()
    }
}
