// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Poll-driven PV tasks.
//!
//! A task turns one asynchronous, callback-completed PV operation into the
//! `start` / `poll` / `halt` cycle a tick executor expects:
//!
//! ```text
//!            start                      connected         result in cell
//! Idle ──────────────> AwaitingConnect ──────────> AwaitingResult ──────> Succeeded
//!                             │                          │
//!                             └──── deadline passed ─────┴──────────────> Failed
//!            halt (any non-idle state) ─────────────────────────────────> Cancelled
//! ```
//!
//! `start` and `poll` never block beyond short mutex sections. The client
//! callback writes into a per-cycle [`ResultCell`](cell::ResultCell); the
//! timeout path cancels that same cell, so a completion and a timeout race to
//! exactly one winner.
//!
//! Fatal errors (missing inputs, runtime/attach failures, API misuse) come
//! back as `Err`. Every other failure becomes [`TaskStatus::Failed`] and is
//! kept in `last_error()`.

pub(crate) mod cell;
mod read;
mod write;

pub use read::{ReadInputs, ReadTask};
pub use write::{WriteInputs, WriteTask};

use crate::config::{ports, DEFAULT_TIMEOUT};
use crate::context::ContextManager;
use crate::error::{Error, Result};
use crate::handle::{ListenerId, PvHandle};
use crate::registry::HandleRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Status reported to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Succeeded,
    Failed,
}

/// Internal lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    AwaitingConnect,
    AwaitingResult,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Whether a start cycle is in progress.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, TaskState::AwaitingConnect | TaskState::AwaitingResult)
    }
}

/// Handle binding, deadline and error bookkeeping shared by both tasks.
struct TaskCore {
    label: &'static str,
    context: Arc<ContextManager>,
    registry: Arc<HandleRegistry>,
    default_timeout: Duration,
    handle: Option<Arc<PvHandle>>,
    listener: Option<ListenerId>,
    connected: Arc<AtomicBool>,
    state: TaskState,
    timeout: Duration,
    deadline: Option<Instant>,
    last_error: Option<Error>,
}

impl TaskCore {
    fn new(
        label: &'static str,
        context: Arc<ContextManager>,
        registry: Arc<HandleRegistry>,
    ) -> Result<Self> {
        context.ensure_attached()?;
        Ok(Self {
            label,
            context,
            registry,
            default_timeout: DEFAULT_TIMEOUT,
            handle: None,
            listener: None,
            connected: Arc::new(AtomicBool::new(false)),
            state: TaskState::Idle,
            timeout: DEFAULT_TIMEOUT,
            deadline: None,
            last_error: None,
        })
    }

    /// Reset for a new start cycle and bind the handle for `pv`.
    fn begin(&mut self, pv: Option<&str>, timeout: Option<Duration>) -> Result<Arc<PvHandle>> {
        let pv = match pv.map(str::trim) {
            Some(pv) if !pv.is_empty() => pv,
            _ => {
                return Err(Error::Config(format!(
                    "{} task: missing required input '{}'",
                    self.label,
                    ports::PV
                )))
            }
        };
        self.context.ensure_attached()?;

        let handle = self.bind(pv);
        self.last_error = None;
        self.timeout = timeout.unwrap_or(self.default_timeout);
        self.deadline = Some(Instant::now() + self.timeout);
        self.state = TaskState::AwaitingConnect;
        Ok(handle)
    }

    /// Keep the current handle if it serves `pv`, otherwise swap it.
    fn bind(&mut self, pv: &str) -> Arc<PvHandle> {
        if let Some(handle) = &self.handle {
            if handle.name() == pv {
                return Arc::clone(handle);
            }
        }
        self.unbind();

        let handle = self.registry.acquire(pv);
        // Fresh flag per binding: a listener snapshot of the previous handle
        // may still run and must not reach this one.
        let flag = Arc::new(AtomicBool::new(false));
        let sink = Arc::clone(&flag);
        self.listener = Some(handle.add_connection_listener(move |connected| {
            sink.store(connected, Ordering::Release);
        }));
        // Seed without ever clearing a `true` the listener may have stored.
        flag.fetch_or(handle.is_connected(), Ordering::AcqRel);
        self.connected = flag;
        self.handle = Some(Arc::clone(&handle));
        handle
    }

    fn unbind(&mut self) {
        if let (Some(handle), Some(id)) = (self.handle.take(), self.listener.take()) {
            handle.remove_connection_listener(id);
        }
        self.connected = Arc::new(AtomicBool::new(false));
    }

    /// The listener flag skips the handle lock while the PV is down; the
    /// handle stays authoritative.
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
            && self.handle.as_ref().is_some_and(|h| h.is_connected())
    }

    fn pv(&self) -> &str {
        self.handle.as_ref().map_or("", |h| h.name())
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() > d)
    }

    fn timeout_error(&self) -> Error {
        Error::Timeout {
            pv: self.pv().to_string(),
            timeout: self.timeout,
        }
    }

    /// Ask the handle to connect. `Some(Failed)` if the client refused.
    fn connect(&mut self) -> Result<Option<TaskStatus>> {
        let Some(handle) = self.handle.clone() else {
            return Err(Error::InvalidState(format!("{} task has no handle", self.label)));
        };
        self.recover(handle.connect())
    }

    /// Split a result into fatal (`Err`) and recoverable (`Ok(Some(Failed))`).
    fn recover(&mut self, result: Result<()>) -> Result<Option<TaskStatus>> {
        match result {
            Ok(()) => Ok(None),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => Ok(Some(self.fail(e))),
        }
    }

    fn fail(&mut self, error: Error) -> TaskStatus {
        log::warn!("[task] {} '{}' failed: {}", self.label, self.pv(), error);
        self.last_error = Some(error);
        self.state = TaskState::Failed;
        TaskStatus::Failed
    }

    fn succeed(&mut self) -> TaskStatus {
        log::debug!("[task] {} '{}' succeeded", self.label, self.pv());
        self.state = TaskState::Succeeded;
        TaskStatus::Succeeded
    }

    /// Status for a poll outside an active cycle.
    fn settled(&self) -> Result<TaskStatus> {
        match self.state {
            TaskState::Succeeded => Ok(TaskStatus::Succeeded),
            TaskState::Failed => Ok(TaskStatus::Failed),
            TaskState::Idle => Err(Error::InvalidState(format!(
                "{} task polled before start",
                self.label
            ))),
            TaskState::Cancelled => Err(Error::InvalidState(format!(
                "{} task polled after halt",
                self.label
            ))),
            TaskState::AwaitingConnect | TaskState::AwaitingResult => Ok(TaskStatus::Running),
        }
    }

    fn halt(&mut self) {
        if self.state != TaskState::Idle {
            log::debug!("[task] {} '{}' halted", self.label, self.pv());
            self.state = TaskState::Cancelled;
        }
    }
}

impl Drop for TaskCore {
    fn drop(&mut self) {
        self.unbind();
    }
}
