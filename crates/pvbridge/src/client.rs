// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Abstract PV protocol client.
//!
//! The bridge never talks to the wire directly. It drives an implementation
//! of [`PvClient`], whose operations complete through callbacks delivered on
//! the client's own threads. The runtime behind the client is thread-affine:
//! every thread must be attached to the runtime context before it issues a
//! call (see [`crate::context::ContextManager::ensure_attached`]).
//!
//! Requests may be buffered by the client until [`PvClient::flush_pending`]
//! is called; callers flush after every issue.

use crate::value::{PvSample, PvValue, ValueKind};
use std::fmt;
use std::sync::Arc;

/// Status code reported by the client for a rejected or failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    /// Client-specific numeric code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
}

impl ClientStatus {
    /// Code used for conditions detected by the bridge itself rather than
    /// reported by the client.
    pub const LOCAL: i32 = -1;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Status raised by the bridge before reaching the client.
    pub fn local(message: impl Into<String>) -> Self {
        Self::new(Self::LOCAL, message)
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status={} : {}", self.code, self.message)
    }
}

/// Opaque runtime context identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

/// Opaque channel reference returned by [`PvClient::create_channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

/// Opaque subscription reference returned by [`PvClient::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Remote type information captured when a channel connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeInfo {
    /// Native field kind of the remote variable.
    pub kind: ValueKind,
    /// Native element count (> 1 for arrays).
    pub count: usize,
}

/// Connection state transition delivered by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub connected: bool,
    /// Present on connect.
    pub native: Option<NativeInfo>,
}

impl ConnectionEvent {
    pub fn up(native: NativeInfo) -> Self {
        Self {
            connected: true,
            native: Some(native),
        }
    }

    pub fn down() -> Self {
        Self {
            connected: false,
            native: None,
        }
    }
}

/// Connection event handler. Called for every transition, from a client thread.
pub type ConnectionHandler = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;
/// One-shot read completion.
pub type GetHandler = Box<dyn FnOnce(Result<PvSample, ClientStatus>) + Send>;
/// One-shot write completion.
pub type PutHandler = Box<dyn FnOnce(Result<(), ClientStatus>) + Send>;
/// Monitor update handler. Called for every pushed sample.
pub type MonitorHandler = Arc<dyn Fn(PvSample) + Send + Sync>;

/// Minimum client surface consumed by the bridge.
///
/// Every method except the context calls requires the calling thread to be
/// attached to the live context. An `Err` from an issue call means the
/// corresponding handler will never run.
pub trait PvClient: Send + Sync {
    /// Create the runtime context and attach the calling thread to it.
    fn create_context(&self) -> Result<ContextId, ClientStatus>;

    /// Context the calling thread is attached to, if any.
    fn current_context(&self) -> Option<ContextId>;

    /// Attach the calling thread to `ctx`.
    fn attach_context(&self, ctx: ContextId) -> Result<(), ClientStatus>;

    /// Destroy the runtime context. Outstanding channels become invalid.
    fn destroy_context(&self, ctx: ContextId);

    /// Start connecting to `name`. `on_event` runs on every transition.
    fn create_channel(
        &self,
        name: &str,
        on_event: ConnectionHandler,
    ) -> Result<ChannelId, ClientStatus>;

    /// Release a channel; pending completions for it may be dropped.
    fn clear_channel(&self, channel: ChannelId);

    /// Read one element as `kind`.
    fn issue_get(
        &self,
        channel: ChannelId,
        kind: ValueKind,
        on_result: GetHandler,
    ) -> Result<(), ClientStatus>;

    /// Write `value`, with completion callback.
    fn issue_put(
        &self,
        channel: ChannelId,
        value: PvValue,
        on_result: PutHandler,
    ) -> Result<(), ClientStatus>;

    /// Subscribe to value changes as `kind`.
    fn subscribe(
        &self,
        channel: ChannelId,
        kind: ValueKind,
        on_push: MonitorHandler,
    ) -> Result<SubscriptionId, ClientStatus>;

    /// Cancel a subscription.
    fn clear_subscription(&self, subscription: SubscriptionId);

    /// Send every buffered request.
    fn flush_pending(&self);
}
