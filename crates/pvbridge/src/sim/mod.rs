// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process simulated PV client.
//!
//! [`SimClient`] implements [`PvClient`] against an in-memory set of PVs and
//! delivers every completion from a dedicated callback thread, the same way a
//! real protocol client does. It is used by the test suites and by the runner
//! when no network client is available.
//!
//! Behaviour per PV is configured with [`SimPv`]:
//!
//! ```text
//! SimPv::new(42)                          connects and replies immediately
//!     .connect_after(Duration::from_millis(50))
//!     .reply_after(Duration::from_millis(20))
//! SimPv::new(0).never_connect()           name never resolves
//! SimPv::new(0).never_reply()             connects, requests never complete
//! SimPv::new(0).reject_puts()             put completions report failure
//! ```
//!
//! Issued requests, channel searches and subscriptions stay buffered until
//! [`PvClient::flush_pending`] is called. Server-side events
//! ([`SimClient::set_value`], [`SimClient::disconnect`],
//! [`SimClient::reconnect`]) are delivered without a flush.
//!
//! The runtime context is thread-affine: every call other than context
//! management fails with [`codes::NOT_ATTACHED`] unless the calling thread
//! has created or attached to the live context.

mod dispatcher;

use crate::client::{
    ChannelId, ClientStatus, ConnectionEvent, ConnectionHandler, ContextId, GetHandler,
    MonitorHandler, NativeInfo, PutHandler, PvClient, SubscriptionId,
};
use crate::value::{convert, PvSample, PvValue, ValueKind};
use dispatcher::Dispatcher;
use parking_lot::Mutex;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

/// Status codes reported by the simulated client.
pub mod codes {
    /// Calling thread is not attached to the live context.
    pub const NOT_ATTACHED: i32 = 400;
    /// Unknown or cleared channel.
    pub const BAD_CHANNEL: i32 = 401;
    /// Channel is not connected.
    pub const DISCONNECTED: i32 = 402;
    /// Value cannot be represented in the requested or native kind.
    pub const BAD_TYPE: i32 = 403;
    /// Server rejected the write.
    pub const PUT_REJECTED: i32 = 404;
    /// Failure injected through [`super::SimFaults`].
    pub const INJECTED: i32 = 499;
}

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static ATTACHED: Cell<Option<ContextId>> = const { Cell::new(None) };
}

/// Behaviour of one simulated PV.
#[derive(Debug, Clone, PartialEq)]
pub struct SimPv {
    /// Current value; its kind is the PV's native kind.
    pub value: PvValue,
    /// Native element count.
    pub count: usize,
    /// Delay before a channel search resolves, `None` = never.
    pub connect_after: Option<Duration>,
    /// Delay before a get/put completes, `None` = never.
    pub reply_after: Option<Duration>,
    /// Report put completions as failed.
    pub reject_puts: bool,
    /// Alarm severity reported with every sample.
    pub severity: u32,
    /// Alarm status reported with every sample.
    pub status: u32,
}

impl SimPv {
    /// PV that connects and replies immediately.
    pub fn new(value: impl Into<PvValue>) -> Self {
        Self {
            value: value.into(),
            count: 1,
            connect_after: Some(Duration::ZERO),
            reply_after: Some(Duration::ZERO),
            reject_puts: false,
            severity: 0,
            status: 0,
        }
    }

    #[must_use]
    pub fn connect_after(mut self, delay: Duration) -> Self {
        self.connect_after = Some(delay);
        self
    }

    #[must_use]
    pub fn never_connect(mut self) -> Self {
        self.connect_after = None;
        self
    }

    #[must_use]
    pub fn reply_after(mut self, delay: Duration) -> Self {
        self.reply_after = Some(delay);
        self
    }

    #[must_use]
    pub fn never_reply(mut self) -> Self {
        self.reply_after = None;
        self
    }

    #[must_use]
    pub fn reject_puts(mut self) -> Self {
        self.reject_puts = true;
        self
    }

    #[must_use]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    fn native(&self) -> NativeInfo {
        NativeInfo {
            kind: self.value.kind(),
            count: self.count,
        }
    }

    fn sample_as(&self, kind: ValueKind) -> Result<PvSample, ClientStatus> {
        let value = convert(&self.value, kind)
            .map_err(|e| ClientStatus::new(codes::BAD_TYPE, e.to_string()))?;
        Ok(PvSample {
            value,
            severity: self.severity,
            status: self.status,
            timestamp: SystemTime::now(),
            count: self.count,
        })
    }
}

/// Failure injection switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimFaults {
    pub fail_create_context: bool,
    pub fail_attach: bool,
    pub fail_create_channel: bool,
    pub fail_issue_get: bool,
    pub fail_issue_put: bool,
}

struct PvEntry {
    config: SimPv,
    online: bool,
    gets: u64,
    puts: u64,
}

struct Channel {
    pv: String,
    on_event: ConnectionHandler,
    connected: bool,
}

struct Subscription {
    channel: ChannelId,
    kind: ValueKind,
    on_push: MonitorHandler,
}

struct Pending {
    delay: Duration,
    job: Box<dyn FnOnce() + Send>,
}

#[derive(Default)]
struct State {
    context: Option<ContextId>,
    pvs: HashMap<String, PvEntry>,
    channels: HashMap<ChannelId, Channel>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    pending: Vec<Pending>,
    channels_created: u64,
    flushes: u64,
}

struct Inner {
    state: Mutex<State>,
    faults: Mutex<SimFaults>,
    next_id: AtomicU64,
    dispatcher: Dispatcher,
}

/// Simulated PV client. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SimClient {
    inner: Arc<Inner>,
}

impl Default for SimClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClient {
    /// Client with no PVs.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                faults: Mutex::new(SimFaults::default()),
                next_id: AtomicU64::new(1),
                dispatcher: Dispatcher::spawn("pv-sim-callback"),
            }),
        }
    }

    /// Shared handle suitable for [`crate::ContextManager::new`].
    #[must_use]
    pub fn shared(&self) -> Arc<dyn PvClient> {
        Arc::new(self.clone())
    }

    /// Add or replace a PV. Existing channels are not affected until their
    /// next connect.
    pub fn add_pv(&self, name: &str, pv: SimPv) {
        let mut state = self.inner.state.lock();
        state.pvs.insert(
            name.to_string(),
            PvEntry {
                config: pv,
                online: true,
                gets: 0,
                puts: 0,
            },
        );
    }

    /// Replace the failure injection switches.
    pub fn set_faults(&self, faults: SimFaults) {
        *self.inner.faults.lock() = faults;
    }

    /// Current value of a PV.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<PvValue> {
        let state = self.inner.state.lock();
        state.pvs.get(name).map(|e| e.config.value.clone())
    }

    /// Change a PV's value on the server side and push it to monitors.
    pub fn set_value(&self, name: &str, value: impl Into<PvValue>) {
        let value = value.into();
        let mut state = self.inner.state.lock();
        let Some(entry) = state.pvs.get_mut(name) else {
            log::warn!("[sim] set_value on unknown pv '{}'", name);
            return;
        };
        entry.config.value = value;
        let pushes = collect_pushes(&state, name);
        drop(state);
        for push in pushes {
            self.inner.dispatcher.schedule(Duration::ZERO, push);
        }
    }

    /// Take a PV offline; connected channels receive a disconnect event.
    pub fn disconnect(&self, name: &str) {
        let mut state = self.inner.state.lock();
        let Some(entry) = state.pvs.get_mut(name) else {
            return;
        };
        entry.online = false;

        let mut events = Vec::new();
        for channel in state.channels.values_mut() {
            if channel.pv == name && channel.connected {
                channel.connected = false;
                events.push(Arc::clone(&channel.on_event));
            }
        }
        drop(state);

        for on_event in events {
            self.inner
                .dispatcher
                .schedule(Duration::ZERO, move || on_event(ConnectionEvent::down()));
        }
    }

    /// Bring a PV back online; its channels reconnect after the PV's
    /// connect delay.
    pub fn reconnect(&self, name: &str) {
        let mut state = self.inner.state.lock();
        let Some(entry) = state.pvs.get_mut(name) else {
            return;
        };
        entry.online = true;
        let Some(delay) = entry.config.connect_after else {
            return;
        };
        let channels: Vec<ChannelId> = state
            .channels
            .iter()
            .filter(|(_, c)| c.pv == name && !c.connected)
            .map(|(id, _)| *id)
            .collect();
        drop(state);

        for id in channels {
            let weak = Arc::downgrade(&self.inner);
            self.inner
                .dispatcher
                .schedule(delay, move || complete_connect(&weak, id));
        }
    }

    /// Number of get requests issued against a PV.
    #[must_use]
    pub fn get_count(&self, name: &str) -> u64 {
        let state = self.inner.state.lock();
        state.pvs.get(name).map_or(0, |e| e.gets)
    }

    /// Number of put requests issued against a PV.
    #[must_use]
    pub fn put_count(&self, name: &str) -> u64 {
        let state = self.inner.state.lock();
        state.pvs.get(name).map_or(0, |e| e.puts)
    }

    /// Total channels ever created.
    #[must_use]
    pub fn channels_created(&self) -> u64 {
        self.inner.state.lock().channels_created
    }

    /// Channels currently open.
    #[must_use]
    pub fn open_channels(&self) -> usize {
        self.inner.state.lock().channels.len()
    }

    /// Subscriptions currently open.
    #[must_use]
    pub fn open_subscriptions(&self) -> usize {
        self.inner.state.lock().subscriptions.len()
    }

    /// Number of `flush_pending` calls.
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.inner.state.lock().flushes
    }

    /// Requests buffered and waiting for a flush.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    fn faults(&self) -> SimFaults {
        *self.inner.faults.lock()
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn require_attached(state: &State) -> Result<(), ClientStatus> {
        let attached = ATTACHED.with(Cell::get);
        match state.context {
            Some(ctx) if attached == Some(ctx) => Ok(()),
            _ => Err(ClientStatus::new(
                codes::NOT_ATTACHED,
                "thread not attached to client context",
            )),
        }
    }

    fn connected_channel<'a>(
        state: &'a State,
        channel: ChannelId,
    ) -> Result<&'a Channel, ClientStatus> {
        let chan = state
            .channels
            .get(&channel)
            .ok_or_else(|| ClientStatus::new(codes::BAD_CHANNEL, "unknown channel"))?;
        if !chan.connected {
            return Err(ClientStatus::new(
                codes::DISCONNECTED,
                "channel not connected",
            ));
        }
        Ok(chan)
    }
}

/// Monitor deliveries for every connected subscription on `pv`.
fn collect_pushes(state: &State, pv: &str) -> Vec<Box<dyn FnOnce() + Send>> {
    let Some(entry) = state.pvs.get(pv) else {
        return Vec::new();
    };
    state
        .subscriptions
        .values()
        .filter(|sub| {
            state
                .channels
                .get(&sub.channel)
                .is_some_and(|c| c.pv == pv && c.connected)
        })
        .filter_map(|sub| {
            let sample = entry.config.sample_as(sub.kind).ok()?;
            let on_push = Arc::clone(&sub.on_push);
            Some(Box::new(move || on_push(sample)) as Box<dyn FnOnce() + Send>)
        })
        .collect()
}

fn complete_connect(weak: &Weak<Inner>, id: ChannelId) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let mut state = inner.state.lock();
    let native = {
        let Some(pv_name) = state.channels.get(&id).map(|c| c.pv.clone()) else {
            return;
        };
        match state.pvs.get(&pv_name) {
            Some(entry) if entry.online => entry.config.native(),
            _ => return,
        }
    };
    let Some(channel) = state.channels.get_mut(&id) else {
        return;
    };
    if channel.connected {
        return;
    }
    channel.connected = true;
    let on_event = Arc::clone(&channel.on_event);
    let pv_name = channel.pv.clone();

    // Subscriptions that outlived a disconnect get the current value again.
    let existing: Vec<(ValueKind, MonitorHandler)> = state
        .subscriptions
        .values()
        .filter(|s| s.channel == id)
        .map(|s| (s.kind, Arc::clone(&s.on_push)))
        .collect();
    let config = state.pvs.get(&pv_name).map(|e| e.config.clone());
    drop(state);

    on_event(ConnectionEvent::up(native));

    if let Some(config) = config {
        for (kind, on_push) in existing {
            if let Ok(sample) = config.sample_as(kind) {
                on_push(sample);
            }
        }
    }
}

impl PvClient for SimClient {
    fn create_context(&self) -> Result<ContextId, ClientStatus> {
        if self.faults().fail_create_context {
            return Err(ClientStatus::new(codes::INJECTED, "context create refused"));
        }
        let ctx = ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed));
        self.inner.state.lock().context = Some(ctx);
        ATTACHED.with(|a| a.set(Some(ctx)));
        Ok(ctx)
    }

    fn current_context(&self) -> Option<ContextId> {
        let attached = ATTACHED.with(Cell::get)?;
        let state = self.inner.state.lock();
        (state.context == Some(attached)).then_some(attached)
    }

    fn attach_context(&self, ctx: ContextId) -> Result<(), ClientStatus> {
        if self.faults().fail_attach {
            return Err(ClientStatus::new(codes::INJECTED, "attach refused"));
        }
        if self.inner.state.lock().context != Some(ctx) {
            return Err(ClientStatus::new(codes::NOT_ATTACHED, "no such context"));
        }
        ATTACHED.with(|a| a.set(Some(ctx)));
        Ok(())
    }

    fn destroy_context(&self, ctx: ContextId) {
        let mut state = self.inner.state.lock();
        if state.context != Some(ctx) {
            return;
        }
        state.context = None;
        state.channels.clear();
        state.subscriptions.clear();
        state.pending.clear();
        drop(state);
        ATTACHED.with(|a| {
            if a.get() == Some(ctx) {
                a.set(None);
            }
        });
    }

    fn create_channel(
        &self,
        name: &str,
        on_event: ConnectionHandler,
    ) -> Result<ChannelId, ClientStatus> {
        let mut state = self.inner.state.lock();
        Self::require_attached(&state)?;
        if self.faults().fail_create_channel {
            return Err(ClientStatus::new(codes::INJECTED, "channel create refused"));
        }

        let id = ChannelId(self.next_id());
        state.channels.insert(
            id,
            Channel {
                pv: name.to_string(),
                on_event,
                connected: false,
            },
        );
        state.channels_created += 1;

        // Unknown names and offline PVs never resolve.
        let delay = state
            .pvs
            .get(name)
            .filter(|e| e.online)
            .and_then(|e| e.config.connect_after);
        if let Some(delay) = delay {
            let weak = Arc::downgrade(&self.inner);
            state.pending.push(Pending {
                delay,
                job: Box::new(move || complete_connect(&weak, id)),
            });
        }
        Ok(id)
    }

    fn clear_channel(&self, channel: ChannelId) {
        let mut state = self.inner.state.lock();
        state.channels.remove(&channel);
        state.subscriptions.retain(|_, s| s.channel != channel);
    }

    fn issue_get(
        &self,
        channel: ChannelId,
        kind: ValueKind,
        on_result: GetHandler,
    ) -> Result<(), ClientStatus> {
        let mut state = self.inner.state.lock();
        Self::require_attached(&state)?;
        if self.faults().fail_issue_get {
            return Err(ClientStatus::new(codes::INJECTED, "get refused"));
        }
        let pv = Self::connected_channel(&state, channel)?.pv.clone();
        let Some(entry) = state.pvs.get_mut(&pv) else {
            return Err(ClientStatus::new(codes::BAD_CHANNEL, "unknown pv"));
        };
        entry.gets += 1;

        let Some(delay) = entry.config.reply_after else {
            // Accepted, never answered.
            return Ok(());
        };
        let weak = Arc::downgrade(&self.inner);
        state.pending.push(Pending {
            delay,
            job: Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let state = inner.state.lock();
                let Some(chan) = state.channels.get(&channel) else {
                    // Cleared channel: completion is dropped.
                    return;
                };
                let result = if !chan.connected {
                    Err(ClientStatus::new(codes::DISCONNECTED, "channel disconnected"))
                } else {
                    match state.pvs.get(&chan.pv) {
                        Some(entry) => entry.config.sample_as(kind),
                        None => Err(ClientStatus::new(codes::BAD_CHANNEL, "unknown pv")),
                    }
                };
                drop(state);
                on_result(result);
            }),
        });
        Ok(())
    }

    fn issue_put(
        &self,
        channel: ChannelId,
        value: PvValue,
        on_result: PutHandler,
    ) -> Result<(), ClientStatus> {
        let mut state = self.inner.state.lock();
        Self::require_attached(&state)?;
        if self.faults().fail_issue_put {
            return Err(ClientStatus::new(codes::INJECTED, "put refused"));
        }
        let pv = Self::connected_channel(&state, channel)?.pv.clone();
        let Some(entry) = state.pvs.get_mut(&pv) else {
            return Err(ClientStatus::new(codes::BAD_CHANNEL, "unknown pv"));
        };
        entry.puts += 1;

        let Some(delay) = entry.config.reply_after else {
            return Ok(());
        };
        let weak = Arc::downgrade(&self.inner);
        state.pending.push(Pending {
            delay,
            job: Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let mut state = inner.state.lock();
                let Some(chan) = state.channels.get(&channel) else {
                    return;
                };
                if !chan.connected {
                    drop(state);
                    on_result(Err(ClientStatus::new(
                        codes::DISCONNECTED,
                        "channel disconnected",
                    )));
                    return;
                }
                let pv = chan.pv.clone();
                let Some(entry) = state.pvs.get_mut(&pv) else {
                    drop(state);
                    on_result(Err(ClientStatus::new(codes::BAD_CHANNEL, "unknown pv")));
                    return;
                };
                if entry.config.reject_puts {
                    drop(state);
                    on_result(Err(ClientStatus::new(
                        codes::PUT_REJECTED,
                        "write rejected",
                    )));
                    return;
                }
                match convert(&value, entry.config.value.kind()) {
                    Ok(native) => {
                        entry.config.value = native;
                        let pushes = collect_pushes(&state, &pv);
                        drop(state);
                        for push in pushes {
                            push();
                        }
                        on_result(Ok(()));
                    }
                    Err(e) => {
                        drop(state);
                        on_result(Err(ClientStatus::new(codes::BAD_TYPE, e.to_string())));
                    }
                }
            }),
        });
        Ok(())
    }

    fn subscribe(
        &self,
        channel: ChannelId,
        kind: ValueKind,
        on_push: MonitorHandler,
    ) -> Result<SubscriptionId, ClientStatus> {
        let mut state = self.inner.state.lock();
        Self::require_attached(&state)?;
        if !state.channels.contains_key(&channel) {
            return Err(ClientStatus::new(codes::BAD_CHANNEL, "unknown channel"));
        }
        let id = SubscriptionId(self.next_id());
        state.subscriptions.insert(
            id,
            Subscription {
                channel,
                kind,
                on_push,
            },
        );

        // Initial value, once the subscription request is flushed.
        let weak = Arc::downgrade(&self.inner);
        state.pending.push(Pending {
            delay: Duration::ZERO,
            job: Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let state = inner.state.lock();
                let Some(sub) = state.subscriptions.get(&id) else {
                    return;
                };
                let Some(chan) = state.channels.get(&sub.channel) else {
                    return;
                };
                if !chan.connected {
                    return;
                }
                let sample = state
                    .pvs
                    .get(&chan.pv)
                    .and_then(|e| e.config.sample_as(sub.kind).ok());
                let on_push = Arc::clone(&sub.on_push);
                drop(state);
                if let Some(sample) = sample {
                    on_push(sample);
                }
            }),
        });
        Ok(id)
    }

    fn clear_subscription(&self, subscription: SubscriptionId) {
        self.inner.state.lock().subscriptions.remove(&subscription);
    }

    fn flush_pending(&self) {
        let pending = {
            let mut state = self.inner.state.lock();
            state.flushes += 1;
            std::mem::take(&mut state.pending)
        };
        for Pending { delay, job } in pending {
            self.inner.dispatcher.schedule(delay, job);
        }
    }
}
