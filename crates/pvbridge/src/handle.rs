// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection handle for one named process variable.
//!
//! A [`PvHandle`] owns the client channel for a PV and mediates the
//! asynchronous get/put requests issued against it. Handles are shared
//! (`Arc`) by every task that uses the PV; the [`crate::HandleRegistry`] only
//! keeps a `Weak` so the channel is released when the last task lets go.
//!
//! # Threading
//!
//! Connection events and monitor updates arrive on the client's callback
//! thread. Every handler mutates the handle's fields inside one short
//! critical section, then releases the lock before running user listeners.
//! Listeners run over a snapshot of the list, in registration order, so a
//! listener may call back into the handle.
//!
//! Client callbacks capture a `Weak` to the handle: once the handle is gone
//! they do nothing. Completions for requests issued on a handle that has
//! since been dropped are not guaranteed to arrive.

use crate::client::{
    ChannelId, ClientStatus, ConnectionEvent, ConnectionHandler, MonitorHandler, NativeInfo,
    PvClient, SubscriptionId,
};
use crate::context::ContextManager;
use crate::error::{Error, Result};
use crate::value::{PvSample, PvValue, ValueKind};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Connection state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel, or the remote went away.
    Disconnected,
    /// Channel created, waiting for the remote.
    Connecting,
    /// Remote reachable; requests may be issued.
    Connected,
}

/// Identifier returned by [`PvHandle::add_connection_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Connection listener, called with `true` on connect and `false` on
/// disconnect.
pub type ConnectionListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Per-handle behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleOptions {
    /// Establish a value subscription as soon as the channel connects, so
    /// [`PvHandle::cached_value`] tracks the remote.
    pub subscribe_on_connect: bool,
}

impl Default for HandleOptions {
    fn default() -> Self {
        Self {
            subscribe_on_connect: true,
        }
    }
}

struct HandleState {
    connection: ConnectionState,
    channel_requested: bool,
    channel: Option<ChannelId>,
    native: Option<NativeInfo>,
    cached: Option<PvSample>,
    subscription: Option<SubscriptionId>,
    subscribing: bool,
    listeners: Vec<(ListenerId, ConnectionListener)>,
    next_listener: u64,
}

/// Local proxy for one remote process variable.
pub struct PvHandle {
    name: String,
    context: Arc<ContextManager>,
    options: HandleOptions,
    state: Mutex<HandleState>,
    weak_self: Weak<PvHandle>,
}

impl PvHandle {
    /// Create a handle. No client call is made until [`connect`](Self::connect).
    pub fn new(name: &str, context: Arc<ContextManager>, options: HandleOptions) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            name: name.to_string(),
            context,
            options,
            state: Mutex::new(HandleState {
                connection: ConnectionState::Disconnected,
                channel_requested: false,
                channel: None,
                native: None,
                cached: None,
                subscription: None,
                subscribing: false,
                listeners: Vec::new(),
                next_listener: 0,
            }),
            weak_self: weak_self.clone(),
        })
    }

    /// PV name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn client(&self) -> &Arc<dyn PvClient> {
        self.context.client()
    }

    /// Start connecting. No-op once a channel has been requested.
    ///
    /// # Errors
    ///
    /// `ChannelCreate` if the client refuses the channel (a later call may
    /// retry), `Attach`/`RuntimeInit` if the thread cannot be attached.
    pub fn connect(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.channel_requested {
                return Ok(());
            }
            state.channel_requested = true;
            state.connection = ConnectionState::Connecting;
        }

        let created = self.context.ensure_attached().and_then(|()| {
            let weak = self.weak_self.clone();
            let on_event: ConnectionHandler = Arc::new(move |event| {
                if let Some(handle) = weak.upgrade() {
                    handle.on_connection_event(event);
                }
            });
            self.client()
                .create_channel(&self.name, on_event)
                .map_err(|status| Error::ChannelCreate {
                    pv: self.name.clone(),
                    status,
                })
        });

        match created {
            Ok(channel) => {
                self.state.lock().channel = Some(channel);
                self.client().flush_pending();
                log::debug!("[handle] channel created for '{}'", self.name);
                // The connect event may have raced ahead of the channel id.
                self.maybe_start_monitor();
                Ok(())
            }
            Err(e) => {
                let mut state = self.state.lock();
                state.channel_requested = false;
                state.connection = ConnectionState::Disconnected;
                drop(state);
                log::warn!("[handle] connect '{}' failed: {}", self.name, e);
                Err(e)
            }
        }
    }

    /// Register a listener for future connection transitions.
    pub fn add_connection_listener(
        &self,
        listener: impl Fn(bool) + Send + Sync + 'static,
    ) -> ListenerId {
        let mut state = self.state.lock();
        let id = ListenerId(state.next_listener);
        state.next_listener += 1;
        state.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn remove_connection_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(lid, _)| *lid != id);
        state.listeners.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().connection == ConnectionState::Connected
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().connection
    }

    /// Native type of the remote, known once connected.
    #[must_use]
    pub fn native(&self) -> Option<NativeInfo> {
        self.state.lock().native
    }

    /// Latest pushed sample. `None` without an active subscription or after
    /// a disconnect.
    #[must_use]
    pub fn cached_value(&self) -> Option<PvSample> {
        self.state.lock().cached.clone()
    }

    /// Channel and native kind for issuing a request, if connected.
    fn issue_target(&self, preferred: Option<ValueKind>) -> Result<(ChannelId, ValueKind)> {
        let state = self.state.lock();
        match (state.connection, state.channel, state.native) {
            (ConnectionState::Connected, Some(channel), Some(native)) => {
                Ok((channel, preferred.unwrap_or(native.kind)))
            }
            _ => Err(Error::Issue {
                pv: self.name.clone(),
                status: ClientStatus::local("channel not connected"),
            }),
        }
    }

    /// Issue an asynchronous read of one element.
    ///
    /// `preferred` selects the kind the client converts to; `None` reads the
    /// native kind. On `Ok`, `on_result` runs exactly once on a client thread
    /// (unless the handle is dropped first). On `Err`, it never runs.
    pub fn request_get(
        &self,
        preferred: Option<ValueKind>,
        on_result: impl FnOnce(Result<PvSample>) + Send + 'static,
    ) -> Result<()> {
        let (channel, kind) = self.issue_target(preferred)?;
        self.context.ensure_attached()?;

        let pv = self.name.clone();
        self.client()
            .issue_get(
                channel,
                kind,
                Box::new(move |result| {
                    on_result(result.map_err(|status| Error::RequestFailed { pv, status }));
                }),
            )
            .map_err(|status| {
                log::warn!("[handle] get on '{}' not issued: {}", self.name, status);
                Error::Issue {
                    pv: self.name.clone(),
                    status,
                }
            })?;
        self.client().flush_pending();
        Ok(())
    }

    /// Issue an asynchronous write. Same contract as
    /// [`request_get`](Self::request_get).
    pub fn request_put(
        &self,
        value: PvValue,
        on_result: impl FnOnce(Result<()>) + Send + 'static,
    ) -> Result<()> {
        let (channel, _) = self.issue_target(None)?;
        self.context.ensure_attached()?;

        let pv = self.name.clone();
        self.client()
            .issue_put(
                channel,
                value,
                Box::new(move |result| {
                    on_result(result.map_err(|status| Error::RequestFailed { pv, status }));
                }),
            )
            .map_err(|status| {
                log::warn!("[handle] put on '{}' not issued: {}", self.name, status);
                Error::Issue {
                    pv: self.name.clone(),
                    status,
                }
            })?;
        self.client().flush_pending();
        Ok(())
    }

    fn on_connection_event(&self, event: ConnectionEvent) {
        let listeners: Vec<ConnectionListener> = {
            let mut state = self.state.lock();
            if event.connected {
                state.connection = ConnectionState::Connected;
                state.native = event.native;
            } else {
                state.connection = ConnectionState::Disconnected;
                state.cached = None;
            }
            state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        if event.connected {
            match event.native {
                Some(native) if native.count > 1 => log::warn!(
                    "[handle] '{}' connected as {} array[{}], only the first element is used",
                    self.name,
                    native.kind,
                    native.count
                ),
                Some(native) => {
                    log::info!("[handle] '{}' connected ({})", self.name, native.kind)
                }
                None => log::info!("[handle] '{}' connected", self.name),
            }
            self.maybe_start_monitor();
        } else {
            log::info!("[handle] '{}' disconnected", self.name);
        }

        for listener in listeners {
            listener(event.connected);
        }
    }

    fn on_monitor(&self, sample: PvSample) {
        let mut state = self.state.lock();
        if state.connection == ConnectionState::Connected {
            state.cached = Some(sample);
        }
    }

    /// Establish the value subscription once, if enabled and connected.
    fn maybe_start_monitor(&self) {
        if !self.options.subscribe_on_connect {
            return;
        }
        let (channel, kind) = {
            let mut state = self.state.lock();
            if state.subscription.is_some()
                || state.subscribing
                || state.connection != ConnectionState::Connected
            {
                return;
            }
            let (Some(channel), Some(native)) = (state.channel, state.native) else {
                return;
            };
            state.subscribing = true;
            (channel, native.kind)
        };

        let weak = self.weak_self.clone();
        let on_push: MonitorHandler = Arc::new(move |sample| {
            if let Some(handle) = weak.upgrade() {
                handle.on_monitor(sample);
            }
        });

        let subscribed = self
            .context
            .ensure_attached()
            .map_err(|e| e.to_string())
            .and_then(|()| {
                self.client()
                    .subscribe(channel, kind, on_push)
                    .map_err(|status| status.to_string())
            });

        let mut state = self.state.lock();
        state.subscribing = false;
        match subscribed {
            Ok(subscription) => {
                state.subscription = Some(subscription);
                drop(state);
                self.client().flush_pending();
                log::debug!("[handle] '{}' monitor established", self.name);
            }
            Err(reason) => {
                drop(state);
                log::warn!("[handle] '{}' monitor not established: {}", self.name, reason);
            }
        }
    }
}

impl Drop for PvHandle {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.channel.is_none() && state.subscription.is_none() {
            return;
        }
        // After shutdown the runtime already released every channel.
        if !self.context.is_initialized() {
            return;
        }
        if let Err(e) = self.context.ensure_attached() {
            log::warn!("[handle] '{}' not released: {}", self.name, e);
            return;
        }
        let client = self.context.client();
        if let Some(subscription) = state.subscription.take() {
            client.clear_subscription(subscription);
        }
        if let Some(channel) = state.channel.take() {
            client.clear_channel(channel);
        }
        log::debug!("[handle] '{}' released", self.name);
    }
}

impl std::fmt::Debug for PvHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PvHandle")
            .field("name", &self.name)
            .field("connection", &state.connection)
            .field("native", &state.native)
            .field("listeners", &state.listeners.len())
            .field("subscribed", &state.subscription.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests;
