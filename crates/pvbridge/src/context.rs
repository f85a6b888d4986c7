// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client runtime context manager.
//!
//! The PV client runtime is thread-affine: it must be created once per
//! process and every thread that issues calls (the tree's poll thread as well
//! as client callback threads re-entering a handle) must be attached to it
//! first. [`ContextManager`] owns that lifecycle:
//!
//! ```text
//! init()            create once (idempotent)
//! ensure_attached() init if needed, attach the calling thread if needed
//! shutdown()        destroy once (idempotent)
//! ```
//!
//! Calling `ensure_attached` before any client call is a calling convention,
//! not something the type system enforces. `shutdown` must not run while
//! handles or tasks are outstanding; that precondition is not checked.

use crate::client::{ClientStatus, ContextId, PvClient};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Owns the client runtime context and per-thread attachment.
pub struct ContextManager {
    client: Arc<dyn PvClient>,
    ctx: Mutex<Option<ContextId>>,
}

impl ContextManager {
    /// Wrap a client. No runtime call is made until [`init`](Self::init).
    pub fn new(client: Arc<dyn PvClient>) -> Self {
        Self {
            client,
            ctx: Mutex::new(None),
        }
    }

    /// Convenience constructor returning a shared manager.
    pub fn shared(client: Arc<dyn PvClient>) -> Arc<Self> {
        Arc::new(Self::new(client))
    }

    /// The wrapped client.
    #[must_use]
    pub fn client(&self) -> &Arc<dyn PvClient> {
        &self.client
    }

    /// Create the runtime context if it does not exist yet.
    pub fn init(&self) -> Result<()> {
        let mut ctx = self.ctx.lock();
        self.init_locked(&mut ctx).map(|_| ())
    }

    fn init_locked(&self, slot: &mut Option<ContextId>) -> Result<ContextId> {
        if let Some(ctx) = *slot {
            return Ok(ctx);
        }

        let created = self.client.create_context().map_err(|status| {
            log::error!("[context] client context create failed: {}", status);
            Error::RuntimeInit(status)
        })?;

        // The creating thread must come back attached; anything else means
        // the runtime is unusable.
        if self.client.current_context() != Some(created) {
            self.client.destroy_context(created);
            return Err(Error::RuntimeInit(ClientStatus::local(
                "no current context after create",
            )));
        }

        log::info!("[context] client context {:?} created", created);
        *slot = Some(created);
        Ok(created)
    }

    /// Make sure the runtime exists and the calling thread is attached to it.
    pub fn ensure_attached(&self) -> Result<()> {
        let ctx = {
            let mut slot = self.ctx.lock();
            self.init_locked(&mut slot)?
        };

        if self.client.current_context() == Some(ctx) {
            return Ok(());
        }

        self.client.attach_context(ctx).map_err(|status| {
            log::error!(
                "[context] attaching thread {:?} failed: {}",
                std::thread::current().id(),
                status
            );
            Error::Attach(status)
        })?;
        log::debug!(
            "[context] attached thread {:?} to {:?}",
            std::thread::current().id(),
            ctx
        );
        Ok(())
    }

    /// Destroy the runtime context. Subsequent calls are no-ops until the
    /// next `init`.
    pub fn shutdown(&self) {
        let mut slot = self.ctx.lock();
        if let Some(ctx) = slot.take() {
            self.client.destroy_context(ctx);
            log::info!("[context] client context {:?} destroyed", ctx);
        }
    }

    /// Whether a runtime context currently exists.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.ctx.lock().is_some()
    }
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("ctx", &*self.ctx.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests;
