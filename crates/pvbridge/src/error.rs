// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy for the bridge.
//!
//! Errors split into two severities:
//!
//! - **fatal**: configuration and runtime problems that abort the caller
//!   (`Config`, `RuntimeInit`, `Attach`, `InvalidState`). Tasks return them
//!   as `Err`.
//! - **recoverable**: outcomes of a single request (`ChannelCreate`, `Issue`,
//!   `Timeout`, `RequestFailed`, `Conversion`). Tasks turn them into a
//!   `Failed` status so the tree can apply its own retry/fallback.

use crate::client::ClientStatus;
use crate::value::ConversionError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the bridge.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    // ========================================================================
    // Fatal
    // ========================================================================
    /// A required input is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The client runtime could not be created.
    #[error("client runtime init failed: {0}")]
    RuntimeInit(ClientStatus),

    /// The calling thread could not be attached to the client runtime.
    #[error("attaching thread to client runtime failed: {0}")]
    Attach(ClientStatus),

    /// Operation not valid in the current state (e.g. poll before start).
    #[error("invalid state: {0}")]
    InvalidState(String),

    // ========================================================================
    // Recoverable
    // ========================================================================
    /// The client refused to create the channel.
    #[error("channel create for '{pv}' failed: {status}")]
    ChannelCreate { pv: String, status: ClientStatus },

    /// The client refused to issue a request; no callback will follow.
    #[error("issuing request on '{pv}' failed: {status}")]
    Issue { pv: String, status: ClientStatus },

    /// No completion arrived before the deadline.
    #[error("request on '{pv}' timed out after {timeout:?}")]
    Timeout { pv: String, timeout: Duration },

    /// The completion callback reported a non-success status.
    #[error("request on '{pv}' failed: {status}")]
    RequestFailed { pv: String, status: ClientStatus },

    /// The decoded value cannot be represented as the requested kind.
    #[error("conversion failed: {0}")]
    Conversion(#[from] ConversionError),
}

impl Error {
    /// Whether this error must abort the caller instead of degrading to a
    /// `Failed` status.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::RuntimeInit(_) | Error::Attach(_) | Error::InvalidState(_)
        )
    }
}

/// Convenient alias for results using the bridge [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    #[test]
    fn fatal_classification() {
        assert!(Error::Config("missing [pv]".into()).is_fatal());
        assert!(Error::Attach(ClientStatus::new(-1, "no context")).is_fatal());
        assert!(!Error::Timeout {
            pv: "X".into(),
            timeout: Duration::from_millis(10)
        }
        .is_fatal());
        let conv: Error = ConversionError::Unsupported {
            from: ValueKind::Text,
            to: ValueKind::Int32,
        }
        .into();
        assert!(!conv.is_fatal());
    }

    #[test]
    fn display_names_the_pv() {
        let err = Error::Issue {
            pv: "LINAC:BPM1:X".into(),
            status: ClientStatus::new(48, "channel disconnected"),
        };
        let text = err.to_string();
        assert!(text.contains("LINAC:BPM1:X"), "{}", text);
        assert!(text.contains("channel disconnected"), "{}", text);
    }
}
