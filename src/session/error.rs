//! Error definitions for the HID session engine.

use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by the session engine.
///
/// Nothing in here is fatal: the remote host's presence is inherently
/// transient, so every failure degrades to "stop sending, keep the last
/// known report" at the call site.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The underlying transport refused an operation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An operation required a registered HID service and none exists.
    #[error("HID service is not registered")]
    NotRegistered,
}
