// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Error taxonomy for client operations.

use steprack_protocol::ProtocolError;

/// Errors surfaced by `steprack-client`.
///
/// Connection-level failures are retried exactly once (reconnect inside the
/// session wrapper) before they reach the caller; [`Error::Timeout`],
/// [`Error::Command`] and [`Error::Protocol`] are never retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A read or write did not complete within the session timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Refused, reset, broken pipe, unreachable host or name resolution
    /// failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// The controller answered `ERROR <reason>`, or the reply could not be
    /// matched to the issued command.
    #[error("command error: {0}")]
    Command(String),

    /// Malformed framing: missing closing `$`, truncated binary header,
    /// unparsable dump row.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The caller passed an invalid value (bad axis address, oversized
    /// table, unknown signal). Raised before any I/O.
    #[error("usage error: {0}")]
    Usage(String),
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Error {
        match err {
            ProtocolError::InvalidValue { .. } => Error::Usage(err.to_string()),
            ProtocolError::Frame(msg) => Error::Protocol(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
