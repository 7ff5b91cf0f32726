//! Error types for the connector.

use std::{fmt::Display, io};
use thiserror::Error;

/// Any failure surfaced by [`Connector::send`](crate::Connector::send).
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarshalError {
    /// The wire value does not fit the declared shape of the target.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The wire bytes are not valid wire-value syntax.
    #[error("malformed wire bytes: {0}")]
    Malformed(String),

    /// The value cannot be represented as a wire value.
    #[error("unsupported value: {0}")]
    Unsupported(String),
}

impl serde::de::Error for MarshalError {
    fn custom<T: Display>(msg: T) -> Self {
        MarshalError::ShapeMismatch(msg.to_string())
    }
}

impl serde::ser::Error for MarshalError {
    fn custom<T: Display>(msg: T) -> Self {
        MarshalError::Unsupported(msg.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication handshake failed: {0}")]
    HandshakeFailed(#[source] HandshakeFailure),

    /// The session stayed unauthenticated after one refresh and retry.
    #[error("unauthorized")]
    Unauthorized,
}

/// Underlying cause of [`AuthError::HandshakeFailed`].
#[derive(Debug, Error)]
pub enum HandshakeFailure {
    #[error("credentials rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unreadable grant: {0}")]
    Malformed(#[from] MarshalError),
}

/// The remote method ran and reported an application-level failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("connection closed before a response arrived")]
    Closed,

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_displays_message_verbatim() {
        let err: Error = RemoteError {
            message: "not found".into(),
        }
        .into();
        assert_eq!(err.to_string(), "not found");
    }

    #[test]
    fn handshake_failure_keeps_cause() {
        let err = AuthError::HandshakeFailed(HandshakeFailure::Rejected("bad uid".into()));
        assert_eq!(
            err.to_string(),
            "authentication handshake failed: credentials rejected: bad uid"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
