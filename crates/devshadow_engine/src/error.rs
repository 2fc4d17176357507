//! Error types for the shadow engine.

use devshadow_protocol::{AckCode, ProtocolError};
use thiserror::Error;

/// Result type for shadow operations.
pub type ShadowResult<T> = Result<T, ShadowError>;

/// Errors that can occur during shadow operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShadowError {
    /// A required argument was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The transport is not connected.
    #[error("invalid state: transport is not connected")]
    InvalidState,

    /// A request buffer could not be allocated.
    #[error("no memory: {0}")]
    NoMemory(String),

    /// A request does not fit in its buffer.
    #[error("not enough space: fragment needs {needed} bytes, {remaining} remaining")]
    NoEnoughSpace {
        /// Bytes the fragment requires.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// Too many updates are awaiting acknowledgment.
    #[error("wait list overflow: {capacity} updates already pending")]
    WaitListOverflow {
        /// Capacity of the wait list.
        capacity: usize,
    },

    /// An attribute with this name is already registered.
    #[error("attribute already registered: {0}")]
    AttrExists(String),

    /// No attribute with this name is registered.
    #[error("attribute not registered: {0}")]
    AttrNotExist(String),

    /// No acknowledgment arrived before the deadline.
    #[error("update timed out")]
    UpdateTimeout,

    /// The cloud rejected the update.
    #[error("update rejected: {0}")]
    UpdateNegativeAck(AckCode),

    /// The initial subscription failed or timed out.
    #[error("initial sync failed")]
    InitialSyncFailed,

    /// Transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A message could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),
}

impl ShadowError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ShadowError::Transport { retryable, .. } => *retryable,
            ShadowError::UpdateTimeout
            | ShadowError::WaitListOverflow { .. }
            | ShadowError::NoMemory(_)
            | ShadowError::NoEnoughSpace { .. } => true,
            _ => false,
        }
    }
}

impl From<ProtocolError> for ShadowError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::NoEnoughSpace { needed, remaining } => {
                ShadowError::NoEnoughSpace { needed, remaining }
            }
            ProtocolError::NoMemory { .. } => ShadowError::NoMemory(err.to_string()),
            other => ShadowError::Protocol(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ShadowError::transport_retryable("connection lost").is_retryable());
        assert!(!ShadowError::transport_fatal("bad credentials").is_retryable());
        assert!(ShadowError::UpdateTimeout.is_retryable());
        assert!(ShadowError::WaitListOverflow { capacity: 10 }.is_retryable());
        assert!(!ShadowError::AttrExists("temp".into()).is_retryable());
        assert!(!ShadowError::UpdateNegativeAck(AckCode::ServerFailed).is_retryable());
    }

    #[test]
    fn capacity_errors_convert() {
        let err: ShadowError = ProtocolError::NoEnoughSpace {
            needed: 9,
            remaining: 2,
        }
        .into();
        assert_eq!(
            err,
            ShadowError::NoEnoughSpace {
                needed: 9,
                remaining: 2
            }
        );

        let err: ShadowError = ProtocolError::NoMemory {
            needed: 50,
            capacity: 10,
        }
        .into();
        assert!(matches!(err, ShadowError::NoMemory(_)));

        let err: ShadowError = ProtocolError::MissingField("clientToken").into();
        assert!(matches!(err, ShadowError::Protocol(_)));
    }

    #[test]
    fn error_display() {
        assert_eq!(
            ShadowError::AttrNotExist("temp".into()).to_string(),
            "attribute not registered: temp"
        );
        assert!(ShadowError::UpdateNegativeAck(AckCode::ServerFailed)
            .to_string()
            .contains("500"));
    }
}
