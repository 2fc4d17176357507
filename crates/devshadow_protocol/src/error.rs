//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while building or decoding shadow messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The buffer cannot even hold the request envelope.
    #[error("no memory: envelope needs {needed} bytes, capacity is {capacity}")]
    NoMemory {
        /// Bytes the envelope requires.
        needed: usize,
        /// Capacity the builder was created with.
        capacity: usize,
    },

    /// A fragment does not fit in the remaining buffer space.
    #[error("not enough space: fragment needs {needed} bytes, {remaining} remaining")]
    NoEnoughSpace {
        /// Bytes the fragment requires.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// The message is not valid JSON.
    #[error("invalid JSON: {message}")]
    InvalidJson {
        /// Parser error description.
        message: String,
    },

    /// The message is valid JSON but has an unexpected shape.
    #[error("invalid message structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// A required field is missing.
    #[error("missing field: {0}")]
    MissingField(&'static str),
}

impl ProtocolError {
    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::NoEnoughSpace {
            needed: 12,
            remaining: 3,
        };
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains("3"));

        let err = ProtocolError::MissingField("clientToken");
        assert_eq!(err.to_string(), "missing field: clientToken");
    }

    #[test]
    fn from_serde_error() {
        let err: ProtocolError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ProtocolError::InvalidJson { .. }));
    }
}
