//! Error types shared by every co-simulation operation

use std::time::Duration;
use thiserror::Error;

/// Kind of mesh entity, used to give lookup errors their context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Element,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Node => f.write_str("Node"),
            EntityKind::Element => f.write_str("Element"),
        }
    }
}

/// Coarse failure classes a binding layer can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DuplicateId,
    NotFound,
    TypeMismatch,
    IllegalState,
    Timeout,
    Io,
    CorruptPayload,
    InvalidArgument,
    ProtocolMismatch,
}

/// Errors that can occur while building payloads or talking to the partner solver
#[derive(Error, Debug)]
pub enum CoSimError {
    #[error("The {kind} with Id {id} exists already")]
    DuplicateId { kind: EntityKind, id: u64 },

    #[error("{kind} with Id {id} does not exist")]
    EntityNotFound { kind: EntityKind, id: u64 },

    #[error("Trying to get \"{0}\" which does not exist")]
    KeyNotFound(String),

    #[error("Wrong data type for \"{key}\": stored as {actual}, requested as {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Connection \"{connection_name}\" is not established")]
    NotConnected { connection_name: String },

    #[error("Connection \"{connection_name}\" is {state}, cannot {operation}")]
    IllegalState {
        connection_name: String,
        state: String,
        operation: &'static str,
    },

    #[error("Connection \"{0}\" is already registered")]
    DuplicateConnection(String),

    #[error("Timed out after {timeout:?} waiting for {waiting_for}")]
    Timeout {
        waiting_for: String,
        timeout: Duration,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport closed by remote")]
    TransportClosed,

    #[error("Corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Message too large: {size} bytes exceeds maximum {max_size} bytes")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    #[error("Invalid protocol version: expected {expected}, got {received}")]
    InvalidVersion { expected: u16, received: u16 },
}

impl CoSimError {
    /// Classify this error into its failure class
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoSimError::DuplicateId { .. } => ErrorKind::DuplicateId,
            CoSimError::EntityNotFound { .. } | CoSimError::KeyNotFound(_) => ErrorKind::NotFound,
            CoSimError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            CoSimError::NotConnected { .. }
            | CoSimError::IllegalState { .. }
            | CoSimError::DuplicateConnection(_) => ErrorKind::IllegalState,
            CoSimError::Timeout { .. } => ErrorKind::Timeout,
            CoSimError::Io(_) | CoSimError::TransportClosed => ErrorKind::Io,
            CoSimError::CorruptPayload(_) | CoSimError::Serialization(_) => {
                ErrorKind::CorruptPayload
            }
            CoSimError::JsonSerialization(_) => ErrorKind::CorruptPayload,
            CoSimError::MessageTooLarge { .. } | CoSimError::InvalidArgument(_) => {
                ErrorKind::InvalidArgument
            }
            CoSimError::ProtocolMismatch(_) | CoSimError::InvalidVersion { .. } => {
                ErrorKind::ProtocolMismatch
            }
        }
    }

    pub(crate) fn timeout(waiting_for: impl Into<String>, timeout: Duration) -> Self {
        CoSimError::Timeout {
            waiting_for: waiting_for.into(),
            timeout,
        }
    }
}
