use thiserror::Error;

use crate::{
    attributes::{AttributeError, SchemaMismatchError},
    protocol::{ResponseError, TransportError},
    schema::SchemaError,
};

/// Misuse of a [`PendingOperation`](crate::client::PendingOperation).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("operation has not completed yet")]
    NotReady,

    #[error("operation result was already taken")]
    AlreadyFinished,

    #[error("cannot finish a {actual:?} operation as {expected:?}")]
    WrongOperation {
        expected: crate::protocol::RequestKind,
        actual: crate::protocol::RequestKind,
    },
}

/// Every failure a client call can report. Nothing here means "not found".
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("attribute error: {0}")]
    Attribute(#[from] AttributeError),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend error [{code:?}]: {description}")]
    Backend {
        code: ResponseError,
        description: String,
    },

    #[error(transparent)]
    SchemaMismatch(#[from] SchemaMismatchError),

    #[error("usage error: {0}")]
    Usage(#[from] UsageError),
}

impl From<TransportError> for ClientError {
    fn from(value: TransportError) -> Self {
        if value.is_disconnect() {
            ClientError::Connection(value.to_string())
        } else {
            ClientError::Transport(value.to_string())
        }
    }
}

impl ClientError {
    /// Short name of the error family, stable across messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Schema(_) => "schema",
            ClientError::Attribute(_) => "attribute",
            ClientError::Connection(_) => "connection",
            ClientError::Transport(_) => "transport",
            ClientError::Backend { .. } => "backend",
            ClientError::SchemaMismatch(_) => "schema-mismatch",
            ClientError::Usage(_) => "usage",
        }
    }
}
