use std::fmt;
use std::io;

use thiserror::Error;

use crate::identity::IdentityParseError;

/// Which registry a missing key was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Service,
    Connection,
    /// The adapter itself, once shut down.
    Adapter,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Service => f.write_str("service not registered"),
            ResourceKind::Connection => f.write_str("connection not found"),
            ResourceKind::Adapter => f.write_str("adapter is shut down"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppHostError {
    /// No live entry: never registered, already closed, or the adapter was shut down.
    #[error("{kind}: {id}")]
    NotFound { kind: ResourceKind, id: String },

    /// The stack failed; passed through untouched.
    #[error("{op}: {source}")]
    Underlying {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("malformed input: {0}")]
    MalformedInput(String),
}

impl AppHostError {
    pub(crate) fn service_not_found(name: &str) -> Self {
        AppHostError::NotFound {
            kind: ResourceKind::Service,
            id: name.to_string(),
        }
    }

    pub(crate) fn connection_not_found(id: &str) -> Self {
        AppHostError::NotFound {
            kind: ResourceKind::Connection,
            id: id.to_string(),
        }
    }

    pub(crate) fn shut_down(op: &str) -> Self {
        AppHostError::NotFound {
            kind: ResourceKind::Adapter,
            id: op.to_string(),
        }
    }

    pub(crate) fn underlying(op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| AppHostError::Underlying { op, source }
    }

    /// Stable machine-readable tag, used in JSON envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            AppHostError::NotFound { .. } => "not_found",
            AppHostError::Underlying { .. } => "underlying",
            AppHostError::MalformedInput(_) => "malformed_input",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppHostError::NotFound { .. })
    }
}

impl From<IdentityParseError> for AppHostError {
    fn from(e: IdentityParseError) -> Self {
        AppHostError::MalformedInput(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppHostError>;
