//! Unified error type.
//!
//! Every failure that can surface from the pipeline belongs to one of four
//! closed families. Nothing is dispatched on type hierarchies: the
//! [`ErrorTranslator`](crate::ErrorTranslator) matches on this enum
//! exhaustively, so adding a family is a compile error until every exit
//! point knows how to render it.
//!
//! | Family | Raised by | Resolved at |
//! |---|---|---|
//! | [`Error::Validation`] | validation interceptor | interceptor chain |
//! | [`Error::Auth`] | token guard | interceptor chain |
//! | [`Error::Business`] | handlers, advice | outermost boundary |
//! | [`Error::System`] | anything unanticipated | outermost boundary |

use thiserror::Error;

use crate::auth::AuthError;
use crate::validation::ValidationError;

/// The error type carried through filters, interceptors, handlers and
/// woven calls.
#[derive(Debug, Error)]
pub enum Error {
    /// Client-supplied data failed a declared constraint.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Token missing, malformed, expired or signed with another key.
    #[error("auth: {0}")]
    Auth(#[from] AuthError),

    /// A domain rule was violated. `code` is chosen by the caller and
    /// travels unchanged into the outcome.
    #[error("business [{code}]: {message}")]
    Business { code: String, message: String },

    /// Anything nobody planned for.
    #[error(transparent)]
    System(#[from] SystemError),
}

impl Error {
    pub fn business(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Business { code: code.into(), message: message.into() }
    }

    /// A required value was absent where the code assumed it present.
    pub fn missing(what: impl Into<String>) -> Self {
        Self::System(SystemError::MissingReference(what.into()))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::System(SystemError::Internal(message.into()))
    }

    /// `true` for the families the interceptor chain resolves on its own:
    /// they never reach a handler and never reach the outermost boundary.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Auth(_))
    }
}

/// Unanticipated failures.
#[derive(Debug, Error)]
pub enum SystemError {
    /// The moral equivalent of a null dereference.
    #[error("missing reference: {0}")]
    MissingReference(String),

    /// A handler panicked; the payload message is preserved.
    #[error("handler panicked: {0}")]
    Panic(String),

    /// An around hook resumed its continuation a second time.
    #[error("continuation for `{site}` invoked more than once")]
    ContinuationReused { site: String },

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::System(SystemError::Io(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::System(SystemError::Serialization(e))
    }
}
