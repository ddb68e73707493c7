//! Error taxonomy for the session surface.
//!
//! Every fallible session operation reports a [`SessionError`]. Backends speak
//! [`BackendError`], a thin wrapper around [`anyhow::Error`] that the session
//! converts into [`SessionError::BackendResource`].

use thiserror::Error;

/// Errors surfaced synchronously by [`crate::session::SceneSession`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A model, texture or environment buffer could not be decoded.
    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    /// A model references an external resource the caller did not supply.
    #[error("resource not found: {name}")]
    ResourceNotFound { name: String },

    /// The rendering backend failed to allocate or create an object.
    #[error("backend resource error: {0}")]
    BackendResource(#[from] BackendError),

    /// Invalid call sequence or argument.
    #[error("invalid usage: {0}")]
    Usage(String),
}

impl SessionError {
    pub fn parse(what: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Parse {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}

/// Failure reported by a [`crate::backend::RenderBackend`].
#[derive(Debug, Error)]
#[error(transparent)]
pub struct BackendError(#[from] anyhow::Error);

impl BackendError {
    pub fn msg(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        Self(anyhow::Error::msg(message))
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.0
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
