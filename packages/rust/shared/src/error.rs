//! Error types for CouponFinder.
//!
//! Library crates use [`CouponFinderError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::channel::FailureKind;

/// Top-level error type for all CouponFinder operations.
#[derive(Debug, thiserror::Error)]
pub enum CouponFinderError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error that never reached the answer provider.
    #[error("network error: {0}")]
    Network(String),

    /// Classified failure reported by the answer provider.
    ///
    /// Displays as the user-facing message for `kind`; the raw provider
    /// reason is kept for diagnostics.
    #[error("{}", kind.user_message(reason))]
    Provider { kind: FailureKind, reason: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input rejected before any work was done (unsupported URL, bad key, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// JSON encode/decode failure for persisted values.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CouponFinderError>;

impl CouponFinderError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Classify a provider failure reason and wrap it.
    pub fn provider(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::Provider {
            kind: FailureKind::classify(&reason),
            reason,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The provider failure kind, if this is a provider error.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Provider { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CouponFinderError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = CouponFinderError::validation("unable to detect site: chrome://newtab");
        assert!(err.to_string().contains("chrome://newtab"));
    }

    #[test]
    fn provider_error_displays_user_message() {
        let err = CouponFinderError::provider("API key not valid. [reason: API_KEY_INVALID]");
        assert_eq!(err.failure_kind(), Some(FailureKind::InvalidCredential));
        assert!(err.to_string().starts_with("Invalid Gemini API key"));
    }

    #[test]
    fn non_provider_errors_have_no_failure_kind() {
        assert!(CouponFinderError::Storage("locked".into()).failure_kind().is_none());
    }
}
