//! The External Answer Channel boundary.
//!
//! The core never talks HTTP itself: it hands an [`AnswerRequest`] to an
//! [`AnswerChannel`] and receives raw text back. Implementations live in
//! their own crates (see `couponfinder-gemini`).

use async_trait::async_trait;

use crate::error::Result;

/// One prompt sent to the generative-text provider.
#[derive(Clone)]
pub struct AnswerRequest {
    pub prompt: String,
    pub model: String,
    pub access_token: String,
}

// Hand-written so the token never ends up in logs or panic messages.
impl std::fmt::Debug for AnswerRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerRequest")
            .field("prompt_len", &self.prompt.len())
            .field("model", &self.model)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Sends a prompt and returns the provider's raw text answer.
///
/// Failures are reported as [`CouponFinderError::Provider`](crate::CouponFinderError::Provider)
/// with a classified [`FailureKind`]. Implementations must not retry.
#[async_trait]
pub trait AnswerChannel: Send + Sync {
    async fn ask(&self, request: &AnswerRequest) -> Result<String>;
}

/// Classified provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    InvalidCredential,
    QuotaExceeded,
    RateLimited,
    PermissionDenied,
    Other,
}

impl FailureKind {
    /// Classify a provider-defined failure reason string.
    ///
    /// Rules are checked in order; the first match wins.
    pub fn classify(reason: &str) -> Self {
        if reason.contains("API_KEY_INVALID") || reason.contains("invalid API key") {
            Self::InvalidCredential
        } else if reason.contains("quota") || reason.contains("QUOTA_EXCEEDED") {
            Self::QuotaExceeded
        } else if reason.contains("rate limit") || reason.contains("RATE_LIMIT_EXCEEDED") {
            Self::RateLimited
        } else if reason.contains("PERMISSION_DENIED") {
            Self::PermissionDenied
        } else {
            Self::Other
        }
    }

    /// The single human-readable message shown for this kind.
    pub fn user_message(&self, reason: &str) -> String {
        match self {
            Self::InvalidCredential => "Invalid Gemini API key. Please check your key at \
                                        https://aistudio.google.com/app/apikey"
                .into(),
            Self::QuotaExceeded => {
                "Gemini API quota exceeded. Check your usage at https://aistudio.google.com/".into()
            }
            Self::RateLimited => "Rate limit exceeded. Please wait a moment and try again.".into(),
            Self::PermissionDenied => {
                "Permission denied. Make sure your API key has proper permissions.".into()
            }
            Self::Other => format!("Gemini API error: {reason}"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredential => "invalid_credential",
            Self::QuotaExceeded => "quota_exceeded",
            Self::RateLimited => "rate_limited",
            Self::PermissionDenied => "permission_denied",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
