use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure classes produced once, at the provider-call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    RateLimited,
    UpstreamCapacity,
    AuthFailure,
    Malformed,
    Unknown,
}

impl ProviderErrorKind {
    /// Only quota and capacity pressure is worth waiting out.
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::RateLimited | Self::UpstreamCapacity)
    }

    pub fn is_rate_limited(self) -> bool {
        matches!(self, Self::RateLimited)
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            502 | 503 | 529 => Self::UpstreamCapacity,
            401 | 403 => Self::AuthFailure,
            _ => Self::Unknown,
        }
    }

    /// Maps provider-specific error codes found in JSON error bodies.
    pub fn from_error_code(code: &str) -> Option<Self> {
        match code {
            "rate_limit_exceeded" | "rate_limit_error" | "insufficient_quota"
            | "resource_exhausted" | "RESOURCE_EXHAUSTED" => Some(Self::RateLimited),
            "overloaded_error" | "server_overloaded" | "UNAVAILABLE" => Some(Self::UpstreamCapacity),
            "invalid_api_key" | "authentication_error" | "permission_error" => {
                Some(Self::AuthFailure)
            }
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::UpstreamCapacity => "upstream_capacity",
            Self::AuthFailure => "auth_failure",
            Self::Malformed => "malformed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} from {provider}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub provider: String,
    pub message: String,
    pub status: Option<u16>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            provider: provider.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn rate_limited(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimited, provider, message)
    }

    pub fn malformed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Malformed, provider, message)
    }

    /// Classifies an HTTP failure. A recognised error code in the body wins over the status.
    pub fn from_http(provider: impl Into<String>, status: u16, error_code: Option<&str>, message: impl Into<String>) -> Self {
        let kind = error_code
            .and_then(ProviderErrorKind::from_error_code)
            .unwrap_or_else(|| ProviderErrorKind::from_status(status));
        Self {
            kind,
            provider: provider.into(),
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind.is_rate_limited()
    }
}

#[derive(Error, Debug)]
pub enum MatchcastError {
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Fixture fetch failed: {0}")]
    FixtureFetch(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Refusing to clear {0} without confirm=true")]
    ConfirmationRequired(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MatchcastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ProviderErrorKind::from_status(429), ProviderErrorKind::RateLimited);
        assert_eq!(ProviderErrorKind::from_status(529), ProviderErrorKind::UpstreamCapacity);
        assert_eq!(ProviderErrorKind::from_status(401), ProviderErrorKind::AuthFailure);
        assert_eq!(ProviderErrorKind::from_status(500), ProviderErrorKind::Unknown);
    }

    #[test]
    fn test_error_code_overrides_status() {
        let err = ProviderError::from_http("openai", 400, Some("insufficient_quota"), "quota");
        assert_eq!(err.kind, ProviderErrorKind::RateLimited);
        assert_eq!(err.status, Some(400));

        let err = ProviderError::from_http("openai", 503, Some("something_else"), "down");
        assert_eq!(err.kind, ProviderErrorKind::UpstreamCapacity);
    }

    #[test]
    fn test_retry_policy() {
        assert!(ProviderErrorKind::RateLimited.is_retriable());
        assert!(ProviderErrorKind::UpstreamCapacity.is_retriable());
        assert!(!ProviderErrorKind::UpstreamCapacity.is_rate_limited());
        assert!(!ProviderErrorKind::AuthFailure.is_retriable());
        assert!(!ProviderErrorKind::Malformed.is_retriable());
        assert!(!ProviderErrorKind::Unknown.is_retriable());
    }
}
