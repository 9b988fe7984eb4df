//! Failure taxonomy for provider calls, chunking, and persistence.
//!
//! Every adapter converts vendor failures into a [`SummarizeError`] carrying
//! a human-readable message. Nothing here is retried automatically; the
//! hints on [`SummarizeError::Provider`] tell the caller what to do before
//! resubmitting.

use crate::provider::ProviderKind;

/// Actionable annotation for well-known HTTP failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorHint {
    /// HTTP 429.
    RateLimited,
    /// HTTP 401 / 403.
    Unauthorized,
}

impl ErrorHint {
    /// Classify an HTTP status code.
    pub fn for_status(status: u16) -> Option<Self> {
        match status {
            429 => Some(ErrorHint::RateLimited),
            401 | 403 => Some(ErrorHint::Unauthorized),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorHint::RateLimited => write!(
                f,
                "rate limit reached; wait a moment or check your plan's quota before resubmitting"
            ),
            ErrorHint::Unauthorized => write!(
                f,
                "the API key was rejected; check that it is correct and has access to this model"
            ),
        }
    }
}

fn hint_suffix(hint: &Option<ErrorHint>) -> String {
    hint.map(|h| format!(" (hint: {h})")).unwrap_or_default()
}

/// A failed summarization or chat call.
#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    /// Adapter used before initialization, missing credential, or no adapter
    /// registered for the provider. Never retried.
    #[error("{provider} is not configured: {message}")]
    Configuration {
        provider: ProviderKind,
        message: String,
    },

    /// The endpoint could not be reached.
    #[error("could not reach {provider} at {endpoint}: {message}")]
    Transport {
        provider: ProviderKind,
        endpoint: String,
        message: String,
    },

    /// Non-2xx response from the vendor.
    #[error("{provider} API error (HTTP {status}): {message}{}", hint_suffix(.hint))]
    Provider {
        provider: ProviderKind,
        status: u16,
        message: String,
        hint: Option<ErrorHint>,
    },

    /// 2xx response whose body could not be used.
    #[error("{provider} returned a malformed response: {message}")]
    MalformedResponse {
        provider: ProviderKind,
        message: String,
    },

    /// A chunk call failed; the whole chunked operation is aborted.
    #[error("chunk {index} of {total} failed: {source}")]
    Chunking {
        index: usize,
        total: usize,
        #[source]
        source: Box<SummarizeError>,
    },
}

impl SummarizeError {
    pub fn configuration(provider: ProviderKind, message: impl Into<String>) -> Self {
        SummarizeError::Configuration {
            provider,
            message: message.into(),
        }
    }

    /// Build a [`SummarizeError::Provider`] with the hint derived from `status`.
    pub fn provider(provider: ProviderKind, status: u16, message: impl Into<String>) -> Self {
        SummarizeError::Provider {
            provider,
            status,
            message: message.into(),
            hint: ErrorHint::for_status(status),
        }
    }

    pub fn malformed(provider: ProviderKind, message: impl Into<String>) -> Self {
        SummarizeError::MalformedResponse {
            provider,
            message: message.into(),
        }
    }

    /// The hint attached to this error or to the chunk failure it wraps.
    pub fn hint(&self) -> Option<ErrorHint> {
        match self {
            SummarizeError::Provider { hint, .. } => *hint,
            SummarizeError::Chunking { source, .. } => source.hint(),
            _ => None,
        }
    }
}

/// A failure of the persistent key-value capability.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store value could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store entry {key} is corrupt: {message}")]
    Corrupt { key: String, message: String },
}
