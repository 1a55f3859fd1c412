use thiserror::Error;

use crate::model::DeviceFlowSession;

/// Failure category surfaced to the UI alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Authentication,
    Extraction,
    Remote,
    Store,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Extraction => "extraction",
            ErrorKind::Remote => "remote",
            ErrorKind::Store => "store",
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Repository is not configured: {0}")]
    MissingConfiguration(String),

    #[error("Not authenticated with GitHub")]
    NotAuthenticated,

    #[error("A device flow is already in progress (code {})", .0.user_code)]
    FlowAlreadyActive(DeviceFlowSession),

    #[error("Authorization rejected: {error}{}", description_suffix(.description))]
    OAuthRejected {
        error: String,
        description: Option<String>,
    },

    #[error("Timed out waiting for authorization after {attempts} attempts")]
    AuthTimeout { attempts: u32 },

    #[error("Device code expired. Please try again.")]
    FlowExpired,

    #[error("Device flow was cancelled")]
    FlowCancelled,

    #[error("No device flow is in progress")]
    NoActiveFlow,

    #[error("Failed to fetch GitHub identity: {0}")]
    IdentityFetchFailed(String),

    #[error("Timed out waiting for the {phase} after {waited_ms} ms")]
    ExtractionTimeout { phase: &'static str, waited_ms: u64 },

    #[error("Cancelled while {0}")]
    Cancelled(String),

    #[error("GitHub rejected the request (HTTP {status}): {message}")]
    RemoteRejected { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn description_suffix(description: &Option<String>) -> String {
    match description.as_deref() {
        Some(text) if !text.is_empty() => format!(" - {}", text),
        _ => String::new(),
    }
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::MissingConfiguration(_) => ErrorKind::Configuration,
            SyncError::NotAuthenticated
            | SyncError::FlowAlreadyActive(_)
            | SyncError::OAuthRejected { .. }
            | SyncError::AuthTimeout { .. }
            | SyncError::FlowExpired
            | SyncError::FlowCancelled
            | SyncError::NoActiveFlow
            | SyncError::IdentityFetchFailed(_) => ErrorKind::Authentication,
            SyncError::ExtractionTimeout { .. } | SyncError::Cancelled(_) => ErrorKind::Extraction,
            SyncError::RemoteRejected { .. } | SyncError::Http(_) => ErrorKind::Remote,
            SyncError::Store(_) | SyncError::Json(_) => ErrorKind::Store,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Http(err.to_string())
    }
}

impl From<reqwest_middleware::Error> for SyncError {
    fn from(err: reqwest_middleware::Error) -> Self {
        SyncError::Http(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
