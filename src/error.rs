//! Error types for the inbox core.
//!
//! Backend calls fail with [`ApiError`]. Each component wraps that into the
//! matching [`InboxError`] variant and records it as state; nothing here is
//! fatal to the process.

use thiserror::Error;

/// Failure of a single backend call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Recorded failures of the inbox session, surfaced to the presentation layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InboxError {
    #[error("Failed to load email domains: {0}")]
    DomainFetch(ApiError),

    #[error("Failed to create inbox: {0}")]
    InboxCreate(ApiError),

    #[error("Failed to delete inbox: {0}")]
    InboxDelete(ApiError),

    #[error("Failed to load messages: {0}")]
    MessageFetch(ApiError),

    #[error("Failed to delete message {id}: {source}")]
    MessageDelete { id: String, source: ApiError },

    #[error("Messages data is not in expected format: {0}")]
    MalformedPayload(String),

    #[error("Could not copy to clipboard: {0}")]
    Clipboard(String),
}

impl InboxError {
    /// Short heading for notifications and status lines.
    pub fn title(&self) -> &'static str {
        match self {
            Self::DomainFetch(_) => "Domain error",
            Self::InboxCreate(_) => "Inbox creation failed",
            Self::InboxDelete(_) => "Inbox deletion failed",
            Self::MessageFetch(_) => "Error loading messages",
            Self::MessageDelete { .. } => "Message deletion failed",
            Self::MalformedPayload(_) => "Data format error",
            Self::Clipboard(_) => "Copy failed",
        }
    }
}
