//! Feed error types

use std::time::Duration;

use thiserror::Error;

use super::model::CommentId;

/// Feed error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// Referenced comment or reply no longer exists
    #[error("entity not found: {0}")]
    EntityNotFound(CommentId),

    /// Fetched page collides with ids already cached
    #[error("page {page} repeats {} cached id(s)", .duplicates.len())]
    DuplicatePage {
        page: u32,
        duplicates: Vec<CommentId>,
    },

    /// Result arrived after its generation was superseded
    #[error("stale result from generation {0}")]
    StaleReference(u64),

    /// Reference cannot name a pinnable comment
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Backend request failed
    #[error("transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
        retry_after: Option<Duration>,
    },
}

impl FeedError {
    pub fn transport(message: impl Into<String>) -> Self {
        FeedError::Transport {
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Whether the user should see this error at all
    pub fn is_silent(&self) -> bool {
        matches!(self, FeedError::StaleReference(_))
    }

    /// Transient backend failure worth repeating a read for
    pub fn is_retryable(&self) -> bool {
        match self {
            // No status means the request never completed (connect, timeout)
            FeedError::Transport { status: None, .. } => true,
            FeedError::Transport {
                status: Some(status),
                ..
            } => matches!(*status, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Server-requested wait before retrying
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FeedError::Transport { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
            retry_after: None,
        }
    }
}
