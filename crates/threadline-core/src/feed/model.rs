//! Feed entities
//!
//! Comments, pages and the deep-link types that flow between the resolver,
//! the pinning transform and the controller. Plain data only.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::FeedError;

/// Identifier of a comment or reply, unique within a scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(String);

impl CommentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CommentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of the announcement that owns a feed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(String);

impl ScopeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A top-level comment or a reply
///
/// Replies carry the id of their top-level parent. Nesting is exactly one
/// level deep: a reply never points at another reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    pub author_ref: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub reply_count: u32,
}

impl Comment {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// One fetched page of comments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub items: Vec<Comment>,
    /// Authoritative count of top-level comments in the scope
    pub total_items: u32,
    /// 1-based position of this page
    pub page_number: u32,
    /// Cursor for the following page, `None` when this is the last one
    #[serde(default)]
    pub next_page: Option<u32>,
}

impl Page {
    /// Empty first page used when pinning into a feed that has nothing loaded
    pub fn placeholder() -> Self {
        Self {
            items: Vec::new(),
            total_items: 0,
            page_number: 1,
            next_page: None,
        }
    }
}

/// Cursor and size for one page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn first(limit: u32) -> Self {
        Self { page: 1, limit }
    }
}

/// Ordered pages of one scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedFeed {
    pub scope: ScopeId,
    pub pages: Vec<Page>,
}

impl PagedFeed {
    pub fn empty(scope: ScopeId) -> Self {
        Self {
            scope,
            pages: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Items across all pages in page order
    pub fn items(&self) -> impl Iterator<Item = &Comment> {
        self.pages.iter().flat_map(|p| p.items.iter())
    }
}

/// Reference to a single entity arriving from outside the feed
///
/// A link names either a comment or a reply, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExternalRef {
    Comment(CommentId),
    Reply(CommentId),
}

impl ExternalRef {
    /// Build a reference from the two optional link parameters
    pub fn from_params(
        comment: Option<&str>,
        reply: Option<&str>,
    ) -> Result<Option<Self>, FeedError> {
        let comment = comment.map(str::trim).filter(|s| !s.is_empty());
        let reply = reply.map(str::trim).filter(|s| !s.is_empty());
        match (comment, reply) {
            (Some(c), Some(r)) => Err(FeedError::InvalidReference(format!(
                "link names both comment {c} and reply {r}"
            ))),
            (Some(c), None) => Ok(Some(Self::Comment(CommentId::new(c)))),
            (None, Some(r)) => Ok(Some(Self::Reply(CommentId::new(r)))),
            (None, None) => Ok(None),
        }
    }

    /// The id the link points at
    pub fn id(&self) -> &CommentId {
        match self {
            Self::Comment(id) | Self::Reply(id) => id,
        }
    }
}

impl fmt::Display for ExternalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comment(id) => write!(f, "comment:{id}"),
            Self::Reply(id) => write!(f, "reply:{id}"),
        }
    }
}

/// Outcome of resolving an [`ExternalRef`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorResolution {
    /// Top-level comment to pin
    pub anchor: Comment,
    /// Entity to emphasize and scroll to; the anchor itself or one of its replies
    pub highlight_id: CommentId,
}

/// Loading state of one scope
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    /// Last request failed; cached pages stay visible
    Failed(String),
}

impl LoadStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadStatus::Loading)
    }
}
