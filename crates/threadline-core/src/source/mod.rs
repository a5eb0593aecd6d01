//! Backend collaborators
//!
//! The feed core talks to its backend only through these traits:
//! - `CommentSource` for paged and single-entity reads
//! - `CommentMutations` for the create/update/delete endpoints
//! - `ReactionService` for like/dislike state
//!
//! Two implementations ship with the crate: an in-memory backend for tests
//! and demos, and a JSON-over-HTTP client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::feed::{Comment, CommentId, FeedError, Page, PageRequest, ScopeId};

mod http;
mod memory;
pub mod retry;

pub use http::HttpBackend;
pub use memory::{InMemoryBackend, InMemoryReactions};

/// Read side of the comment backend
#[async_trait]
pub trait CommentSource: Send + Sync {
    /// Page of top-level comments for a scope, newest first
    async fn fetch_comments_page(
        &self,
        scope: &ScopeId,
        request: PageRequest,
    ) -> Result<Page, FeedError>;

    /// Single comment or reply; `EntityNotFound` when it no longer exists
    async fn fetch_comment_by_id(&self, id: &CommentId) -> Result<Comment, FeedError>;

    /// Page of replies under a top-level comment, oldest first
    async fn fetch_replies_page(
        &self,
        parent: &CommentId,
        request: PageRequest,
    ) -> Result<Page, FeedError>;
}

/// Write side of the comment backend
#[async_trait]
pub trait CommentMutations: Send + Sync {
    async fn create_comment(
        &self,
        scope: &ScopeId,
        author_ref: &str,
        body: &str,
    ) -> Result<Comment, FeedError>;

    async fn update_comment(&self, id: &CommentId, body: &str) -> Result<Comment, FeedError>;

    async fn delete_comment(&self, id: &CommentId) -> Result<(), FeedError>;

    async fn create_reply(
        &self,
        parent: &CommentId,
        author_ref: &str,
        body: &str,
    ) -> Result<Comment, FeedError>;

    async fn update_reply(&self, id: &CommentId, body: &str) -> Result<Comment, FeedError>;

    async fn delete_reply(&self, id: &CommentId) -> Result<(), FeedError>;
}

/// Full backend used by the feed controller
pub trait CommentBackend: CommentSource + CommentMutations {}

impl<T: CommentSource + CommentMutations> CommentBackend for T {}

/// A single write against the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateComment { author_ref: String, body: String },
    UpdateComment { id: CommentId, body: String },
    DeleteComment { id: CommentId },
    CreateReply { parent: CommentId, author_ref: String, body: String },
    UpdateReply { id: CommentId, body: String },
    DeleteReply { id: CommentId },
}

impl Mutation {
    /// Run the mutation; returns the written comment when there is one
    pub async fn apply<B: CommentMutations + ?Sized>(
        &self,
        backend: &B,
        scope: &ScopeId,
    ) -> Result<Option<Comment>, FeedError> {
        match self {
            Mutation::CreateComment { author_ref, body } => backend
                .create_comment(scope, author_ref, body)
                .await
                .map(Some),
            Mutation::UpdateComment { id, body } => {
                backend.update_comment(id, body).await.map(Some)
            }
            Mutation::DeleteComment { id } => backend.delete_comment(id).await.map(|_| None),
            Mutation::CreateReply {
                parent,
                author_ref,
                body,
            } => backend
                .create_reply(parent, author_ref, body)
                .await
                .map(Some),
            Mutation::UpdateReply { id, body } => backend.update_reply(id, body).await.map(Some),
            Mutation::DeleteReply { id } => backend.delete_reply(id).await.map(|_| None),
        }
    }

    /// Reply thread whose cached pages this mutation makes stale, if known
    ///
    /// Updates and deletes of a reply only know the reply id; the controller
    /// looks the parent up in its cached threads.
    pub fn reply_parent(&self) -> Option<&CommentId> {
        match self {
            Mutation::CreateReply { parent, .. } => Some(parent),
            _ => None,
        }
    }

    /// Reply edited or removed by this mutation
    pub fn reply_id(&self) -> Option<&CommentId> {
        match self {
            Mutation::UpdateReply { id, .. } | Mutation::DeleteReply { id } => Some(id),
            _ => None,
        }
    }
}

/// Like/dislike state of one entity for one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionState {
    pub is_liked: bool,
    pub is_disliked: bool,
    pub likes: u32,
    pub dislikes: u32,
}

/// Reactions on comments and replies
///
/// Like and dislike are mutually exclusive per (entity, user): toggling one
/// clears the other.
#[async_trait]
pub trait ReactionService: Send + Sync {
    async fn reaction(&self, entity: &CommentId, user: &str) -> Result<ReactionState, FeedError>;

    async fn toggle_like(&self, entity: &CommentId, user: &str)
        -> Result<ReactionState, FeedError>;

    async fn toggle_dislike(
        &self,
        entity: &CommentId,
        user: &str,
    ) -> Result<ReactionState, FeedError>;
}
