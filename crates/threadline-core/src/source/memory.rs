//! In-memory backend
//!
//! Holds comments and reactions in process. Used by the test suites and by
//! the CLI's demo mode; it follows the same paging contract as the HTTP API.

use std::cmp::Reverse;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use super::{CommentMutations, CommentSource, ReactionService, ReactionState};
use crate::feed::{Comment, CommentId, FeedError, Page, PageRequest, ScopeId};

#[derive(Debug, Clone)]
struct Entry {
    scope: ScopeId,
    comment: Comment,
}

/// Comment backend kept in memory
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with `comments` top-level comments in `scope`
    ///
    /// Comment `c{n}` is newer for smaller `n`. Every third comment gets
    /// `replies_each` replies named `c{n}-r{k}`.
    pub fn demo(scope: &ScopeId, comments: u32, replies_each: u32) -> Self {
        let backend = Self::new();
        let now = Utc::now();
        for n in 1..=comments {
            let id = CommentId::new(format!("c{n}"));
            let created_at = now - Duration::minutes(i64::from(n) * 10);
            backend.insert(
                scope,
                Comment {
                    id: id.clone(),
                    parent_id: None,
                    author_ref: format!("member-{}", n % 7),
                    body: format!("Comment number {n}"),
                    created_at,
                    edited: false,
                    reply_count: 0,
                },
            );
            if n % 3 == 0 {
                for k in 1..=replies_each {
                    backend.insert(
                        scope,
                        Comment {
                            id: CommentId::new(format!("c{n}-r{k}")),
                            parent_id: Some(id.clone()),
                            author_ref: format!("member-{}", (n + k) % 7),
                            body: format!("Reply {k} to comment {n}"),
                            created_at: created_at + Duration::minutes(i64::from(k)),
                            edited: false,
                            reply_count: 0,
                        },
                    );
                }
            }
        }
        backend
    }

    /// Store a comment as-is, keeping parent reply counts in step
    pub fn insert(&self, scope: &ScopeId, comment: Comment) {
        let mut entries = self.entries.write();
        if let Some(parent) = &comment.parent_id {
            if let Some(entry) = entries.iter_mut().find(|e| &e.comment.id == parent) {
                entry.comment.reply_count += 1;
            }
        }
        entries.push(Entry {
            scope: scope.clone(),
            comment,
        });
    }

    /// Drop a comment and its replies without going through the mutation API
    pub fn remove(&self, id: &CommentId) -> bool {
        let mut entries = self.entries.write();
        let parent = entries
            .iter()
            .find(|e| &e.comment.id == id)
            .and_then(|e| e.comment.parent_id.clone());
        let before = entries.len();
        entries.retain(|e| &e.comment.id != id && e.comment.parent_id.as_ref() != Some(id));
        if let Some(parent) = parent {
            if let Some(entry) = entries.iter_mut().find(|e| e.comment.id == parent) {
                entry.comment.reply_count = entry.comment.reply_count.saturating_sub(1);
            }
        }
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn get(&self, id: &CommentId) -> Option<Entry> {
        self.entries
            .read()
            .iter()
            .find(|e| &e.comment.id == id)
            .cloned()
    }

    fn edit(&self, id: &CommentId, body: &str, want_reply: bool) -> Result<Comment, FeedError> {
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|e| &e.comment.id == id && e.comment.parent_id.is_some() == want_reply)
            .ok_or_else(|| FeedError::EntityNotFound(id.clone()))?;
        entry.comment.body = body.to_string();
        entry.comment.edited = true;
        Ok(entry.comment.clone())
    }

    fn create(&self, scope: &ScopeId, parent: Option<&CommentId>, author_ref: &str, body: &str) -> Comment {
        let comment = Comment {
            id: CommentId::new(uuid::Uuid::new_v4().to_string()),
            parent_id: parent.cloned(),
            author_ref: author_ref.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
            edited: false,
            reply_count: 0,
        };
        self.insert(scope, comment.clone());
        comment
    }
}

/// Slice one page out of an ordered listing
fn paginate(items: Vec<Comment>, total: u32, request: PageRequest) -> Page {
    let limit = request.limit.max(1) as usize;
    let page = request.page.max(1);
    let start = (page as usize - 1).saturating_mul(limit);
    let items: Vec<Comment> = items.into_iter().skip(start).take(limit).collect();
    let end = start.saturating_add(items.len());
    Page {
        items,
        total_items: total,
        page_number: page,
        next_page: (end < total as usize)
            .then(|| page.checked_add(1))
            .flatten(),
    }
}

#[async_trait]
impl CommentSource for InMemoryBackend {
    async fn fetch_comments_page(
        &self,
        scope: &ScopeId,
        request: PageRequest,
    ) -> Result<Page, FeedError> {
        let mut top: Vec<Comment> = self
            .entries
            .read()
            .iter()
            .filter(|e| &e.scope == scope && e.comment.is_top_level())
            .map(|e| e.comment.clone())
            .collect();
        top.sort_by_key(|c| Reverse(c.created_at));
        let total = top.len() as u32;
        Ok(paginate(top, total, request))
    }

    async fn fetch_comment_by_id(&self, id: &CommentId) -> Result<Comment, FeedError> {
        self.get(id)
            .map(|e| e.comment)
            .ok_or_else(|| FeedError::EntityNotFound(id.clone()))
    }

    async fn fetch_replies_page(
        &self,
        parent: &CommentId,
        request: PageRequest,
    ) -> Result<Page, FeedError> {
        if self.get(parent).is_none() {
            return Err(FeedError::EntityNotFound(parent.clone()));
        }
        let mut replies: Vec<Comment> = self
            .entries
            .read()
            .iter()
            .filter(|e| e.comment.parent_id.as_ref() == Some(parent))
            .map(|e| e.comment.clone())
            .collect();
        replies.sort_by_key(|c| c.created_at);
        let total = replies.len() as u32;
        Ok(paginate(replies, total, request))
    }
}

#[async_trait]
impl CommentMutations for InMemoryBackend {
    async fn create_comment(
        &self,
        scope: &ScopeId,
        author_ref: &str,
        body: &str,
    ) -> Result<Comment, FeedError> {
        Ok(self.create(scope, None, author_ref, body))
    }

    async fn update_comment(&self, id: &CommentId, body: &str) -> Result<Comment, FeedError> {
        self.edit(id, body, false)
    }

    async fn delete_comment(&self, id: &CommentId) -> Result<(), FeedError> {
        match self.get(id) {
            Some(entry) if entry.comment.is_top_level() => {
                self.remove(id);
                Ok(())
            }
            _ => Err(FeedError::EntityNotFound(id.clone())),
        }
    }

    async fn create_reply(
        &self,
        parent: &CommentId,
        author_ref: &str,
        body: &str,
    ) -> Result<Comment, FeedError> {
        let entry = self
            .get(parent)
            .filter(|e| e.comment.is_top_level())
            .ok_or_else(|| FeedError::EntityNotFound(parent.clone()))?;
        Ok(self.create(&entry.scope, Some(parent), author_ref, body))
    }

    async fn update_reply(&self, id: &CommentId, body: &str) -> Result<Comment, FeedError> {
        self.edit(id, body, true)
    }

    async fn delete_reply(&self, id: &CommentId) -> Result<(), FeedError> {
        match self.get(id) {
            Some(entry) if !entry.comment.is_top_level() => {
                self.remove(id);
                Ok(())
            }
            _ => Err(FeedError::EntityNotFound(id.clone())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vote {
    Like,
    Dislike,
}

/// Reaction store kept in memory
#[derive(Debug, Default)]
pub struct InMemoryReactions {
    /// entity -> user -> vote
    votes: DashMap<CommentId, HashMap<String, Vote>>,
}

impl InMemoryReactions {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, entity: &CommentId, user: &str) -> ReactionState {
        let Some(votes) = self.votes.get(entity) else {
            return ReactionState::default();
        };
        let mine = votes.get(user).copied();
        ReactionState {
            is_liked: mine == Some(Vote::Like),
            is_disliked: mine == Some(Vote::Dislike),
            likes: votes.values().filter(|v| **v == Vote::Like).count() as u32,
            dislikes: votes.values().filter(|v| **v == Vote::Dislike).count() as u32,
        }
    }

    fn toggle(&self, entity: &CommentId, user: &str, vote: Vote) -> ReactionState {
        {
            let mut votes = self.votes.entry(entity.clone()).or_default();
            if votes.get(user) == Some(&vote) {
                votes.remove(user);
            } else {
                // Replaces the opposite vote, if any
                votes.insert(user.to_string(), vote);
            }
        }
        self.state(entity, user)
    }
}

#[async_trait]
impl ReactionService for InMemoryReactions {
    async fn reaction(&self, entity: &CommentId, user: &str) -> Result<ReactionState, FeedError> {
        Ok(self.state(entity, user))
    }

    async fn toggle_like(
        &self,
        entity: &CommentId,
        user: &str,
    ) -> Result<ReactionState, FeedError> {
        Ok(self.toggle(entity, user, Vote::Like))
    }

    async fn toggle_dislike(
        &self,
        entity: &CommentId,
        user: &str,
    ) -> Result<ReactionState, FeedError> {
        Ok(self.toggle(entity, user, Vote::Dislike))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> ScopeId {
        ScopeId::new("announcement-1")
    }

    #[tokio::test]
    async fn test_pages_are_newest_first_with_totals() {
        let backend = InMemoryBackend::demo(&scope(), 25, 0);
        let first = backend
            .fetch_comments_page(&scope(), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.items[0].id.as_str(), "c1");
        assert_eq!(first.total_items, 25);
        assert_eq!(first.next_page, Some(2));

        let last = backend
            .fetch_comments_page(&scope(), PageRequest { page: 3, limit: 10 })
            .await
            .unwrap();
        assert_eq!(last.items.len(), 5);
        assert_eq!(last.next_page, None);
    }

    #[tokio::test]
    async fn test_page_far_past_the_end_is_empty() {
        let backend = InMemoryBackend::demo(&scope(), 25, 0);
        let page = backend
            .fetch_comments_page(
                &scope(),
                PageRequest {
                    page: u32::MAX,
                    limit: u32::MAX,
                },
            )
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.page_number, u32::MAX);
        assert_eq!(page.total_items, 25);
        assert_eq!(page.next_page, None);
    }

    #[tokio::test]
    async fn test_replies_update_parent_count() {
        let backend = InMemoryBackend::demo(&scope(), 3, 0);
        let parent = CommentId::new("c2");
        let reply = backend.create_reply(&parent, "member-9", "amen").await.unwrap();
        assert_eq!(reply.parent_id, Some(parent.clone()));
        assert_eq!(backend.fetch_comment_by_id(&parent).await.unwrap().reply_count, 1);

        backend.delete_reply(&reply.id).await.unwrap();
        assert_eq!(backend.fetch_comment_by_id(&parent).await.unwrap().reply_count, 0);
        assert_eq!(
            backend.fetch_comment_by_id(&reply.id).await,
            Err(FeedError::EntityNotFound(reply.id.clone()))
        );
    }

    #[tokio::test]
    async fn test_delete_comment_removes_its_replies() {
        let backend = InMemoryBackend::demo(&scope(), 3, 2);
        assert_eq!(backend.len(), 5);
        backend.delete_comment(&CommentId::new("c3")).await.unwrap();
        assert_eq!(backend.len(), 2);
        // Replies are not deletable as comments
        assert!(backend.delete_comment(&CommentId::new("c3-r1")).await.is_err());
    }

    #[tokio::test]
    async fn test_reactions_are_mutually_exclusive() {
        let reactions = InMemoryReactions::new();
        let entity = CommentId::new("c1");

        let state = reactions.toggle_like(&entity, "ana").await.unwrap();
        assert!(state.is_liked && !state.is_disliked);
        assert_eq!((state.likes, state.dislikes), (1, 0));

        let state = reactions.toggle_dislike(&entity, "ana").await.unwrap();
        assert!(!state.is_liked && state.is_disliked);
        assert_eq!((state.likes, state.dislikes), (0, 1));

        reactions.toggle_like(&entity, "ben").await.unwrap();
        let state = reactions.toggle_dislike(&entity, "ana").await.unwrap();
        assert_eq!(state, ReactionState {
            is_liked: false,
            is_disliked: false,
            likes: 1,
            dislikes: 0,
        });
    }
}
