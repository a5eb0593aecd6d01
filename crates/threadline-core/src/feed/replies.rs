//! Reply threads
//!
//! Paged replies under expanded top-level comments. Each thread is a small
//! [`PagedFeed`] driven by the same cache transforms as the main feed, with
//! its own epoch so a refetch after a reply mutation discards older pages
//! still in flight.

use std::collections::HashMap;

use super::cache;
use super::error::FeedError;
use super::model::{CommentId, LoadStatus, Page, PageRequest, PagedFeed, ScopeId};

/// Replies of one top-level comment
#[derive(Debug, Clone)]
pub struct ReplyThread {
    pub feed: PagedFeed,
    pub status: LoadStatus,
    pub expanded: bool,
    epoch: u64,
}

impl ReplyThread {
    pub fn is_loading(&self) -> bool {
        self.status.is_loading()
    }
}

/// All reply threads of one scope
#[derive(Debug, Clone)]
pub struct ReplyThreads {
    scope: ScopeId,
    page_size: u32,
    threads: HashMap<CommentId, ReplyThread>,
}

impl ReplyThreads {
    pub fn new(scope: ScopeId, page_size: u32) -> Self {
        Self {
            scope,
            page_size,
            threads: HashMap::new(),
        }
    }

    pub fn get(&self, parent: &CommentId) -> Option<&ReplyThread> {
        self.threads.get(parent)
    }

    /// Show a thread; returns the request to issue when nothing is cached yet
    pub fn expand(&mut self, parent: &CommentId) -> Option<(u64, PageRequest)> {
        let page_size = self.page_size;
        let scope = self.scope.clone();
        let thread = self
            .threads
            .entry(parent.clone())
            .or_insert_with(|| ReplyThread {
                feed: PagedFeed::empty(scope),
                status: LoadStatus::Idle,
                expanded: false,
                epoch: 0,
            });
        thread.expanded = true;
        if thread.feed.is_empty() && !thread.is_loading() {
            thread.status = LoadStatus::Loading;
            return Some((thread.epoch, PageRequest::first(page_size)));
        }
        None
    }

    /// Hide a thread, keeping what was fetched
    pub fn collapse(&mut self, parent: &CommentId) {
        if let Some(thread) = self.threads.get_mut(parent) {
            thread.expanded = false;
        }
    }

    /// Next page of an expanded thread, if there is one and nothing is loading
    pub fn next_request(&mut self, parent: &CommentId) -> Option<(u64, PageRequest)> {
        let page_size = self.page_size;
        let thread = self.threads.get_mut(parent)?;
        if !thread.expanded || thread.is_loading() || !cache::has_more(&thread.feed) {
            return None;
        }
        let page = cache::next_cursor(&thread.feed)?;
        thread.status = LoadStatus::Loading;
        Some((
            thread.epoch,
            PageRequest {
                page,
                limit: page_size,
            },
        ))
    }

    /// Mark a thread stale; returns the first-page request when it is shown
    pub fn invalidate(&mut self, parent: &CommentId) -> Option<(u64, PageRequest)> {
        let page_size = self.page_size;
        let thread = self.threads.get_mut(parent)?;
        thread.epoch += 1;
        if !thread.expanded {
            // Refetched on next expand
            thread.feed.pages.clear();
            thread.status = LoadStatus::Idle;
            return None;
        }
        thread.status = LoadStatus::Loading;
        Some((thread.epoch, PageRequest::first(page_size)))
    }

    /// Apply a settled fetch
    ///
    /// Results from an older epoch are rejected as stale. A page 1 replaces
    /// the thread, later pages append.
    pub fn apply(
        &mut self,
        parent: &CommentId,
        epoch: u64,
        result: Result<Page, FeedError>,
    ) -> Result<(), FeedError> {
        let Some(thread) = self.threads.get_mut(parent) else {
            return Err(FeedError::StaleReference(epoch));
        };
        if thread.epoch != epoch {
            return Err(FeedError::StaleReference(epoch));
        }
        match result {
            Ok(page) if page.page_number <= 1 => {
                thread.feed = cache::replace_first_page(&thread.feed, page);
                thread.status = LoadStatus::Ready;
                Ok(())
            }
            Ok(page) => match cache::append_page(&thread.feed, page) {
                Ok(feed) => {
                    thread.feed = feed;
                    thread.status = LoadStatus::Ready;
                    Ok(())
                }
                Err(err) => {
                    thread.status = LoadStatus::Failed(err.to_string());
                    Err(err)
                }
            },
            Err(err) => {
                thread.status = LoadStatus::Failed(err.to_string());
                Err(err)
            }
        }
    }

    /// Parent of a cached reply
    pub fn parent_of(&self, reply: &CommentId) -> Option<CommentId> {
        self.threads
            .iter()
            .find(|(_, thread)| cache::find_item(&thread.feed, reply).is_ok())
            .map(|(parent, _)| parent.clone())
    }

    /// Whether `id` is a reply currently shown in an expanded thread
    pub fn is_visible(&self, id: &CommentId) -> bool {
        self.threads
            .values()
            .any(|t| t.expanded && cache::find_item(&t.feed, id).is_ok())
    }

    /// Drop every thread (scope reset)
    pub fn clear(&mut self) {
        self.threads.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::cache::fixtures::reply;

    fn reply_page(parent: &str, number: u32, ids: &[&str], total: u32, next: Option<u32>) -> Page {
        Page {
            items: ids.iter().map(|id| reply(id, parent)).collect(),
            total_items: total,
            page_number: number,
            next_page: next,
        }
    }

    fn threads() -> ReplyThreads {
        ReplyThreads::new(ScopeId::new("announcement-1"), 2)
    }

    #[test]
    fn test_expand_loads_once() {
        let mut t = threads();
        let parent = CommentId::new("c3");
        let (epoch, request) = t.expand(&parent).unwrap();
        assert_eq!(request, PageRequest { page: 1, limit: 2 });
        // Second expand while loading issues nothing
        assert!(t.expand(&parent).is_none());

        t.apply(&parent, epoch, Ok(reply_page("c3", 1, &["r1", "r2"], 3, Some(2))))
            .unwrap();
        assert!(t.is_visible(&CommentId::new("r2")));
        assert_eq!(t.parent_of(&CommentId::new("r1")), Some(parent.clone()));

        let (epoch, request) = t.next_request(&parent).unwrap();
        assert_eq!(request.page, 2);
        assert!(t.next_request(&parent).is_none());
        t.apply(&parent, epoch, Ok(reply_page("c3", 2, &["r3"], 3, None)))
            .unwrap();
        assert!(t.next_request(&parent).is_none());
        assert_eq!(t.get(&parent).unwrap().feed.items().count(), 3);
    }

    #[test]
    fn test_invalidate_discards_in_flight_page() {
        let mut t = threads();
        let parent = CommentId::new("c3");
        let (old_epoch, _) = t.expand(&parent).unwrap();
        let (new_epoch, request) = t.invalidate(&parent).unwrap();
        assert_eq!(request.page, 1);

        let stale = t.apply(&parent, old_epoch, Ok(reply_page("c3", 1, &["r1"], 1, None)));
        assert_eq!(stale, Err(FeedError::StaleReference(old_epoch)));
        t.apply(&parent, new_epoch, Ok(reply_page("c3", 1, &["r1", "r9"], 2, None)))
            .unwrap();
        assert_eq!(t.get(&parent).unwrap().feed.items().count(), 2);
    }

    #[test]
    fn test_collapsed_thread_refetches_on_expand_after_invalidate() {
        let mut t = threads();
        let parent = CommentId::new("c3");
        let (epoch, _) = t.expand(&parent).unwrap();
        t.apply(&parent, epoch, Ok(reply_page("c3", 1, &["r1"], 1, None)))
            .unwrap();
        t.collapse(&parent);
        assert!(!t.is_visible(&CommentId::new("r1")));
        assert!(t.invalidate(&parent).is_none());
        assert!(t.expand(&parent).is_some());
    }

    #[test]
    fn test_failed_fetch_is_recorded() {
        let mut t = threads();
        let parent = CommentId::new("c3");
        let (epoch, _) = t.expand(&parent).unwrap();
        let err = FeedError::transport("offline");
        assert_eq!(t.apply(&parent, epoch, Err(err.clone())), Err(err));
        assert!(matches!(
            t.get(&parent).unwrap().status,
            LoadStatus::Failed(_)
        ));
    }
}
