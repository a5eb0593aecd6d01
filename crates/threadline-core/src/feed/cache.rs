//! Page cache
//!
//! Pure transforms over an immutable [`PagedFeed`]. Callers never edit a
//! published snapshot: each operation returns a new feed that the controller
//! publishes as a whole, so readers always see a complete page list.

use std::collections::HashSet;

use super::error::FeedError;
use super::model::{Comment, CommentId, Page, PagedFeed};

/// Append `page` after the pages already cached
///
/// Fails with [`FeedError::DuplicatePage`] when any of the page's ids is
/// already present. That only happens when a fetch raced an invalidation or
/// the backend listing shifted under the cursor.
pub fn append_page(feed: &PagedFeed, page: Page) -> Result<PagedFeed, FeedError> {
    let cached = item_ids(feed);
    let duplicates: Vec<CommentId> = page
        .items
        .iter()
        .filter(|c| cached.contains(&c.id))
        .map(|c| c.id.clone())
        .collect();

    if !duplicates.is_empty() {
        tracing::debug!(
            scope = %feed.scope,
            page = page.page_number,
            duplicates = duplicates.len(),
            "Rejecting page with cached ids"
        );
        return Err(FeedError::DuplicatePage {
            page: page.page_number,
            duplicates,
        });
    }

    let mut next = feed.clone();
    next.pages.push(page);
    Ok(next)
}

/// Discard every cached page and start over from `page`
///
/// Later pages have to be fetched again by the scroll trigger.
pub fn replace_first_page(feed: &PagedFeed, page: Page) -> PagedFeed {
    PagedFeed {
        scope: feed.scope.clone(),
        pages: vec![page],
    }
}

/// Find a comment anywhere in the feed
pub fn find_item<'a>(feed: &'a PagedFeed, id: &CommentId) -> Result<&'a Comment, FeedError> {
    feed.items()
        .find(|c| &c.id == id)
        .ok_or_else(|| FeedError::EntityNotFound(id.clone()))
}

/// Ids of every cached item
pub fn item_ids(feed: &PagedFeed) -> HashSet<CommentId> {
    feed.items().map(|c| c.id.clone()).collect()
}

/// Cursor for the page after the last cached one
///
/// An empty feed starts at page 1.
pub fn next_cursor(feed: &PagedFeed) -> Option<u32> {
    match feed.pages.last() {
        Some(page) => page.next_page,
        None => Some(1),
    }
}

/// Whether another page can be requested
pub fn has_more(feed: &PagedFeed) -> bool {
    !feed.pages.is_empty() && next_cursor(feed).is_some()
}

/// Reported total for the scope, from the most recent page
pub fn total_items(feed: &PagedFeed) -> u32 {
    feed.pages.last().map(|p| p.total_items).unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{Duration, TimeZone, Utc};

    use super::super::model::{Comment, CommentId, Page, PagedFeed, ScopeId};

    /// Top-level comment `item#n`, newer for smaller `n`
    pub fn comment(n: u32) -> Comment {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        Comment {
            id: CommentId::new(format!("item#{n}")),
            parent_id: None,
            author_ref: format!("member-{}", n % 4),
            body: format!("comment {n}"),
            created_at: base - Duration::minutes(n as i64),
            edited: false,
            reply_count: 0,
        }
    }

    pub fn reply(id: &str, parent: &str) -> Comment {
        Comment {
            id: CommentId::new(id),
            parent_id: Some(CommentId::new(parent)),
            author_ref: "member-r".to_string(),
            body: format!("reply {id}"),
            created_at: Utc.with_ymd_and_hms(2024, 6, 2, 8, 0, 0).unwrap(),
            edited: false,
            reply_count: 0,
        }
    }

    /// Page `number` of a scope with `total` comments numbered from 1
    pub fn page(number: u32, size: u32, total: u32) -> Page {
        let start = (number - 1) * size + 1;
        let end = (start + size - 1).min(total);
        Page {
            items: (start..=end).map(comment).collect(),
            total_items: total,
            page_number: number,
            next_page: if end < total { Some(number + 1) } else { None },
        }
    }

    pub fn feed(pages: &[u32], size: u32, total: u32) -> PagedFeed {
        PagedFeed {
            scope: ScopeId::new("announcement-1"),
            pages: pages.iter().map(|n| page(*n, size, total)).collect(),
        }
    }

    pub fn ids(feed: &PagedFeed) -> Vec<String> {
        feed.items().map(|c| c.id.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{feed, page};
    use super::*;
    use crate::feed::model::ScopeId;

    #[test]
    fn test_append_page_extends_in_order() {
        let f = feed(&[1], 10, 25);
        let f = append_page(&f, page(2, 10, 25)).unwrap();
        assert_eq!(f.pages.len(), 2);
        assert_eq!(f.pages[1].items[0].id.as_str(), "item#11");
        assert_eq!(next_cursor(&f), Some(3));
        assert!(has_more(&f));
    }

    #[test]
    fn test_append_page_rejects_overlap() {
        let f = feed(&[1, 2], 10, 25);
        let err = append_page(&f, page(2, 10, 25)).unwrap_err();
        match err {
            FeedError::DuplicatePage { page, duplicates } => {
                assert_eq!(page, 2);
                assert_eq!(duplicates.len(), 10);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Input snapshot untouched
        assert_eq!(f.pages.len(), 2);
    }

    #[test]
    fn test_replace_first_page_drops_everything_else() {
        let f = feed(&[1, 2, 3], 10, 25);
        let mut fresh = page(1, 10, 26);
        fresh.items.insert(0, super::fixtures::comment(0));
        fresh.items.pop();
        let f = replace_first_page(&f, fresh);
        assert_eq!(f.pages.len(), 1);
        assert_eq!(total_items(&f), 26);
        assert_eq!(f.pages[0].items[0].id.as_str(), "item#0");
    }

    #[test]
    fn test_find_item() {
        let f = feed(&[1, 2], 10, 25);
        assert_eq!(
            find_item(&f, &CommentId::new("item#14")).unwrap().body,
            "comment 14"
        );
        assert_eq!(
            find_item(&f, &CommentId::new("item#24")),
            Err(FeedError::EntityNotFound(CommentId::new("item#24")))
        );
    }

    #[test]
    fn test_cursor_on_empty_and_exhausted_feeds() {
        let empty = PagedFeed::empty(ScopeId::new("a"));
        assert_eq!(next_cursor(&empty), Some(1));
        assert!(!has_more(&empty));
        assert_eq!(total_items(&empty), 0);

        let full = feed(&[1, 2, 3], 10, 25);
        assert_eq!(next_cursor(&full), None);
        assert!(!has_more(&full));
    }
}
