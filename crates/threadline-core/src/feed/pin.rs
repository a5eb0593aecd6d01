//! Pinning transform
//!
//! Moves a deep-linked anchor to the front of the first page. The transform
//! is applied to every snapshot the controller publishes while an anchor is
//! active, so the backend and the page cache never see the pinned order.

use super::model::{Comment, Page, PagedFeed};

/// Make `anchor` the first item of the first page, exactly once
///
/// Every occurrence of the anchor is removed from every page first, so a
/// copy arriving in its natural position (including on pages appended after
/// the pin) never shows twice. `total_items` is left untouched on every page.
pub fn pin(feed: &PagedFeed, anchor: &Comment) -> PagedFeed {
    let mut pages: Vec<Page> = feed
        .pages
        .iter()
        .map(|page| Page {
            items: page
                .items
                .iter()
                .filter(|c| c.id != anchor.id)
                .cloned()
                .collect(),
            ..page.clone()
        })
        .collect();

    if pages.is_empty() {
        pages.push(Page::placeholder());
    }
    pages[0].items.insert(0, anchor.clone());

    PagedFeed {
        scope: feed.scope.clone(),
        pages,
    }
}

/// Whether `feed` already has `anchor` pinned and nowhere else
pub fn is_pinned(feed: &PagedFeed, anchor: &Comment) -> bool {
    let first = feed.pages.first().and_then(|p| p.items.first());
    first.is_some_and(|c| c.id == anchor.id)
        && feed.items().filter(|c| c.id == anchor.id).count() == 1
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::super::cache::fixtures::{comment, feed, ids};
    use super::*;
    use crate::feed::model::ScopeId;

    fn id_counts(f: &PagedFeed) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for id in ids(f) {
            *counts.entry(id).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn test_pin_is_idempotent() {
        for pages in [&[1][..], &[1, 2][..], &[1, 2, 3][..]] {
            for n in [1, 5, 10, 18, 25, 40] {
                let f = feed(pages, 10, 25);
                let anchor = comment(n);
                let once = pin(&f, &anchor);
                assert_eq!(pin(&once, &anchor), once, "pages {pages:?} anchor {n}");
                assert!(is_pinned(&once, &anchor));
            }
        }
    }

    #[test]
    fn test_pin_preserves_totals() {
        let f = feed(&[1, 2, 3], 10, 25);
        for n in [1, 12, 25] {
            let pinned = pin(&f, &comment(n));
            let before: Vec<_> = f.pages.iter().map(|p| p.total_items).collect();
            let after: Vec<_> = pinned.pages.iter().map(|p| p.total_items).collect();
            assert_eq!(before, after);
        }
    }

    #[test]
    fn test_pin_reorders_without_duplication() {
        let f = feed(&[1, 2, 3], 10, 25);
        for n in 1..=25 {
            let pinned = pin(&f, &comment(n));
            assert_eq!(id_counts(&pinned), id_counts(&f), "anchor {n}");
        }
    }

    #[test]
    fn test_pin_absent_anchor_adds_one_copy() {
        let f = feed(&[1], 10, 25);
        let pinned = pin(&f, &comment(18));
        assert_eq!(pinned.pages[0].items.len(), 11);
        assert_eq!(pinned.pages[0].items[0].id.as_str(), "item#18");
        assert_eq!(
            ids(&pinned).iter().filter(|id| *id == "item#18").count(),
            1
        );
    }

    #[test]
    fn test_pin_moves_anchor_out_of_later_page() {
        let f = feed(&[1, 2], 10, 25);
        let pinned = pin(&f, &comment(18));
        assert_eq!(pinned.pages[0].items.len(), 11);
        assert_eq!(pinned.pages[1].items.len(), 9);
        assert!(pinned.pages[1].items.iter().all(|c| c.id.as_str() != "item#18"));
        // Later pages keep natural order
        let second: Vec<_> = pinned.pages[1].items.iter().map(|c| c.id.to_string()).collect();
        assert_eq!(second.first().map(String::as_str), Some("item#11"));
        assert_eq!(second.last().map(String::as_str), Some("item#20"));
    }

    #[test]
    fn test_pin_into_empty_feed_creates_placeholder() {
        let f = PagedFeed::empty(ScopeId::new("announcement-9"));
        let pinned = pin(&f, &comment(3));
        assert_eq!(pinned.pages.len(), 1);
        assert_eq!(pinned.pages[0].total_items, 0);
        assert_eq!(pinned.pages[0].next_page, None);
        assert_eq!(ids(&pinned), vec!["item#3"]);
    }

    #[test]
    fn test_pin_keeps_rest_of_first_page_in_order() {
        let f = feed(&[1], 10, 25);
        let pinned = pin(&f, &comment(4));
        let first: Vec<_> = pinned.pages[0].items.iter().map(|c| c.id.to_string()).collect();
        assert_eq!(
            first,
            vec![
                "item#4", "item#1", "item#2", "item#3", "item#5", "item#6", "item#7", "item#8",
                "item#9", "item#10"
            ]
        );
    }
}
