//! Transient notices for the feed
//!
//! Short-lived messages such as "content not found" when a deep link points
//! at a deleted comment. Duplicates are dropped and old notices expire.

use std::time::{Duration, Instant};

use crate::constants;

/// Kind of notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Deep-linked content no longer exists
    NotFound,
    /// A fetch failed; cached content is still shown
    LoadFailed,
}

/// A notice shown to the user
#[derive(Debug, Clone)]
pub struct Notice {
    pub message: String,
    pub kind: NoticeKind,
    pub ttl: Duration,
    pub created_at: Instant,
}

impl Notice {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message, NoticeKind::NotFound)
    }

    pub fn load_failed(message: impl Into<String>) -> Self {
        Self::new(message, NoticeKind::LoadFailed)
    }

    fn new(message: impl Into<String>, kind: NoticeKind) -> Self {
        Self {
            message: message.into(),
            kind,
            ttl: constants::feed::NOTICE_TTL,
            created_at: Instant::now(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

/// Queue of notices
#[derive(Debug, Default)]
pub struct NoticeQueue {
    notices: Vec<Notice>,
}

impl NoticeQueue {
    pub fn new() -> Self {
        Self {
            notices: Vec::new(),
        }
    }

    /// Add a notice, ignoring repeats of a message already showing
    pub fn push(&mut self, notice: Notice) {
        if self.notices.iter().any(|n| n.message == notice.message) {
            return;
        }
        while self.notices.len() >= constants::feed::MAX_VISIBLE_NOTICES {
            self.notices.remove(0);
        }
        self.notices.push(notice);
    }

    /// Remove expired notices, returns true if any were removed
    pub fn tick(&mut self, now: Instant) -> bool {
        let before = self.notices.len();
        self.notices.retain(|n| !n.is_expired_at(now));
        self.notices.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }

    /// Visible notices, most recent first
    pub fn visible(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter().rev()
    }

    pub fn contains_kind(&self, kind: NoticeKind) -> bool {
        self.notices.iter().any(|n| n.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_are_dropped() {
        let mut queue = NoticeQueue::new();
        queue.push(Notice::not_found("Comment not found"));
        queue.push(Notice::not_found("Comment not found"));
        assert_eq!(queue.visible().count(), 1);
        assert!(queue.contains_kind(NoticeKind::NotFound));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut queue = NoticeQueue::new();
        for i in 0..5 {
            queue.push(Notice::load_failed(format!("failure {i}")));
        }
        let messages: Vec<_> = queue.visible().map(|n| n.message.clone()).collect();
        assert_eq!(messages, vec!["failure 4", "failure 3", "failure 2"]);
    }

    #[test]
    fn test_tick_expires() {
        let mut queue = NoticeQueue::new();
        let notice = Notice::not_found("gone").with_ttl(Duration::from_millis(10));
        let created = notice.created_at;
        queue.push(notice);
        assert!(!queue.tick(created));
        assert!(queue.tick(created + Duration::from_millis(10)));
        assert!(queue.is_empty());
    }
}
