//! Feed hub - controllers keyed by scope
//!
//! One [`FeedController`] per scope, created on first use and loaded
//! immediately. Scopes are independent: a deep link or invalidation in one
//! never touches another.

use std::collections::HashMap;
use std::sync::Arc;

use super::controller::{FeedController, FeedEvent};
use super::highlight::HighlightStatus;
use super::model::{ExternalRef, PagedFeed, ScopeId};
use crate::config::FeedConfig;
use crate::source::CommentBackend;

pub struct FeedHub {
    backend: Arc<dyn CommentBackend>,
    config: FeedConfig,
    feeds: HashMap<ScopeId, FeedController>,
}

impl FeedHub {
    pub fn new(backend: Arc<dyn CommentBackend>, config: FeedConfig) -> Self {
        Self {
            backend,
            config,
            feeds: HashMap::new(),
        }
    }

    /// Controller for `scope`, created and loaded on first use
    pub fn feed(&mut self, scope: &ScopeId) -> &mut FeedController {
        let backend = &self.backend;
        let config = &self.config;
        self.feeds.entry(scope.clone()).or_insert_with(|| {
            tracing::debug!(%scope, "Opening feed");
            let mut controller =
                FeedController::new(scope.clone(), Arc::clone(backend), config.clone());
            controller.load();
            controller
        })
    }

    pub fn get(&self, scope: &ScopeId) -> Option<&FeedController> {
        self.feeds.get(scope)
    }

    /// Current snapshot of `scope`, opening the feed if needed
    pub fn snapshot(&mut self, scope: &ScopeId) -> Arc<PagedFeed> {
        self.feed(scope).snapshot()
    }

    pub fn resolve_external_reference(
        &mut self,
        scope: &ScopeId,
        reference: Option<ExternalRef>,
    ) -> u64 {
        self.feed(scope).resolve_external_reference(reference)
    }

    pub fn request_next_page(&mut self, scope: &ScopeId) -> bool {
        self.feed(scope).request_next_page()
    }

    pub fn highlight_state(&self, scope: &ScopeId) -> HighlightStatus {
        self.feeds
            .get(scope)
            .map(FeedController::highlight_state)
            .unwrap_or_default()
    }

    /// Forget a scope; its in-flight results are dropped with it
    pub fn close(&mut self, scope: &ScopeId) -> bool {
        self.feeds.remove(scope).is_some()
    }

    pub fn scopes(&self) -> impl Iterator<Item = &ScopeId> {
        self.feeds.keys()
    }

    /// Apply ready settlements across every scope
    pub fn poll(&mut self) -> Vec<(ScopeId, FeedEvent)> {
        let mut events = Vec::new();
        for (scope, controller) in &mut self.feeds {
            events.extend(controller.poll().into_iter().map(|e| (scope.clone(), e)));
        }
        events
    }

    /// Wait until every scope has nothing in flight
    pub async fn settle(&mut self) -> Vec<(ScopeId, FeedEvent)> {
        let mut events = Vec::new();
        for (scope, controller) in &mut self.feeds {
            events.extend(
                controller
                    .settle()
                    .await
                    .into_iter()
                    .map(|e| (scope.clone(), e)),
            );
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::model::CommentId;
    use crate::source::InMemoryBackend;

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let a = ScopeId::new("announcement-a");
        let b = ScopeId::new("announcement-b");
        let backend = InMemoryBackend::demo(&a, 12, 0);
        let mut hub = FeedHub::new(Arc::new(backend), FeedConfig::default());

        hub.resolve_external_reference(&a, Some(ExternalRef::Comment(CommentId::new("c11"))));
        hub.feed(&b);
        hub.settle().await;

        let snapshot_a = hub.snapshot(&a);
        assert_eq!(snapshot_a.items().next().unwrap().id.as_str(), "c11");
        assert_eq!(
            hub.highlight_state(&a).highlight_id,
            Some(CommentId::new("c11"))
        );

        let snapshot_b = hub.snapshot(&b);
        assert_eq!(snapshot_b.items().count(), 0);
        assert_eq!(snapshot_b.pages.len(), 1);
        assert_eq!(hub.highlight_state(&b), HighlightStatus::default());
        assert!(!hub.request_next_page(&b));

        assert!(hub.close(&b));
        assert_eq!(hub.scopes().count(), 1);
    }
}
