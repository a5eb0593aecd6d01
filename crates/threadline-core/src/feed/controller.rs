//! Feed controller - one scope's comment feed
//!
//! Owns the natural (unpinned) page cache and publishes pinned snapshots.
//! Every backend call runs as a spawned task that reports back through a
//! settlement channel; the owner applies settlements with `poll()` or
//! `next_settlement().await`, one at a time, so all state changes happen on
//! the owning task.
//!
//! Ordering rules:
//! - results carry the epoch/generation they were issued under and are
//!   dropped when it has moved on (invalidation, new reference)
//! - every natural-feed change is re-pinned before it is published
//! - a resolution that lands before the first page waits for it

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::cache;
use super::error::FeedError;
use super::highlight::{HighlightController, HighlightStatus, ScrollIntoView};
use super::model::{
    AnchorResolution, Comment, CommentId, ExternalRef, LoadStatus, Page, PageRequest, PagedFeed,
    ScopeId,
};
use super::notice::{Notice, NoticeQueue};
use super::pin::pin;
use super::replies::ReplyThreads;
use super::resolver::DeepLinkResolver;
use super::trigger::ScrollTrigger;
use crate::config::FeedConfig;
use crate::source::{CommentBackend, Mutation};

/// Result of a spawned backend call
#[derive(Debug)]
enum Settlement {
    FirstPage {
        epoch: u64,
        result: Result<Page, FeedError>,
    },
    NextPage {
        epoch: u64,
        cursor: u32,
        result: Result<Page, FeedError>,
    },
    Resolution {
        generation: u64,
        reference: ExternalRef,
        result: Result<AnchorResolution, FeedError>,
    },
    Replies {
        parent: CommentId,
        epoch: u64,
        result: Result<Page, FeedError>,
    },
}

/// What applying a settlement changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// A new snapshot went out to subscribers
    Published,
    /// A deep link resolved and is now pinned (or will be, once loaded)
    Resolved(AnchorResolution),
    /// A deep link could not be resolved and was cleared
    ReferenceCleared(FeedError),
    /// A reply thread changed
    RepliesUpdated(CommentId),
    /// A request failed; cached content stays visible
    LoadFailed(FeedError),
    /// A page collided with cached ids and was requested again
    Refetching { cursor: u32 },
    /// A result from a superseded request was dropped
    Discarded(FeedError),
}

/// Page fetch that failed and can be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailedPage {
    First,
    Next(u32),
}

/// Controller for one scope's comment feed
pub struct FeedController {
    scope: ScopeId,
    config: FeedConfig,
    backend: Arc<dyn CommentBackend>,
    resolver: DeepLinkResolver,

    /// Pages exactly as fetched; pinning is applied on publish
    natural: PagedFeed,
    status: LoadStatus,
    snapshot_tx: watch::Sender<Arc<PagedFeed>>,

    reference: Option<ExternalRef>,
    resolution: Option<AnchorResolution>,
    /// Advances on every new or cleared reference
    reference_generation: u64,
    /// Advances on every invalidation of the natural feed
    feed_epoch: u64,

    first_page_in_flight: bool,
    next_page_in_flight: Option<u32>,
    page_refetches: u32,
    failed_page: Option<FailedPage>,
    /// Reference whose resolution failed in transport
    failed_resolution: Option<ExternalRef>,

    trigger: ScrollTrigger,
    highlight: HighlightController,
    replies: ReplyThreads,
    notices: NoticeQueue,

    settle_tx: mpsc::UnboundedSender<Settlement>,
    settle_rx: mpsc::UnboundedReceiver<Settlement>,
    /// Spawned calls whose settlement has not been applied yet
    in_flight: usize,
}

impl FeedController {
    pub fn new(scope: ScopeId, backend: Arc<dyn CommentBackend>, config: FeedConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(PagedFeed::empty(scope.clone())));
        let (settle_tx, settle_rx) = mpsc::unbounded_channel();
        Self {
            natural: PagedFeed::empty(scope.clone()),
            resolver: DeepLinkResolver::new(config.strict_comment_refs),
            highlight: HighlightController::new(config.settle_delay(), config.max_observations),
            replies: ReplyThreads::new(scope.clone(), config.reply_page_size),
            scope,
            config,
            backend,
            status: LoadStatus::Idle,
            snapshot_tx,
            reference: None,
            resolution: None,
            reference_generation: 0,
            feed_epoch: 0,
            first_page_in_flight: false,
            next_page_in_flight: None,
            page_refetches: 0,
            failed_page: None,
            failed_resolution: None,
            trigger: ScrollTrigger::new(),
            notices: NoticeQueue::new(),
            settle_tx,
            settle_rx,
            in_flight: 0,
        }
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    /// Current published snapshot
    pub fn snapshot(&self) -> Arc<PagedFeed> {
        self.snapshot_tx.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<PagedFeed>> {
        self.snapshot_tx.subscribe()
    }

    /// Pages as fetched, without pinning
    pub fn natural_feed(&self) -> &PagedFeed {
        &self.natural
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn reference(&self) -> Option<&ExternalRef> {
        self.reference.as_ref()
    }

    /// Active resolution, if the current reference has resolved
    pub fn anchor(&self) -> Option<&AnchorResolution> {
        self.resolution.as_ref()
    }

    pub fn highlight_state(&self) -> HighlightStatus {
        self.highlight.status()
    }

    pub fn notices(&self) -> &NoticeQueue {
        &self.notices
    }

    pub fn replies(&self) -> &ReplyThreads {
        &self.replies
    }

    /// Whether more pages can be requested
    pub fn has_more(&self) -> bool {
        cache::has_more(&self.natural)
    }

    /// Nothing in flight and nothing loading
    pub fn is_settled(&self) -> bool {
        self.in_flight == 0 && !self.status.is_loading()
    }

    /// Ids a list renderer would show: snapshot items plus expanded replies
    pub fn visible_ids(&self) -> HashSet<CommentId> {
        let snapshot = self.snapshot();
        let mut ids: HashSet<CommentId> = snapshot.items().map(|c| c.id.clone()).collect();
        for comment in snapshot.items() {
            if let Some(thread) = self.replies.get(&comment.id).filter(|t| t.expanded) {
                ids.extend(thread.feed.items().map(|r| r.id.clone()));
            }
        }
        ids
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Fetch the first page if nothing is cached or loading
    pub fn load(&mut self) {
        if self.natural.is_empty() && !self.first_page_in_flight {
            self.spawn_first_page();
        }
    }

    /// Treat cached pages as stale and refetch from page 1
    ///
    /// Cached pages stay published until the new first page replaces them.
    pub fn invalidate(&mut self) {
        self.feed_epoch += 1;
        self.next_page_in_flight = None;
        self.page_refetches = 0;
        debug!(scope = %self.scope, epoch = self.feed_epoch, "Invalidating feed");
        self.spawn_first_page();
    }

    /// Ask for the page after the last cached one
    ///
    /// Returns false when a page fetch is already running or the feed is
    /// exhausted.
    pub fn request_next_page(&mut self) -> bool {
        if self.first_page_in_flight || self.next_page_in_flight.is_some() {
            return false;
        }
        if self.natural.is_empty() {
            self.spawn_first_page();
            return true;
        }
        match cache::next_cursor(&self.natural) {
            Some(cursor) => {
                self.spawn_next_page(cursor);
                true
            }
            None => false,
        }
    }

    /// Sentinel at the end of the list changed visibility
    pub fn on_sentinel_visibility(&mut self, intersecting: bool) -> bool {
        if !self.trigger.on_visibility(intersecting) {
            return false;
        }
        if self.request_next_page() {
            return true;
        }
        self.trigger.finish_fetch(self.has_more());
        false
    }

    /// Re-issue the failed page fetch and the failed deep link, if any
    pub fn retry(&mut self) -> bool {
        let page = self.failed_page.take();
        let resolution = self.failed_resolution.take();
        if page.is_none() && resolution.is_none() {
            return false;
        }

        match page {
            // A reload replaces every cached page, so it restarts the epoch
            Some(FailedPage::First) => {
                info!(scope = %self.scope, "Retrying first page");
                self.invalidate();
            }
            Some(FailedPage::Next(cursor)) => {
                info!(scope = %self.scope, page = cursor, "Retrying next page");
                self.page_refetches = 0;
                self.spawn_next_page(cursor);
            }
            None => {}
        }
        if let Some(reference) = resolution {
            info!(scope = %self.scope, %reference, "Retrying deep link");
            self.reference_generation += 1;
            self.spawn_resolution(reference);
        }
        true
    }

    // =========================================================================
    // Deep links
    // =========================================================================

    /// Set or clear the external reference
    ///
    /// `None` clears it: pinning stops with the next fetched snapshot, the
    /// snapshot on screen is left as it is. A new reference cancels any
    /// in-flight resolution and pending scroll of the previous one. The
    /// current reference again is a no-op unless its resolution failed.
    /// Returns the generation the resolution runs under.
    pub fn resolve_external_reference(&mut self, reference: Option<ExternalRef>) -> u64 {
        if reference.is_some()
            && reference == self.reference
            && self.failed_resolution.is_none()
        {
            return self.reference_generation;
        }

        self.reference_generation += 1;
        self.resolution = None;
        self.highlight.reset();
        self.failed_resolution = None;

        match reference {
            Some(reference) => {
                info!(scope = %self.scope, %reference, "Resolving deep link");
                self.reference = Some(reference.clone());
                self.spawn_resolution(reference);
            }
            None => {
                debug!(scope = %self.scope, "Deep link cleared");
                self.reference = None;
            }
        }
        self.reference_generation
    }

    // =========================================================================
    // Replies
    // =========================================================================

    /// Show the replies of a top-level comment
    pub fn expand_replies(&mut self, parent: &CommentId) {
        if let Some((epoch, request)) = self.replies.expand(parent) {
            self.spawn_replies(parent.clone(), epoch, request);
        }
    }

    pub fn collapse_replies(&mut self, parent: &CommentId) {
        self.replies.collapse(parent);
    }

    /// Next page of an expanded reply thread
    pub fn request_more_replies(&mut self, parent: &CommentId) -> bool {
        match self.replies.next_request(parent) {
            Some((epoch, request)) => {
                self.spawn_replies(parent.clone(), epoch, request);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Write through the backend, then refetch what the write made stale
    pub async fn apply_mutation(
        &mut self,
        mutation: Mutation,
    ) -> Result<Option<Comment>, FeedError> {
        let stale_thread = mutation
            .reply_parent()
            .cloned()
            .or_else(|| mutation.reply_id().and_then(|id| self.replies.parent_of(id)));

        let written = match mutation.apply(&*self.backend, &self.scope).await {
            Ok(written) => written,
            Err(err) => {
                warn!(scope = %self.scope, ?mutation, "Mutation failed: {}", err);
                return Err(err);
            }
        };

        if let (Some(comment), Some(resolution)) = (&written, self.resolution.as_mut()) {
            if comment.id == resolution.anchor.id {
                resolution.anchor = comment.clone();
            }
        }
        if let Mutation::DeleteComment { id } = &mutation {
            if self.resolution.as_ref().is_some_and(|r| &r.anchor.id == id) {
                self.resolve_external_reference(None);
            }
        }

        if let Some(parent) = stale_thread {
            if let Some((epoch, request)) = self.replies.invalidate(&parent) {
                self.spawn_replies(parent, epoch, request);
            }
        }
        self.invalidate();
        Ok(written)
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Record one render of the list
    ///
    /// `rendered` holds the ids that have a node on screen.
    pub fn observe_render(&mut self, rendered: &HashSet<CommentId>, now: Instant) {
        let Some(target) = self.highlight.status().highlight_id else {
            return;
        };
        let settled = self.is_settled();
        self.highlight
            .observe_render(rendered.contains(&target), settled, now);
    }

    /// Advance timers: fires a due scroll and expires notices
    pub fn tick(&mut self, now: Instant) -> Option<ScrollIntoView> {
        self.notices.tick(now);
        self.highlight.tick(now)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.highlight.next_deadline()
    }

    // =========================================================================
    // Settlements
    // =========================================================================

    /// Apply every settlement that is ready, without waiting
    pub fn poll(&mut self) -> Vec<FeedEvent> {
        let mut events = Vec::new();
        while let Ok(settlement) = self.settle_rx.try_recv() {
            events.push(self.apply(settlement));
        }
        events
    }

    /// Wait for the next settlement and apply it
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn next_settlement(&mut self) -> Option<FeedEvent> {
        if self.in_flight == 0 {
            return None;
        }
        let settlement = self.settle_rx.recv().await?;
        Some(self.apply(settlement))
    }

    /// Apply settlements until nothing is in flight
    pub async fn settle(&mut self) -> Vec<FeedEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_settlement().await {
            events.push(event);
        }
        events
    }

    fn apply(&mut self, settlement: Settlement) -> FeedEvent {
        self.in_flight = self.in_flight.saturating_sub(1);
        match settlement {
            Settlement::FirstPage { epoch, result } => self.apply_first_page(epoch, result),
            Settlement::NextPage {
                epoch,
                cursor,
                result,
            } => self.apply_next_page(epoch, cursor, result),
            Settlement::Resolution {
                generation,
                reference,
                result,
            } => self.apply_resolution(generation, reference, result),
            Settlement::Replies {
                parent,
                epoch,
                result,
            } => match self.replies.apply(&parent, epoch, result) {
                Ok(()) => FeedEvent::RepliesUpdated(parent),
                Err(err) if err.is_silent() => discard(&self.scope, err),
                Err(err) => {
                    warn!(scope = %self.scope, %parent, "Failed to load replies: {}", err);
                    self.notices.push(
                        Notice::load_failed("Failed to load replies")
                            .with_ttl(self.config.notice_ttl()),
                    );
                    FeedEvent::LoadFailed(err)
                }
            },
        }
    }

    fn apply_first_page(&mut self, epoch: u64, result: Result<Page, FeedError>) -> FeedEvent {
        if epoch != self.feed_epoch {
            return discard(&self.scope, FeedError::StaleReference(epoch));
        }
        self.first_page_in_flight = false;

        match result {
            Ok(page) => {
                debug!(
                    scope = %self.scope,
                    items = page.items.len(),
                    total = page.total_items,
                    "First page loaded"
                );
                self.natural = cache::replace_first_page(&self.natural, page);
                self.page_refetches = 0;
                self.failed_page = None;
                self.status = LoadStatus::Ready;
                self.trigger.finish_fetch(self.has_more());
                self.publish();
                FeedEvent::Published
            }
            Err(err) => {
                self.trigger.finish_fetch(false);
                self.fail(FailedPage::First, err)
            }
        }
    }

    fn apply_next_page(
        &mut self,
        epoch: u64,
        cursor: u32,
        result: Result<Page, FeedError>,
    ) -> FeedEvent {
        if epoch != self.feed_epoch || self.next_page_in_flight != Some(cursor) {
            return discard(&self.scope, FeedError::StaleReference(epoch));
        }
        self.next_page_in_flight = None;

        // Only the page right after the cached tail may be appended
        if cache::next_cursor(&self.natural) != Some(cursor) {
            if !self.first_page_in_flight {
                self.status = LoadStatus::Ready;
                self.trigger.finish_fetch(self.has_more());
            }
            return discard(&self.scope, FeedError::StaleReference(epoch));
        }

        let appended = result.and_then(|page| {
            if page.page_number != cursor {
                return Err(FeedError::transport(format!(
                    "requested page {cursor}, received page {}",
                    page.page_number
                )));
            }
            cache::append_page(&self.natural, page)
        });
        match appended {
            Ok(feed) => {
                self.natural = feed;
                self.page_refetches = 0;
                self.failed_page = None;
                self.status = LoadStatus::Ready;
                self.trigger.finish_fetch(self.has_more());
                self.publish();
                FeedEvent::Published
            }
            Err(FeedError::DuplicatePage { page, duplicates })
                if self.page_refetches < self.config.max_page_refetches =>
            {
                self.page_refetches += 1;
                warn!(
                    scope = %self.scope,
                    page,
                    duplicates = duplicates.len(),
                    attempt = self.page_refetches,
                    "Page overlaps cached items, fetching it again"
                );
                self.spawn_next_page(cursor);
                FeedEvent::Refetching { cursor }
            }
            Err(err) => {
                self.trigger.finish_fetch(false);
                self.fail(FailedPage::Next(cursor), err)
            }
        }
    }

    fn apply_resolution(
        &mut self,
        generation: u64,
        reference: ExternalRef,
        result: Result<AnchorResolution, FeedError>,
    ) -> FeedEvent {
        if generation != self.reference_generation {
            return discard(&self.scope, FeedError::StaleReference(generation));
        }

        match result {
            Ok(resolution) => {
                info!(
                    scope = %self.scope,
                    anchor = %resolution.anchor.id,
                    highlight = %resolution.highlight_id,
                    "Deep link resolved"
                );
                self.highlight.arm(resolution.highlight_id.clone());
                if resolution.highlight_id != resolution.anchor.id {
                    let parent = resolution.anchor.id.clone();
                    self.resolution = Some(resolution.clone());
                    self.expand_replies(&parent);
                } else {
                    self.resolution = Some(resolution.clone());
                }
                if self.natural.is_empty() {
                    debug!(scope = %self.scope, "Feed not loaded yet, deferring pin");
                } else {
                    self.publish();
                }
                FeedEvent::Resolved(resolution)
            }
            Err(err @ (FeedError::EntityNotFound(_) | FeedError::InvalidReference(_))) => {
                warn!(scope = %self.scope, %reference, "Deep link dropped: {}", err);
                let message = match (&err, &reference) {
                    (FeedError::InvalidReference(_), _) => "This link is not valid",
                    (_, ExternalRef::Reply(_)) => "Reply not found",
                    (_, ExternalRef::Comment(_)) => "Comment not found",
                };
                self.notices
                    .push(Notice::not_found(message).with_ttl(self.config.notice_ttl()));
                self.reference = None;
                self.resolution = None;
                self.highlight.reset();
                self.publish();
                FeedEvent::ReferenceCleared(err)
            }
            Err(err) => {
                warn!(scope = %self.scope, %reference, "Failed to resolve deep link: {}", err);
                self.failed_resolution = Some(reference);
                self.notices.push(
                    Notice::load_failed("Failed to load linked comment")
                        .with_ttl(self.config.notice_ttl()),
                );
                FeedEvent::LoadFailed(err)
            }
        }
    }

    fn fail(&mut self, request: FailedPage, err: FeedError) -> FeedEvent {
        warn!(scope = %self.scope, ?request, "Feed request failed: {}", err);
        self.status = LoadStatus::Failed(err.to_string());
        self.failed_page = Some(request);
        self.notices.push(
            Notice::load_failed("Failed to load comments").with_ttl(self.config.notice_ttl()),
        );
        FeedEvent::LoadFailed(err)
    }

    /// Publish the natural feed, pinned when a resolution is active
    fn publish(&mut self) {
        let view = match self.resolution.as_mut() {
            Some(resolution) if !self.natural.is_empty() => {
                // Prefer the copy from the latest fetch, it may have been edited
                if let Ok(fresh) = cache::find_item(&self.natural, &resolution.anchor.id) {
                    resolution.anchor = fresh.clone();
                }
                pin(&self.natural, &resolution.anchor)
            }
            _ => self.natural.clone(),
        };
        self.snapshot_tx.send_replace(Arc::new(view));
    }

    // =========================================================================
    // Spawning
    // =========================================================================

    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Settlement> + Send + 'static,
    {
        self.in_flight += 1;
        let tx = self.settle_tx.clone();
        tokio::spawn(async move {
            let settlement = task.await;
            let _ = tx.send(settlement);
        });
    }

    fn spawn_first_page(&mut self) {
        self.first_page_in_flight = true;
        self.status = LoadStatus::Loading;
        self.trigger.begin_fetch();

        let epoch = self.feed_epoch;
        let request = PageRequest::first(self.config.page_size);
        let backend = Arc::clone(&self.backend);
        let scope = self.scope.clone();
        debug!(scope = %scope, epoch, "Fetching first page");
        self.spawn(async move {
            let result = backend.fetch_comments_page(&scope, request).await;
            Settlement::FirstPage { epoch, result }
        });
    }

    fn spawn_next_page(&mut self, cursor: u32) {
        self.next_page_in_flight = Some(cursor);
        self.status = LoadStatus::Loading;
        self.trigger.begin_fetch();

        let epoch = self.feed_epoch;
        let request = PageRequest {
            page: cursor,
            limit: self.config.page_size,
        };
        let backend = Arc::clone(&self.backend);
        let scope = self.scope.clone();
        debug!(scope = %scope, epoch, page = cursor, "Fetching next page");
        self.spawn(async move {
            let result = backend.fetch_comments_page(&scope, request).await;
            Settlement::NextPage {
                epoch,
                cursor,
                result,
            }
        });
    }

    fn spawn_resolution(&mut self, reference: ExternalRef) {
        let generation = self.reference_generation;
        let resolver = self.resolver;
        let backend = Arc::clone(&self.backend);
        self.spawn(async move {
            let result = resolver.resolve(&*backend, &reference).await;
            Settlement::Resolution {
                generation,
                reference,
                result,
            }
        });
    }

    fn spawn_replies(&mut self, parent: CommentId, epoch: u64, request: PageRequest) {
        let backend = Arc::clone(&self.backend);
        debug!(scope = %self.scope, %parent, page = request.page, "Fetching replies");
        self.spawn(async move {
            let result = backend.fetch_replies_page(&parent, request).await;
            Settlement::Replies {
                parent,
                epoch,
                result,
            }
        });
    }
}

fn discard(scope: &ScopeId, err: FeedError) -> FeedEvent {
    debug!(scope = %scope, "Discarding result: {}", err);
    FeedEvent::Discarded(err)
}
