//! Threadline Core - threaded comment feeds with deep links
//!
//! This crate provides the state behind a paginated comment section:
//! - Page cache with pinning of a deep-linked comment
//! - Deep-link resolution of comment and reply references
//! - Scroll-to-highlight and infinite-scroll state machines
//! - Backend clients (HTTP and in-memory) with retry

pub mod config;
pub mod constants;
pub mod feed;
pub mod source;

// Re-exports for convenience
pub use config::FeedConfig;
pub use feed::{
    Comment, CommentId, ExternalRef, FeedController, FeedError, FeedEvent, FeedHub,
    HighlightStatus, PagedFeed, ScopeId, ScrollIntoView,
};
pub use source::{CommentBackend, HttpBackend, InMemoryBackend, Mutation};
