//! Threaded comment feed
//!
//! - [`model`]: comments, pages, references
//! - [`cache`] / [`pin`]: pure transforms over a [`PagedFeed`]
//! - [`resolver`]: deep link to anchor + highlight
//! - [`highlight`] / [`trigger`]: scroll-to and load-more state machines
//! - [`controller`]: one scope's feed, tying the above together
//! - [`hub`]: controllers keyed by scope

pub mod cache;
pub mod controller;
pub mod error;
pub mod highlight;
pub mod hub;
pub mod model;
pub mod notice;
pub mod pin;
pub mod replies;
pub mod resolver;
pub mod trigger;


pub use controller::{FeedController, FeedEvent};
pub use error::FeedError;
pub use highlight::{HighlightController, HighlightStatus, ScrollBehavior, ScrollIntoView};
pub use hub::FeedHub;
pub use model::{
    AnchorResolution, Comment, CommentId, ExternalRef, LoadStatus, Page, PageRequest, PagedFeed,
    ScopeId,
};
pub use notice::{Notice, NoticeKind, NoticeQueue};
pub use replies::{ReplyThread, ReplyThreads};
pub use resolver::DeepLinkResolver;
pub use trigger::ScrollTrigger;
