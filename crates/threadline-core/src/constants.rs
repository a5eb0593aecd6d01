//! Application constants and configuration defaults
//!
//! Centralized location for magic numbers and default values

use std::time::Duration;

/// HTTP client configuration
pub mod http {
    use super::*;

    /// Connection timeout for backend requests
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Whole-request timeout for backend requests
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Backend used when neither config nor CLI names one
    pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";
}

/// Comment feed behaviour
pub mod feed {
    use super::*;

    /// Top-level comments per page
    pub const PAGE_SIZE: u32 = 10;

    /// Replies per page when a thread is expanded
    pub const REPLY_PAGE_SIZE: u32 = 5;

    /// Wait between the highlighted node appearing and the scroll, so layout settles
    pub const SETTLE_DELAY: Duration = Duration::from_millis(150);

    /// Renders without the highlighted node before the highlight goes dormant
    pub const MAX_OBSERVATIONS: u32 = 20;

    /// Re-fetches of a page that collided with cached ids before giving up
    pub const MAX_PAGE_REFETCHES: u32 = 2;

    /// How long a notice stays visible
    pub const NOTICE_TTL: Duration = Duration::from_secs(5);

    /// Maximum number of visible notices
    pub const MAX_VISIBLE_NOTICES: usize = 3;
}

/// Config file locations
pub mod config {
    /// Config directory name
    pub const CONFIG_DIR_NAME: &str = ".threadline";

    /// Config file name inside the config directory
    pub const CONFIG_FILE_NAME: &str = "config.toml";
}
