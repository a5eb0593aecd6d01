//! JSON-over-HTTP backend client
//!
//! Endpoints (relative to the configured base URL):
//! - `GET  announcements/{scope}/comments?page=&limit=`
//! - `POST announcements/{scope}/comments`
//! - `GET|PATCH|DELETE comments/{id}`
//! - `GET|POST comments/{id}/replies`
//! - `PATCH|DELETE replies/{id}`
//! - `GET reactions/{id}?user=`, `POST reactions/{id}/like|dislike`
//!
//! Reads are retried with backoff; writes are sent once.

use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use super::retry::{with_retry, RetryConfig};
use super::{CommentMutations, CommentSource, ReactionService, ReactionState};
use crate::config::HttpConfig;
use crate::feed::{Comment, CommentId, FeedError, Page, PageRequest, ScopeId};

/// HTTP client for the comment backend
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
    retry: RetryConfig,
}

impl HttpBackend {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("invalid backend URL: {}", config.base_url))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("backend URL cannot carry paths: {}", config.base_url);
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base,
            retry: config.retry.to_retry_config(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, FeedError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| FeedError::transport(format!("bad base URL {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn paged(&self, segments: &[&str], request: PageRequest) -> Result<Url, FeedError> {
        let mut url = self.endpoint(segments)?;
        url.query_pairs_mut()
            .append_pair("page", &request.page.to_string())
            .append_pair("limit", &request.limit.to_string());
        Ok(url)
    }

    /// GET with retry; a 404 maps to `EntityNotFound(missing)` when given
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        missing: Option<&CommentId>,
    ) -> Result<T, FeedError> {
        tracing::debug!(%url, "GET");
        with_retry(&self.retry, || {
            let url = url.clone();
            async move {
                let response = self.client.get(url).send().await?;
                decode(response, missing).await
            }
        })
        .await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        missing: Option<&CommentId>,
    ) -> Result<T, FeedError> {
        let response = request.send().await?;
        decode(response, missing).await
    }

    async fn send_empty(
        &self,
        request: reqwest::RequestBuilder,
        missing: &CommentId,
    ) -> Result<(), FeedError> {
        let response = request.send().await?;
        check_status(response, Some(missing)).await.map(|_| ())
    }
}

async fn check_status(
    response: Response,
    missing: Option<&CommentId>,
) -> Result<Response, FeedError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        if let Some(id) = missing {
            return Err(FeedError::EntityNotFound(id.clone()));
        }
    }
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(retry_after);
    let message = response
        .text()
        .await
        .ok()
        .filter(|body| !body.is_empty())
        .unwrap_or_else(|| status.to_string());
    Err(FeedError::Transport {
        status: Some(status.as_u16()),
        message,
        retry_after,
    })
}

/// Retry-After as delta seconds ("120") or an HTTP date
fn retry_after(value: &str) -> Option<Duration> {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = httpdate::parse_http_date(value.trim()).ok()?;
    Some(
        date.duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}

async fn decode<T: DeserializeOwned>(
    response: Response,
    missing: Option<&CommentId>,
) -> Result<T, FeedError> {
    let response = check_status(response, missing).await?;
    Ok(response.json::<T>().await?)
}

#[async_trait]
impl CommentSource for HttpBackend {
    async fn fetch_comments_page(
        &self,
        scope: &ScopeId,
        request: PageRequest,
    ) -> Result<Page, FeedError> {
        let url = self.paged(&["announcements", scope.as_str(), "comments"], request)?;
        self.get_json(url, None).await
    }

    async fn fetch_comment_by_id(&self, id: &CommentId) -> Result<Comment, FeedError> {
        let url = self.endpoint(&["comments", id.as_str()])?;
        self.get_json(url, Some(id)).await
    }

    async fn fetch_replies_page(
        &self,
        parent: &CommentId,
        request: PageRequest,
    ) -> Result<Page, FeedError> {
        let url = self.paged(&["comments", parent.as_str(), "replies"], request)?;
        self.get_json(url, Some(parent)).await
    }
}

#[async_trait]
impl CommentMutations for HttpBackend {
    async fn create_comment(
        &self,
        scope: &ScopeId,
        author_ref: &str,
        body: &str,
    ) -> Result<Comment, FeedError> {
        let url = self.endpoint(&["announcements", scope.as_str(), "comments"])?;
        let request = self
            .client
            .post(url)
            .json(&json!({ "authorRef": author_ref, "body": body }));
        self.send_json(request, None).await
    }

    async fn update_comment(&self, id: &CommentId, body: &str) -> Result<Comment, FeedError> {
        let url = self.endpoint(&["comments", id.as_str()])?;
        let request = self.client.patch(url).json(&json!({ "body": body }));
        self.send_json(request, Some(id)).await
    }

    async fn delete_comment(&self, id: &CommentId) -> Result<(), FeedError> {
        let url = self.endpoint(&["comments", id.as_str()])?;
        self.send_empty(self.client.delete(url), id).await
    }

    async fn create_reply(
        &self,
        parent: &CommentId,
        author_ref: &str,
        body: &str,
    ) -> Result<Comment, FeedError> {
        let url = self.endpoint(&["comments", parent.as_str(), "replies"])?;
        let request = self
            .client
            .post(url)
            .json(&json!({ "authorRef": author_ref, "body": body }));
        self.send_json(request, Some(parent)).await
    }

    async fn update_reply(&self, id: &CommentId, body: &str) -> Result<Comment, FeedError> {
        let url = self.endpoint(&["replies", id.as_str()])?;
        let request = self.client.patch(url).json(&json!({ "body": body }));
        self.send_json(request, Some(id)).await
    }

    async fn delete_reply(&self, id: &CommentId) -> Result<(), FeedError> {
        let url = self.endpoint(&["replies", id.as_str()])?;
        self.send_empty(self.client.delete(url), id).await
    }
}

#[async_trait]
impl ReactionService for HttpBackend {
    async fn reaction(&self, entity: &CommentId, user: &str) -> Result<ReactionState, FeedError> {
        let mut url = self.endpoint(&["reactions", entity.as_str()])?;
        url.query_pairs_mut().append_pair("user", user);
        self.get_json(url, Some(entity)).await
    }

    async fn toggle_like(
        &self,
        entity: &CommentId,
        user: &str,
    ) -> Result<ReactionState, FeedError> {
        let url = self.endpoint(&["reactions", entity.as_str(), "like"])?;
        let request = self.client.post(url).json(&json!({ "userRef": user }));
        self.send_json(request, Some(entity)).await
    }

    async fn toggle_dislike(
        &self,
        entity: &CommentId,
        user: &str,
    ) -> Result<ReactionState, FeedError> {
        let url = self.endpoint(&["reactions", entity.as_str(), "dislike"])?;
        let request = self.client.post(url).json(&json!({ "userRef": user }));
        self.send_json(request, Some(entity)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        HttpBackend::new(&HttpConfig {
            base_url: base.to_string(),
            ..HttpConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoints_keep_base_path() {
        let http = backend("https://parish.example/api/v1");
        let url = http
            .paged(
                &["announcements", "a-42", "comments"],
                PageRequest { page: 2, limit: 10 },
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://parish.example/api/v1/announcements/a-42/comments?page=2&limit=10"
        );
    }

    #[test]
    fn test_ids_are_percent_encoded() {
        let http = backend("https://parish.example/api/");
        let url = http.endpoint(&["comments", "item#18"]).unwrap();
        assert_eq!(url.as_str(), "https://parish.example/api/comments/item%2318");
    }

    #[test]
    fn test_retry_after_forms() {
        assert_eq!(retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(retry_after(" 0 "), Some(Duration::ZERO));
        assert_eq!(retry_after("soon"), None);
        // A date already in the past means retry now
        assert_eq!(
            retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
        let later = httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(90));
        let wait = retry_after(&later).unwrap();
        assert!(wait > Duration::from_secs(80) && wait <= Duration::from_secs(90));
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let result = HttpBackend::new(&HttpConfig {
            base_url: "not a url".to_string(),
            ..HttpConfig::default()
        });
        assert!(result.is_err());
    }
}
