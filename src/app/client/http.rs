//! Rate-limited HTTP requests with retry
//!
//! [`HttpHandler`] wraps a `reqwest` client with a `governor` rate limiter
//! and backs off on 429/503 responses and transport errors. Remote sources
//! use it for page lists and for streaming page images.

use std::num::NonZeroU32;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use url::Url;

use crate::constants::limits;
use crate::errors::{SourceError, SourceResult};

use super::config::ClientConfig;

type DirectLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// Downloaded image body
#[derive(Debug, Clone)]
pub struct ImageResponse {
    pub bytes: Bytes,
    /// Value of the `Content-Type` header, if any
    pub content_type: Option<String>,
}

/// HTTP operations handler with rate limiting and backoff
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: DirectLimiter,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client and rate limit
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Other` if `rate_limit_rps` is zero
    pub fn new(client: Client, rate_limit_rps: u32) -> SourceResult<Self> {
        let rate_limiter = Self::build_rate_limiter(rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
            max_retries: limits::MAX_RETRIES,
            retry_base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
        })
    }

    /// Build a handler from configuration
    pub fn from_config(config: &ClientConfig) -> SourceResult<Self> {
        Self::new(config.build_http_client()?, config.rate_limit_rps)
    }

    /// Override the retry policy of [`HttpHandler::get_response`]
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    fn build_rate_limiter(rate_limit_rps: u32) -> SourceResult<DirectLimiter> {
        let rps = NonZeroU32::new(rate_limit_rps)
            .ok_or_else(|| SourceError::Other("Rate limit must be non-zero".to_string()))?;
        Ok(RateLimiter::direct(Quota::per_second(rps)))
    }

    /// Parse a URL, mapping failures to `SourceError::InvalidUrl`
    pub fn parse_url(url: &str) -> SourceResult<Url> {
        Url::parse(url).map_err(|e| SourceError::InvalidUrl {
            url: url.to_string(),
            error: e.to_string(),
        })
    }

    /// One rate-limited request
    ///
    /// 429 maps to `SourceError::RateLimitExceeded` and any other
    /// non-success status to `SourceError::ServerError`.
    pub async fn send_once(&self, url: &Url) -> SourceResult<reqwest::Response> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;

        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status().as_u16();
        if status == 429 {
            return Err(SourceError::RateLimitExceeded);
        }
        if !response.status().is_success() {
            return Err(SourceError::ServerError { status });
        }
        tracing::debug!("Fetched response: {}", url);
        Ok(response)
    }

    /// Fetch a response, retrying 429, 503 and transport failures
    ///
    /// Other non-success statuses are returned without retrying. Once the
    /// retries are spent the result is `SourceError::MaxRetriesExceeded`.
    pub async fn get_response(&self, url: &Url) -> SourceResult<reqwest::Response> {
        let mut retries = 0;
        loop {
            let error = match self.send_once(url).await {
                Ok(response) => return Ok(response),
                Err(e @ SourceError::RateLimitExceeded)
                | Err(e @ SourceError::ServerError { status: 503 })
                | Err(e @ SourceError::Http(_)) => e,
                Err(e) => return Err(e),
            };

            if retries >= self.max_retries {
                tracing::error!("Request to {} failed after {} retries: {}", url, retries, error);
                return Err(SourceError::MaxRetriesExceeded {
                    max_retries: self.max_retries,
                });
            }
            retries += 1;
            let delay = self.backoff(retries);
            tracing::warn!(
                "Request failed (attempt {}/{}): {}. Retrying in {}ms",
                retries,
                self.max_retries,
                error,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Fetch a document as text
    pub async fn get_text(&self, url: &Url) -> SourceResult<String> {
        let response = self.get_response(url).await?;
        Ok(response.text().await?)
    }

    /// Fetch an image in a single attempt, reporting progress as a percentage
    ///
    /// Retrying a failed page is left to the caller, which owns the retry
    /// policy for page downloads.
    pub async fn get_image<F>(&self, url: &Url, mut on_progress: F) -> SourceResult<ImageResponse>
    where
        F: FnMut(u8) + Send,
    {
        let mut response = self.send_once(url).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let total = response.content_length().filter(|len| *len > 0);

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if let Some(total) = total {
                let percent = (body.len() as u64 * 100 / total).min(100) as u8;
                on_progress(percent);
            }
        }
        on_progress(100);

        Ok(ImageResponse {
            bytes: body.freeze(),
            content_type,
        })
    }

    fn backoff(&self, retries: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2_u32.saturating_pow(retries))
    }

    /// Get a reference to the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}
