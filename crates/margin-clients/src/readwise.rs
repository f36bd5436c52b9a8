//! Readwise v2 export client.
//!
//! Cursor-paginated fetching of highlights and books. Every request passes
//! through the client's [`RateLimiter`] and is bounded by the caller's
//! [`Deadline`].

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use margin_core::defaults::{
    HTTP_TIMEOUT_SECS, MAX_DATE_RANGE_HIGHLIGHTS, MAX_FETCH_PAGES, PAGE_SIZE, READWISE_BASE_URL,
    READWISE_REQUESTS_PER_WINDOW,
};
use margin_core::{
    Book, DateRange, Deadline, Error, FetchProgress, FetchProgressFn, Highlight, Result,
};

use crate::provider_error::extract_message;
use crate::rate_limit::RateLimiter;

const PROVIDER: &str = "Readwise";

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// Readwise API client owning its own rate limiter.
pub struct ReadwiseClient {
    client: Client,
    base_url: String,
    token: String,
    limiter: RateLimiter,
}

impl ReadwiseClient {
    /// Client against the public Readwise API.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, READWISE_BASE_URL)
    }

    /// Client against a custom base URL (tests, proxies).
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            limiter: RateLimiter::per_minute(READWISE_REQUESTS_PER_WINDOW),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the token is accepted. Transport failures count as `false`.
    #[instrument(skip(self), fields(subsystem = "clients", component = "readwise", op = "test_connection"))]
    pub async fn test_connection(&self) -> bool {
        self.limiter.acquire().await;

        let response = self
            .client
            .get(format!("{}/highlights/", self.base_url))
            .query(&[("page_size", "1")])
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().as_u16() == 200 => {
                info!("Readwise connection check passed");
                true
            }
            Ok(resp) => {
                warn!(status = resp.status().as_u16(), "Readwise connection check failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "Readwise connection check error");
                false
            }
        }
    }

    /// Fetch highlights page by page, up to the page ceiling.
    ///
    /// Progress is reported after every page. On failure the error is reported
    /// through `progress` and returned; partially fetched items are discarded.
    #[instrument(skip(self, progress, deadline), fields(subsystem = "clients", component = "readwise", op = "fetch_all_highlights"))]
    pub async fn fetch_all_highlights(
        &self,
        progress: Option<&FetchProgressFn<'_>>,
        updated_after: Option<&str>,
        deadline: &Deadline,
    ) -> Result<Vec<Highlight>> {
        let start = Instant::now();
        let ceiling = MAX_FETCH_PAGES * PAGE_SIZE;
        let mut seen = (0usize, 0usize);

        let result = self
            .collect_pages::<Highlight, _>(
                self.highlights_url(updated_after),
                Some(MAX_FETCH_PAGES),
                deadline,
                |count, current| {
                    let total = count.min(ceiling);
                    seen = (total, current);
                    emit(progress, FetchProgress::in_progress(total, current));
                },
            )
            .await;

        match result {
            Ok(highlights) => {
                let fetched = highlights.len();
                emit(progress, FetchProgress::complete(seen.0.max(fetched), fetched));
                info!(
                    result_count = fetched,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Fetched highlights"
                );
                Ok(highlights)
            }
            Err(e) => {
                emit(progress, FetchProgress::failed(seen.0, seen.1, failure_message(&e)));
                Err(e)
            }
        }
    }

    /// Fetch highlights captured within `range`, capped at the per-session limit.
    ///
    /// Pages are read up to the usual ceiling, then filtered by
    /// `highlighted_at` (missing or malformed dates are excluded) and truncated.
    #[instrument(skip(self, progress, deadline), fields(subsystem = "clients", component = "readwise", op = "fetch_highlights_by_date_range", start = %range.start, end = %range.end))]
    pub async fn fetch_highlights_by_date_range(
        &self,
        range: DateRange,
        progress: Option<&FetchProgressFn<'_>>,
        deadline: &Deadline,
    ) -> Result<Vec<Highlight>> {
        emit(progress, FetchProgress::in_progress(0, 0));

        let result = self
            .collect_pages::<Highlight, _>(
                self.highlights_url(None),
                Some(MAX_FETCH_PAGES),
                deadline,
                |_, _| {},
            )
            .await;

        match result {
            Ok(all) => {
                let scanned = all.len();
                let filtered = filter_by_range(all, &range);
                debug!(scanned, kept = filtered.len(), "Filtered highlights by date range");
                emit(progress, FetchProgress::complete(filtered.len(), filtered.len()));
                Ok(filtered)
            }
            Err(e) => {
                emit(progress, FetchProgress::failed(0, 0, failure_message(&e)));
                Err(e)
            }
        }
    }

    /// Fetch every book, following the cursor until exhausted.
    #[instrument(skip(self, deadline), fields(subsystem = "clients", component = "readwise", op = "fetch_books"))]
    pub async fn fetch_books(&self, deadline: &Deadline) -> Result<Vec<Book>> {
        let url = format!("{}/books/?page_size={}", self.base_url, PAGE_SIZE);
        let books = self
            .collect_pages::<Book, _>(url, None, deadline, |_, _| {})
            .await?;
        info!(result_count = books.len(), "Fetched books");
        Ok(books)
    }

    fn highlights_url(&self, updated_after: Option<&str>) -> String {
        let mut url = format!("{}/highlights/?page_size={}", self.base_url, PAGE_SIZE);
        if let Some(after) = updated_after.filter(|s| !s.is_empty()) {
            url.push_str("&updated__gt=");
            url.push_str(&urlencoding::encode(after));
        }
        url
    }

    /// Follow `next` links from `first_url`, calling `on_page(count, fetched)`
    /// after each page.
    async fn collect_pages<T, F>(
        &self,
        first_url: String,
        max_pages: Option<usize>,
        deadline: &Deadline,
        mut on_page: F,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        F: FnMut(usize, usize),
    {
        let mut items: Vec<T> = Vec::new();
        let mut next = Some(first_url);
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            if max_pages.is_some_and(|max| pages >= max) {
                debug!(pages, "Page ceiling reached");
                break;
            }

            deadline.check("Readwise fetch")?;
            let page: Page<T> = deadline
                .run("Readwise fetch", self.get_page(&url))
                .await?;
            pages += 1;

            debug!(page = pages, result_count = page.results.len(), "Fetched page");

            items.extend(page.results);
            on_page(page.count, items.len());
            next = page.next.filter(|n| !n.is_empty());
        }

        Ok(items)
    }

    async fn get_page<T: DeserializeOwned>(&self, url: &str) -> Result<Page<T>> {
        self.limiter.acquire().await;

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .await
            .map_err(|e| Error::Request(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: PROVIDER,
                status,
                message: extract_message(&body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)))
    }
}

fn emit(progress: Option<&FetchProgressFn<'_>>, update: FetchProgress) {
    if let Some(cb) = progress {
        cb(update);
    }
}

/// Message shown in progress records. Provider failures show the provider's
/// own message.
fn failure_message(err: &Error) -> String {
    match err {
        Error::Provider { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

fn filter_by_range(highlights: Vec<Highlight>, range: &DateRange) -> Vec<Highlight> {
    highlights
        .into_iter()
        .filter(|h| h.highlighted_at_utc().is_some_and(|at| range.contains(at)))
        .take(MAX_DATE_RANGE_HIGHLIGHTS)
        .collect()
}
