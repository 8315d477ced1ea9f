// SPDX-License-Identifier: GPL-3.0-or-later

//! Discogs API client: release search plus cached release hydration.

use crate::error::{DiscogsError, Result};
use crate::models::{ReleaseDetailResponse, SearchResponse, SearchResultItem};
use crate::rate_limiter::RateLimiter;
use moka::sync::Cache;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tagnexus_domain::{CatalogQuery, CatalogRecord};
use tracing::{debug, instrument, warn};
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.discogs.com";

/// Discogs catalog client.
pub struct DiscogsClient {
    token: Option<String>,
    client: Client,
    rate_limiter: RateLimiter,
    cache_release: Cache<u64, CatalogRecord>,
    /// Base URL stored without a trailing slash.
    base_url: String,
    results_per_query: usize,
}

impl std::fmt::Debug for DiscogsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscogsClient")
            .field("base_url", &self.base_url)
            .field("results_per_query", &self.results_per_query)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl DiscogsClient {
    /// Creates a client with default limits (one request per second).
    pub fn new(token: Option<String>, base_url: Option<String>) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(token) = token {
            builder = builder.token(token);
        }
        if let Some(base_url) = base_url {
            builder = builder.base_url(base_url);
        }
        builder.build()
    }

    pub fn builder() -> DiscogsClientBuilder {
        DiscogsClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Search releases matching the query and hydrate the best hits into
    /// full records. CD releases come first, then older releases.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn search_releases(&self, query: &CatalogQuery) -> Result<Vec<CatalogRecord>> {
        let search_url = format!("{}/database/search", self.base_url);
        let per_page = self.results_per_query.max(1).to_string();

        let mut params: Vec<(&str, &str)> = vec![("type", "release")];
        if let Some(catno) = query.catalog_number() {
            params.push(("catno", catno));
        }
        if let Some(artist) = query.artist() {
            params.push(("artist", artist));
        }
        if let Some(track) = query.track_title() {
            params.push(("track", track));
        }
        if let Some(release_title) = query.release_title() {
            params.push(("release_title", release_title));
        }
        params.push(("per_page", per_page.as_str()));

        debug!(target: "discogs", url = %search_url, "Searching Discogs releases");
        let search_response = {
            let _permit = self.rate_limiter.acquire().await?;
            self.request(self.client.get(&search_url))
                .query(&params)
                .send()
                .await?
        };
        let search_status = search_response.status();
        let search_body = search_response.text().await?;
        let search_value = parse_discogs_body(search_status, &search_body)?;
        let search: SearchResponse = serde_json::from_value(search_value)?;

        let hits = rank_hits(search.results);
        debug!(target: "discogs", hits = hits.len(), "Discogs search returned");

        let mut records = Vec::new();
        let mut last_error = None;
        for release_id in hits
            .iter()
            .filter_map(|hit| hit.id)
            .take(self.results_per_query.max(1))
        {
            match self.fetch_release(release_id).await {
                Ok(record) => records.push(record),
                Err(DiscogsError::Unauthorized) => return Err(DiscogsError::Unauthorized),
                Err(error) => {
                    warn!(target: "discogs", release_id, %error, "Skipping release that failed to load");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) if records.is_empty() => Err(error),
            _ => Ok(records),
        }
    }

    /// Fetch one release by id. Results are cached for the client lifetime.
    #[instrument(skip(self))]
    pub async fn fetch_release(&self, release_id: u64) -> Result<CatalogRecord> {
        if let Some(cached) = self.cache_release.get(&release_id) {
            return Ok(cached);
        }

        let release_url = format!("{}/releases/{}", self.base_url, release_id);
        debug!(target: "discogs", url = %release_url, "Fetching Discogs release detail");

        let detail_response = {
            let _permit = self.rate_limiter.acquire().await?;
            self.request(self.client.get(&release_url)).send().await?
        };
        let detail_status = detail_response.status();
        let detail_body = detail_response.text().await?;
        let detail_value = parse_discogs_body(detail_status, &detail_body)?;
        let detail: ReleaseDetailResponse = serde_json::from_value(detail_value)?;

        let record = detail.into_record(release_id);
        self.cache_release.insert(release_id, record.clone());
        Ok(record)
    }

    fn request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.as_deref() {
            Some(token) if !token.trim().is_empty() => {
                // Discogs uses its own scheme, not Bearer.
                request.header("Authorization", format!("Discogs token={}", token.trim()))
            }
            _ => request,
        }
    }
}

/// Builder for [`DiscogsClient`].
#[derive(Debug, Clone)]
pub struct DiscogsClientBuilder {
    token: Option<String>,
    base_url: Option<String>,
    max_concurrent_requests: usize,
    min_request_interval: Duration,
    results_per_query: usize,
    timeout: Duration,
}

impl Default for DiscogsClientBuilder {
    fn default() -> Self {
        Self {
            token: None,
            base_url: None,
            max_concurrent_requests: 1,
            min_request_interval: Duration::from_secs(1),
            results_per_query: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DiscogsClientBuilder {
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    pub fn min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    pub fn results_per_query(mut self, count: usize) -> Self {
        self.results_per_query = count;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<DiscogsClient> {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Url::parse(&base_url).map_err(|error| DiscogsError::InvalidUrl(format!("{base_url}: {error}")))?;

        let client = Client::builder()
            .user_agent(concat!("tagnexus/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .build()?;

        debug!(target: "discogs", base_url = %base_url, "Initialized Discogs client");

        Ok(DiscogsClient {
            token: self.token.filter(|token| !token.trim().is_empty()),
            client,
            rate_limiter: RateLimiter::new(self.max_concurrent_requests, self.min_request_interval),
            cache_release: Cache::new(10_000),
            base_url,
            results_per_query: self.results_per_query.max(1),
        })
    }
}

/// CD releases first, then by year with unknown years last.
fn rank_hits(mut hits: Vec<SearchResultItem>) -> Vec<SearchResultItem> {
    hits.sort_by_key(|hit| (!hit.is_cd(), hit.year().unwrap_or(u16::MAX)));
    hits
}

fn parse_discogs_body(status: StatusCode, response_body: &str) -> Result<Value> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(DiscogsError::Unauthorized);
    }

    if !status.is_success() {
        return Err(DiscogsError::HttpStatus {
            status,
            body: response_body.to_string(),
        });
    }

    let value: Value = serde_json::from_str(response_body)?;
    if let Some(message) = value.get("message").and_then(|message| message.as_str()) {
        return Err(DiscogsError::Api {
            message: message.to_string(),
        });
    }

    Ok(value)
}
