// SPDX-License-Identifier: GPL-3.0-or-later

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiscogsError>;

/// Error type returned by the Discogs API client.
#[derive(Debug, Error)]
pub enum DiscogsError {
    /// An error occurred while performing the HTTP request (network or protocol failure).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Discogs rejected the configured token.
    #[error("Discogs API token is invalid or has expired")]
    Unauthorized,
    /// Discogs responded with a non-success HTTP status code.
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
    /// Discogs returned a JSON payload with a `message` field indicating an API-level error.
    #[error("Discogs API error: {message}")]
    Api { message: String },
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// The internal rate-limiter semaphore was closed.
    #[error("Rate limiter closed")]
    RateLimiterClosed,
}
