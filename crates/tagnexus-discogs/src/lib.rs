// SPDX-License-Identifier: GPL-3.0-or-later

//! Discogs catalog client.
//!
//! Searches Discogs releases by catalog number, artist, track and release
//! title, and hydrates the best hits into full [`CatalogRecord`]s (tracklist,
//! label, catalog number, formats) with built-in rate limiting.
//!
//! [`CatalogRecord`]: tagnexus_domain::CatalogRecord

pub mod client;
pub mod error;
pub mod models;
pub mod rate_limiter;

pub use client::{DiscogsClient, DiscogsClientBuilder};
pub use error::{DiscogsError, Result};
