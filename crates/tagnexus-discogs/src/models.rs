// SPDX-License-Identifier: GPL-3.0-or-later

//! Discogs wire types and their conversion into catalog records.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tagnexus_domain::{CatalogRecord, CatalogTrack};

lazy_static! {
    // Discogs disambiguates homonymous artists as "Name (2)".
    static ref ARTIST_SUFFIX: Regex = Regex::new(r"\s*\(\d+\)$").expect("artist suffix regex is valid");
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResultItem>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct SearchResultItem {
    pub id: Option<u64>,
    /// Search hits carry the year as a string, release details as a number.
    #[serde(default)]
    pub year: Option<Value>,
    #[serde(default)]
    pub format: Option<Vec<String>>,
}

impl SearchResultItem {
    pub fn is_cd(&self) -> bool {
        self.format
            .as_ref()
            .map(|formats| formats.iter().any(|name| name.to_lowercase().contains("cd")))
            .unwrap_or(false)
    }

    pub fn year(&self) -> Option<u16> {
        self.year.as_ref().and_then(parse_year)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReleaseDetailResponse {
    pub id: Option<u64>,
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<Value>,
    #[serde(default)]
    pub artists: Option<Vec<DiscogsArtistRef>>,
    #[serde(default)]
    pub labels: Option<Vec<DiscogsLabelRef>>,
    #[serde(default)]
    pub formats: Option<Vec<DiscogsFormatRef>>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
    #[serde(default)]
    pub styles: Option<Vec<String>>,
    #[serde(default)]
    pub tracklist: Vec<DiscogsTrack>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct DiscogsArtistRef {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct DiscogsLabelRef {
    pub name: Option<String>,
    pub catno: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct DiscogsFormatRef {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct DiscogsTrack {
    #[serde(default)]
    pub position: String,
    #[serde(rename = "type_", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub artists: Option<Vec<DiscogsArtistRef>>,
}

impl ReleaseDetailResponse {
    pub fn into_record(self, release_id: u64) -> CatalogRecord {
        let artist = join_artists(self.artists.as_deref()).unwrap_or_default();
        let title = self
            .title
            .map(|title| strip_artist_prefix(&title, &artist))
            .unwrap_or_default();

        let first_label = self.labels.as_ref().and_then(|labels| labels.first());
        let label = first_label
            .and_then(|label| label.name.as_deref())
            .map(clean_artist_name)
            .filter(|name| !name.is_empty());
        let catalog_number = first_label
            .and_then(|label| label.catno.as_deref())
            .map(str::trim)
            .filter(|catno| !catno.is_empty() && !catno.eq_ignore_ascii_case("none"))
            .map(str::to_string);

        let tracks = self
            .tracklist
            .into_iter()
            .filter(|track| {
                track
                    .kind
                    .as_deref()
                    .map(|kind| kind.eq_ignore_ascii_case("track"))
                    .unwrap_or(true)
            })
            .map(|track| CatalogTrack {
                artist: join_artists(track.artists.as_deref()),
                duration_seconds: track.duration.as_deref().and_then(parse_duration),
                position: track.position.trim().to_string(),
                title: track.title.trim().to_string(),
            })
            .collect();

        CatalogRecord {
            release_id: self.id.or(Some(release_id)),
            title,
            artist,
            catalog_number,
            label,
            year: self.year.as_ref().and_then(parse_year),
            formats: self
                .formats
                .unwrap_or_default()
                .into_iter()
                .filter_map(|format| format.name)
                .collect(),
            genres: self.genres.unwrap_or_default(),
            styles: self.styles.unwrap_or_default(),
            tracks,
        }
    }
}

/// Remove the Discogs disambiguation suffix from an artist name.
pub fn clean_artist_name(name: &str) -> String {
    ARTIST_SUFFIX.replace(name.trim(), "").to_string()
}

fn join_artists(artists: Option<&[DiscogsArtistRef]>) -> Option<String> {
    let names: Vec<String> = artists?
        .iter()
        .filter_map(|artist| artist.name.as_deref())
        .map(clean_artist_name)
        .filter(|name| !name.is_empty())
        .collect();
    (!names.is_empty()).then(|| names.join(", "))
}

/// Drop a redundant "Artist - " prefix from a release title.
pub fn strip_artist_prefix(title: &str, artist: &str) -> String {
    let title = title.trim();
    if artist.is_empty() {
        return title.to_string();
    }

    let pattern = format!(r"(?i)^{}\s*[-:]\s*", regex::escape(artist));
    match Regex::new(&pattern) {
        Ok(prefix) => {
            let stripped = prefix.replace(title, "");
            if stripped.trim().is_empty() {
                title.to_string()
            } else {
                stripped.trim().to_string()
            }
        }
        Err(_) => title.to_string(),
    }
}

/// Parse "m:ss" or "h:mm:ss". Blank or malformed durations are unknown.
pub fn parse_duration(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let mut seconds = 0u64;
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    for part in parts {
        let part: u64 = part.trim().parse().ok()?;
        seconds = seconds * 60 + part;
    }
    Some(seconds as f64)
}

fn parse_year(value: &Value) -> Option<u16> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|year| u16::try_from(year).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
    .filter(|year| *year > 0)
}
