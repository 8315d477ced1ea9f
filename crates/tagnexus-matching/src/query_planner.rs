// SPDX-License-Identifier: GPL-3.0-or-later

//! Priority-ordered catalog query construction.

use crate::metadata::MergedMetadata;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tagnexus_domain::{CatalogQuery, ParsedFilenameGuess, QueryStrategy, TagMap};
use tracing::trace;

lazy_static! {
    // Bracketed video/upload noise such as "(Official Video)" or "[HQ]".
    static ref BRACKETED_JUNK: Regex = Regex::new(
        r"(?i)[\(\[][^\]\)]*\b(?:official|video|audio|4k|hd|hq|lyrics?|visuali[sz]er|live stream|full set|upload|premiere)\b[^\]\)]*[\)\]]"
    )
    .expect("bracketed junk regex is valid");

    static ref JUNK_PHRASES: Regex = Regex::new(
        r"(?i)\b(?:official music video|official video|official audio|music video|full set|visuali[sz]er|exclusive)\b"
    )
    .expect("junk phrase regex is valid");

    static ref B2B: Regex = Regex::new(r"(?i)\s+b2b\s+").expect("b2b regex is valid");
}

/// Strip upload noise from a search value and collapse whitespace.
pub fn clean_search_text(text: &str) -> String {
    let text = BRACKETED_JUNK.replace_all(text, " ");
    let text = JUNK_PHRASES.replace_all(&text, " ");
    let text = B2B.replace_all(&text, " ");
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '-' || c.is_whitespace())
        .to_string()
}

/// One step of a plan: the strategy and the query it sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedQuery {
    pub strategy: QueryStrategy,
    pub query: CatalogQuery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanKind {
    Track,
    Release,
}

const TRACK_STRATEGIES: &[QueryStrategy] = &[
    QueryStrategy::CatalogNumber,
    QueryStrategy::ArtistTitle,
    QueryStrategy::ArtistRelease,
    QueryStrategy::TitleProbe,
];

const RELEASE_STRATEGIES: &[QueryStrategy] = &[
    QueryStrategy::CatalogNumber,
    QueryStrategy::ArtistRelease,
    QueryStrategy::TitleProbe,
];

/// Lazy, restartable sequence of queries. Cloning yields an independent
/// cursor over the same queries.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    kind: PlanKind,
    artist: Option<String>,
    track_title: Option<String>,
    release_title: Option<String>,
    catalog_number: Option<String>,
    cursor: usize,
}

impl QueryPlan {
    fn new(kind: PlanKind, metadata: &MergedMetadata) -> Self {
        Self {
            kind,
            artist: cleaned(metadata.artist()),
            track_title: cleaned(metadata.title()),
            release_title: cleaned(metadata.album()),
            catalog_number: metadata
                .catalog_number()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            cursor: 0,
        }
    }

    fn strategies(&self) -> &'static [QueryStrategy] {
        match self.kind {
            PlanKind::Track => TRACK_STRATEGIES,
            PlanKind::Release => RELEASE_STRATEGIES,
        }
    }

    /// Build the query for a strategy, if its fields are present.
    fn query_for(&self, strategy: QueryStrategy) -> Option<CatalogQuery> {
        let builder = CatalogQuery::builder();
        match strategy {
            QueryStrategy::CatalogNumber => builder.catalog_number(self.catalog_number.as_deref()?).build(),
            QueryStrategy::ArtistTitle => builder
                .artist(self.artist.as_deref()?)
                .track_title(self.track_title.as_deref()?)
                .build(),
            QueryStrategy::ArtistRelease => builder
                .artist(self.artist.as_deref()?)
                .release_title(self.release_title.as_deref()?)
                .build(),
            QueryStrategy::TitleProbe => match self.kind {
                PlanKind::Track => builder.track_title(self.track_title.as_deref()?).build(),
                PlanKind::Release => builder.release_title(self.release_title.as_deref()?).build(),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clone().next().is_none()
    }
}

impl Iterator for QueryPlan {
    type Item = PlannedQuery;

    fn next(&mut self) -> Option<Self::Item> {
        let strategies = self.strategies();
        while let Some(strategy) = strategies.get(self.cursor).copied() {
            self.cursor += 1;
            if let Some(query) = self.query_for(strategy) {
                trace!(target: "planner", %strategy, %query, "planned query");
                return Some(PlannedQuery { strategy, query });
            }
        }
        None
    }
}

fn cleaned(value: Option<&str>) -> Option<String> {
    value
        .map(clean_search_text)
        .filter(|value| !value.is_empty())
}

/// Plan single-track queries from known tags and the filename guess.
pub fn plan(known_tags: &TagMap, guess: &ParsedFilenameGuess) -> QueryPlan {
    plan_merged(&MergedMetadata::merge(known_tags, guess))
}

pub fn plan_merged(metadata: &MergedMetadata) -> QueryPlan {
    QueryPlan::new(PlanKind::Track, metadata)
}

/// Plan release-level queries for album mode: catalog number, artist plus
/// release title, then a release-title-only probe.
pub fn plan_release(metadata: &MergedMetadata) -> QueryPlan {
    QueryPlan::new(PlanKind::Release, metadata)
}
