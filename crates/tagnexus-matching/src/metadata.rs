// SPDX-License-Identifier: GPL-3.0-or-later

use crate::filename_parser;
use serde::Serialize;
use tagnexus_domain::{LocalTrack, ParsedFilenameGuess, TagKey, TagMap};

/// Where a merged value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    KnownTag,
    Filename,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedValue {
    pub value: String,
    pub source: ValueSource,
}

/// Known tags overlaid on the filename guess. Known tags always win for the
/// same field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergedMetadata {
    values: std::collections::BTreeMap<TagKey, MergedValue>,
}

impl MergedMetadata {
    pub fn merge(known_tags: &TagMap, guess: &ParsedFilenameGuess) -> Self {
        let mut values = std::collections::BTreeMap::new();

        for (key, field) in guess.iter() {
            values.insert(
                key,
                MergedValue {
                    value: field.value.clone(),
                    source: ValueSource::Filename,
                },
            );
        }

        for (key, value) in known_tags {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            values.insert(
                *key,
                MergedValue {
                    value: value.to_string(),
                    source: ValueSource::KnownTag,
                },
            );
        }

        Self { values }
    }

    pub fn for_track(track: &LocalTrack, guess: &ParsedFilenameGuess) -> Self {
        Self::merge(&track.known_tags, guess)
    }

    pub fn get(&self, key: TagKey) -> Option<&str> {
        self.values.get(&key).map(|merged| merged.value.as_str())
    }

    pub fn source(&self, key: TagKey) -> Option<ValueSource> {
        self.values.get(&key).map(|merged| merged.source)
    }

    pub fn artist(&self) -> Option<&str> {
        self.get(TagKey::Artist)
    }

    pub fn title(&self) -> Option<&str> {
        self.get(TagKey::Title)
    }

    pub fn album(&self) -> Option<&str> {
        self.get(TagKey::Album)
    }

    pub fn track_number(&self) -> Option<&str> {
        self.get(TagKey::TrackNumber)
    }

    pub fn catalog_number(&self) -> Option<&str> {
        self.get(TagKey::CatalogNumber)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A local track with its filename guess and merged metadata, computed once
/// per resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedTrack {
    pub track: LocalTrack,
    pub guess: ParsedFilenameGuess,
    pub metadata: MergedMetadata,
}

impl PreparedTrack {
    pub fn new(track: LocalTrack) -> Self {
        let guess = filename_parser::parse(&track.filename_raw);
        Self::with_guess(track, guess)
    }

    /// Prepare a track whose filename was already parsed.
    pub fn with_guess(track: LocalTrack, guess: ParsedFilenameGuess) -> Self {
        let metadata = MergedMetadata::for_track(&track, &guess);
        Self {
            track,
            guess,
            metadata,
        }
    }
}
