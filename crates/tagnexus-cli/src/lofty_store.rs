// SPDX-License-Identifier: GPL-3.0-or-later

//! Tag store over real audio files.

use lofty::config::WriteOptions;
use lofty::error::{ErrorKind, LoftyError};
use lofty::file::TaggedFile;
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::Tag;
use std::path::Path;
use tagnexus_domain::{TagKey, TagMap};
use tagnexus_matching::{TagStore, TagStoreError};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagStore;

impl LoftyTagStore {
    pub fn new() -> Self {
        Self
    }

    fn open(&self, path: &Path) -> Result<TaggedFile, TagStoreError> {
        if !path.exists() {
            return Err(TagStoreError::NotFound(path.display().to_string()));
        }
        Probe::open(path)
            .and_then(|probe| probe.read())
            .map_err(|error| map_error(path, error))
    }
}

fn map_error(path: &Path, error: LoftyError) -> TagStoreError {
    match error.kind() {
        ErrorKind::Io(_) => TagStoreError::Io(format!("{}: {}", path.display(), error)),
        _ => TagStoreError::Unsupported(format!("{}: {}", path.display(), error)),
    }
}

impl TagStore for LoftyTagStore {
    fn read(&self, path: &Path) -> Result<TagMap, TagStoreError> {
        let tagged_file = self.open(path)?;
        let mut tags = TagMap::new();
        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            return Ok(tags);
        };

        let values = [
            (TagKey::Artist, tag.artist().map(|value| value.into_owned())),
            (TagKey::Title, tag.title().map(|value| value.into_owned())),
            (TagKey::Album, tag.album().map(|value| value.into_owned())),
            (TagKey::TrackNumber, tag.track().map(|track| track.to_string())),
            (
                TagKey::CatalogNumber,
                tag.get_string(&ItemKey::CatalogNumber).map(str::to_string),
            ),
        ];
        for (key, value) in values {
            if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
                tags.insert(key, value);
            }
        }
        Ok(tags)
    }

    fn write(&self, path: &Path, tags: &TagMap) -> Result<(), TagStoreError> {
        let mut tagged_file = self.open(path)?;
        let tag_type = tagged_file.primary_tag_type();
        if tagged_file.tag(tag_type).is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .tag_mut(tag_type)
            .ok_or_else(|| TagStoreError::Unsupported(path.display().to_string()))?;

        for (key, value) in tags {
            set_value(tag, *key, value);
        }

        tagged_file
            .save_to_path(path, WriteOptions::default())
            .map_err(|error| map_error(path, error))?;
        debug!(target: "cli", path = %path.display(), fields = tags.len(), "tags written");
        Ok(())
    }

    fn duration(&self, path: &Path) -> Result<Option<f64>, TagStoreError> {
        let duration = self.open(path)?.properties().duration();
        Ok((!duration.is_zero()).then(|| duration.as_secs_f64()))
    }
}

fn set_value(tag: &mut Tag, key: TagKey, value: &str) {
    let value = value.to_string();
    match key {
        TagKey::Artist => tag.set_artist(value),
        TagKey::Title => tag.set_title(value),
        TagKey::Album => tag.set_album(value),
        // Vinyl positions such as "A1" are stored as text.
        TagKey::TrackNumber => match value.parse::<u32>() {
            Ok(track) => tag.set_track(track),
            Err(_) => {
                tag.insert_text(ItemKey::TrackNumber, value);
            }
        },
        TagKey::CatalogNumber => {
            tag.insert_text(ItemKey::CatalogNumber, value);
        }
    }
}
