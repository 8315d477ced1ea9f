// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-file tag storage seen as a key/value map over the closed tag set.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tagnexus_domain::{LocalTrack, TagMap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TagStoreError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("unsupported file: {0}")]
    Unsupported(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("tag store lock poisoned")]
    Poisoned,
}

/// Reads and writes the closed tag set of one file. The matcher only reads;
/// writes happen on behalf of the caller.
pub trait TagStore: Send + Sync {
    fn read(&self, path: &Path) -> Result<TagMap, TagStoreError>;

    fn write(&self, path: &Path, tags: &TagMap) -> Result<(), TagStoreError>;

    /// Playback duration in seconds, when the store can tell.
    fn duration(&self, path: &Path) -> Result<Option<f64>, TagStoreError>;

    /// Build a [`LocalTrack`] for a path from its tags and duration.
    fn load_track(&self, path: &Path) -> Result<LocalTrack, TagStoreError> {
        let tags = self.read(path)?;
        let mut track = LocalTrack::from_path(path).with_tags(tags);
        track.duration_seconds = self.duration(path)?;
        Ok(track)
    }
}

#[derive(Debug, Clone, Default)]
struct StoredFile {
    tags: TagMap,
    duration_seconds: Option<f64>,
}

/// Tag store backed by a map. Useful for tests and for embedding the engine
/// where tags come from somewhere other than files.
#[derive(Debug, Default)]
pub struct InMemoryTagStore {
    files: RwLock<HashMap<PathBuf, StoredFile>>,
}

impl InMemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        path: impl Into<PathBuf>,
        tags: TagMap,
        duration_seconds: Option<f64>,
    ) -> Result<(), TagStoreError> {
        let mut files = self.files.write().map_err(|_| TagStoreError::Poisoned)?;
        files.insert(
            path.into(),
            StoredFile {
                tags,
                duration_seconds,
            },
        );
        Ok(())
    }
}

impl TagStore for InMemoryTagStore {
    fn read(&self, path: &Path) -> Result<TagMap, TagStoreError> {
        let files = self.files.read().map_err(|_| TagStoreError::Poisoned)?;
        files
            .get(path)
            .map(|file| file.tags.clone())
            .ok_or_else(|| TagStoreError::NotFound(path.display().to_string()))
    }

    fn write(&self, path: &Path, tags: &TagMap) -> Result<(), TagStoreError> {
        let mut files = self.files.write().map_err(|_| TagStoreError::Poisoned)?;
        let file = files
            .get_mut(path)
            .ok_or_else(|| TagStoreError::NotFound(path.display().to_string()))?;
        for (key, value) in tags {
            let value = value.trim();
            if value.is_empty() {
                file.tags.remove(key);
            } else {
                file.tags.insert(*key, value.to_string());
            }
        }
        Ok(())
    }

    fn duration(&self, path: &Path) -> Result<Option<f64>, TagStoreError> {
        let files = self.files.read().map_err(|_| TagStoreError::Poisoned)?;
        files
            .get(path)
            .map(|file| file.duration_seconds)
            .ok_or_else(|| TagStoreError::NotFound(path.display().to_string()))
    }
}
