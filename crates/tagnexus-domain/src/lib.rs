// SPDX-License-Identifier: GPL-3.0-or-later
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// Tag Keys
// ============================================================================

/// The closed set of tag fields the matching engine reads and proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKey {
    Artist,
    Title,
    Album,
    TrackNumber,
    CatalogNumber,
}

impl TagKey {
    pub const ALL: [TagKey; 5] = [
        TagKey::Artist,
        TagKey::Title,
        TagKey::Album,
        TagKey::TrackNumber,
        TagKey::CatalogNumber,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::Title => "title",
            Self::Album => "album",
            Self::TrackNumber => "track_number",
            Self::CatalogNumber => "catalog_number",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "artist" => Some(Self::Artist),
            "title" => Some(Self::Title),
            "album" => Some(Self::Album),
            "track_number" | "tracknumber" | "track" => Some(Self::TrackNumber),
            "catalog_number" | "catalognumber" | "catno" => Some(Self::CatalogNumber),
            _ => None,
        }
    }
}

impl std::fmt::Display for TagKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tag values keyed by [`TagKey`]. Ordered so serialized output is stable.
pub type TagMap = BTreeMap<TagKey, String>;

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

// ============================================================================
// Local Tracks
// ============================================================================

/// Identifier of a local track: a file path or an opaque caller handle.
///
/// Ordering is lexicographic and is used as the deterministic tie-break in
/// album assignment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocalTrackId(pub String);

impl LocalTrackId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LocalTrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalTrack {
    pub id: LocalTrackId,
    pub known_tags: TagMap,
    pub duration_seconds: Option<f64>,
    pub filename_raw: String,
}

impl LocalTrack {
    pub fn new(id: impl Into<String>, filename_raw: impl Into<String>) -> Self {
        Self {
            id: LocalTrackId::new(id),
            known_tags: TagMap::new(),
            duration_seconds: None,
            filename_raw: filename_raw.into(),
        }
    }

    /// Build a track whose identifier is the path and whose raw filename is
    /// the final path component.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(path.display().to_string(), filename)
    }

    pub fn with_tag(mut self, key: TagKey, value: impl Into<String>) -> Self {
        self.known_tags.insert(key, value.into());
        self
    }

    pub fn with_tags(mut self, tags: TagMap) -> Self {
        self.known_tags.extend(tags);
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    /// Known tag value, trimmed; blank values count as absent.
    pub fn tag(&self, key: TagKey) -> Option<&str> {
        self.known_tags.get(&key).and_then(|value| non_empty(value))
    }

    /// Usable duration; non-finite or negative values count as unknown.
    pub fn duration(&self) -> Option<f64> {
        self.duration_seconds
            .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
    }

    /// Apply a resolved proposal. Only the caller mutates a track; the
    /// matcher returns proposals.
    pub fn apply_tags(&mut self, proposed: &TagMap) {
        for (key, value) in proposed {
            if let Some(value) = non_empty(value) {
                self.known_tags.insert(*key, value.to_string());
            }
        }
    }
}

// ============================================================================
// Filename Guesses
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuessedField {
    pub value: String,
    /// How unambiguous the pattern that produced this value was (0.0-1.0).
    pub confidence: f32,
}

/// Metadata guessed from a filename. Fields that did not structurally match
/// are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedFilenameGuess {
    pub template: Option<String>,
    fields: BTreeMap<TagKey, GuessedField>,
}

impl ParsedFilenameGuess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a guessed value. Blank values are ignored.
    pub fn insert(&mut self, key: TagKey, value: &str, confidence: f32) {
        if let Some(value) = non_empty(value) {
            self.fields.insert(
                key,
                GuessedField {
                    value: value.to_string(),
                    confidence: confidence.clamp(0.0, 1.0),
                },
            );
        }
    }

    pub fn get(&self, key: TagKey) -> Option<&GuessedField> {
        self.fields.get(&key)
    }

    pub fn value(&self, key: TagKey) -> Option<&str> {
        self.fields.get(&key).map(|field| field.value.as_str())
    }

    pub fn confidence(&self, key: TagKey) -> Option<f32> {
        self.fields.get(&key).map(|field| field.confidence)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TagKey, &GuessedField)> {
        self.fields.iter().map(|(key, field)| (*key, field))
    }
}

// ============================================================================
// Catalog Queries & Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryField {
    Artist,
    ReleaseTitle,
    TrackTitle,
    CatalogNumber,
}

/// A structured search request. At least one field is always present and
/// absent fields are never sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogQuery {
    artist: Option<String>,
    release_title: Option<String>,
    track_title: Option<String>,
    catalog_number: Option<String>,
}

impl CatalogQuery {
    pub fn builder() -> CatalogQueryBuilder {
        CatalogQueryBuilder::default()
    }

    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }

    pub fn release_title(&self) -> Option<&str> {
        self.release_title.as_deref()
    }

    pub fn track_title(&self) -> Option<&str> {
        self.track_title.as_deref()
    }

    pub fn catalog_number(&self) -> Option<&str> {
        self.catalog_number.as_deref()
    }

    /// Present fields in a fixed order.
    pub fn fields(&self) -> impl Iterator<Item = (QueryField, &str)> {
        [
            (QueryField::CatalogNumber, self.catalog_number.as_deref()),
            (QueryField::Artist, self.artist.as_deref()),
            (QueryField::TrackTitle, self.track_title.as_deref()),
            (QueryField::ReleaseTitle, self.release_title.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|value| (field, value)))
    }
}

impl std::fmt::Display for CatalogQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .fields()
            .map(|(field, value)| format!("{field:?}={value:?}"))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CatalogQueryBuilder {
    artist: Option<String>,
    release_title: Option<String>,
    track_title: Option<String>,
    catalog_number: Option<String>,
}

impl CatalogQueryBuilder {
    pub fn artist(mut self, value: impl AsRef<str>) -> Self {
        self.artist = non_empty(value.as_ref()).map(str::to_string);
        self
    }

    pub fn release_title(mut self, value: impl AsRef<str>) -> Self {
        self.release_title = non_empty(value.as_ref()).map(str::to_string);
        self
    }

    pub fn track_title(mut self, value: impl AsRef<str>) -> Self {
        self.track_title = non_empty(value.as_ref()).map(str::to_string);
        self
    }

    pub fn catalog_number(mut self, value: impl AsRef<str>) -> Self {
        self.catalog_number = non_empty(value.as_ref()).map(str::to_string);
        self
    }

    /// Returns `None` when every field is empty.
    pub fn build(self) -> Option<CatalogQuery> {
        if self.artist.is_none()
            && self.release_title.is_none()
            && self.track_title.is_none()
            && self.catalog_number.is_none()
        {
            return None;
        }

        Some(CatalogQuery {
            artist: self.artist,
            release_title: self.release_title,
            track_title: self.track_title,
            catalog_number: self.catalog_number,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub title: String,
    /// Position as printed on the release ("1", "A2", "2-05").
    pub position: String,
    pub duration_seconds: Option<f64>,
    /// Track-level artist credit, mostly present on compilations.
    pub artist: Option<String>,
}

impl CatalogTrack {
    pub fn new(title: impl Into<String>, position: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            position: position.into(),
            duration_seconds: None,
            artist: None,
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }
}

/// A release as returned by the catalog service. Immutable once fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub release_id: Option<u64>,
    pub title: String,
    pub artist: String,
    pub catalog_number: Option<String>,
    pub label: Option<String>,
    pub year: Option<u16>,
    #[serde(default)]
    pub formats: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub tracks: Vec<CatalogTrack>,
}

impl CatalogRecord {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            ..Self::default()
        }
    }

    pub fn with_catalog_number(mut self, catalog_number: impl Into<String>) -> Self {
        self.catalog_number = Some(catalog_number.into());
        self
    }

    pub fn with_track(mut self, track: CatalogTrack) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn track(&self, index: usize) -> Option<&CatalogTrack> {
        self.tracks.get(index)
    }

    /// A "Various" artist credit or more than three distinct track artists.
    pub fn is_compilation(&self) -> bool {
        if self.artist.to_lowercase().contains("various") {
            return true;
        }

        let mut track_artists: Vec<String> = self
            .tracks
            .iter()
            .filter_map(|track| track.artist.as_deref())
            .map(str::to_lowercase)
            .collect();
        track_artists.sort();
        track_artists.dedup();
        track_artists.len() > 3
    }
}

// ============================================================================
// Match Candidates
// ============================================================================

/// Search strategies in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStrategy {
    CatalogNumber,
    ArtistTitle,
    ArtistRelease,
    TitleProbe,
}

impl QueryStrategy {
    pub fn priority_weight(&self) -> f32 {
        match self {
            Self::CatalogNumber => 1.0,
            Self::ArtistTitle => 0.8,
            Self::ArtistRelease => 0.7,
            Self::TitleProbe => 0.4,
        }
    }

    /// The title probe only runs when nothing better was found.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::TitleProbe)
    }
}

impl std::fmt::Display for QueryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CatalogNumber => write!(f, "Catalog number"),
            Self::ArtistTitle => write!(f, "Artist + title"),
            Self::ArtistRelease => write!(f, "Artist + release"),
            Self::TitleProbe => write!(f, "Title probe"),
        }
    }
}

pub const SIMILARITY_WEIGHT: f32 = 0.5;
pub const PRIORITY_WEIGHT: f32 = 0.3;
pub const DURATION_WEIGHT: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub string_similarity: f32,
    pub strategy_priority: f32,
    pub duration_fit: f32,
}

impl ScoreBreakdown {
    pub fn confidence(&self) -> f32 {
        let weighted = self.string_similarity.clamp(0.0, 1.0) * SIMILARITY_WEIGHT
            + self.strategy_priority.clamp(0.0, 1.0) * PRIORITY_WEIGHT
            + self.duration_fit.clamp(0.0, 1.0) * DURATION_WEIGHT;
        weighted.clamp(0.0, 1.0)
    }
}

/// A scored pairing of a local track with a catalog record (and optionally
/// one of its tracks). The confidence is always derived from the breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub local_track_id: LocalTrackId,
    pub record: Arc<CatalogRecord>,
    pub track_index: Option<usize>,
    strategy: QueryStrategy,
    breakdown: ScoreBreakdown,
    confidence: f32,
}

impl MatchCandidate {
    pub fn new(
        local_track_id: LocalTrackId,
        record: Arc<CatalogRecord>,
        track_index: Option<usize>,
        strategy: QueryStrategy,
        breakdown: ScoreBreakdown,
    ) -> Self {
        Self {
            local_track_id,
            record,
            track_index,
            strategy,
            confidence: breakdown.confidence(),
            breakdown,
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn strategy(&self) -> QueryStrategy {
        self.strategy
    }

    pub fn breakdown(&self) -> &ScoreBreakdown {
        &self.breakdown
    }

    pub fn track(&self) -> Option<&CatalogTrack> {
        self.track_index.and_then(|index| self.record.track(index))
    }

    /// Tag values this candidate proposes for the local file.
    pub fn proposed_tags(&self) -> TagMap {
        let mut tags = TagMap::new();
        let track = self.track();

        let artist = track
            .and_then(|track| track.artist.as_deref())
            .unwrap_or(self.record.artist.as_str());
        let title = track.map(|track| track.title.as_str()).unwrap_or(self.record.title.as_str());

        let values = [
            (TagKey::Artist, Some(artist)),
            (TagKey::Title, Some(title)),
            (TagKey::Album, Some(self.record.title.as_str())),
            (TagKey::TrackNumber, track.map(|track| track.position.as_str())),
            (TagKey::CatalogNumber, self.record.catalog_number.as_deref()),
        ];

        for (key, value) in values {
            if let Some(value) = value.and_then(non_empty) {
                tags.insert(key, value.to_string());
            }
        }
        tags
    }
}

// ============================================================================
// Album Assignment
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssignmentTarget {
    Assigned { candidate: MatchCandidate },
    Unresolved { best_rejected_confidence: Option<f32> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentEntry {
    pub local_track_id: LocalTrackId,
    pub target: AssignmentTarget,
}

impl AssignmentEntry {
    pub fn candidate(&self) -> Option<&MatchCandidate> {
        match &self.target {
            AssignmentTarget::Assigned { candidate } => Some(candidate),
            AssignmentTarget::Unresolved { .. } => None,
        }
    }
}

/// Local tracks mapped onto the tracks of one release.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlbumAssignment {
    pub entries: Vec<AssignmentEntry>,
}

impl AlbumAssignment {
    pub fn get(&self, local_track_id: &LocalTrackId) -> Option<&AssignmentEntry> {
        self.entries
            .iter()
            .find(|entry| &entry.local_track_id == local_track_id)
    }

    pub fn assigned(&self) -> impl Iterator<Item = &MatchCandidate> {
        self.entries.iter().filter_map(AssignmentEntry::candidate)
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &LocalTrackId> {
        self.entries
            .iter()
            .filter(|entry| entry.candidate().is_none())
            .map(|entry| &entry.local_track_id)
    }

    pub fn total_confidence(&self) -> f32 {
        self.assigned().map(MatchCandidate::confidence).sum()
    }

    /// Every catalog track is the target of at most one local track.
    pub fn is_injective(&self) -> bool {
        let mut targets: Vec<usize> = self
            .assigned()
            .filter_map(|candidate| candidate.track_index)
            .collect();
        let total = targets.len();
        targets.sort_unstable();
        targets.dedup();
        targets.len() == total
    }
}
