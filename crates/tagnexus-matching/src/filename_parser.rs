// SPDX-License-Identifier: GPL-3.0-or-later

//! Filename heuristics for untagged files.
//!
//! Supported layouts, tried in order of specificity:
//! 1. `Artist - Album - 01 - Title`
//! 2. `01 - Artist - Title`
//! 3. `Artist - 01 - Title`
//! 4. `Artist - Album - Title`
//! 5. `01 - Title`
//! 6. `Artist - Title`
//! 7. `01 Title`
//!
//! A bracketed catalog number such as `[CAT001]` is pulled out first and
//! removed before the layouts are tried.
//!
//! Callers that know their naming scheme can instead supply a
//! [`FilenameFormat`] such as `%artist% - %title%`.

use crate::error::MatchError;
use lazy_static::lazy_static;
use regex::Regex;
use tagnexus_domain::{ParsedFilenameGuess, TagKey, TagMap};
use thiserror::Error;
use tracing::debug;

/// Confidence of every field when the filename carried a catalog number.
pub const CATALOG_TAGGED_CONFIDENCE: f32 = 1.0;
/// Confidence of fields from layouts that yield an artist/title pair.
pub const ARTIST_TITLE_CONFIDENCE: f32 = 0.6;
/// Confidence of fields from title-only layouts.
pub const TITLE_ONLY_CONFIDENCE: f32 = 0.4;
/// Confidence of fields extracted with a caller-supplied format.
pub const USER_FORMAT_CONFIDENCE: f32 = 0.9;

const MAX_SEGMENTS: usize = 4;

lazy_static! {
    static ref EXTENSION: Regex = Regex::new(r"\.[A-Za-z0-9]{1,5}$").expect("extension regex is valid");

    static ref BRACKETED_CATALOG: Regex =
        Regex::new(r"\[\s*([A-Za-z0-9]+(?:-[A-Za-z0-9]+)*)\s*\]").expect("catalog regex is valid");

    // Hyphen or en dash with whitespace on both sides.
    static ref SEPARATOR: Regex = Regex::new(r"\s+[-\u{2013}]\s+").expect("separator regex is valid");

    static ref TRACK_NUMBER: Regex = Regex::new(r"^\d{1,3}$").expect("track number regex is valid");

    static ref TRACK_TITLE_SPACE: Regex =
        Regex::new(r"^(?P<track>\d{1,3})\.?\s+(?P<title>\S.*)$").expect("track title regex is valid");

    static ref PLACEHOLDER: Regex = Regex::new(r"%([a-z_]+)%").expect("placeholder regex is valid");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Artist,
    Album,
    TrackNumber,
    Title,
}

impl Slot {
    fn key(self) -> TagKey {
        match self {
            Slot::Artist => TagKey::Artist,
            Slot::Album => TagKey::Album,
            Slot::TrackNumber => TagKey::TrackNumber,
            Slot::Title => TagKey::Title,
        }
    }
}

struct Template {
    name: &'static str,
    slots: &'static [Slot],
}

impl Template {
    fn has_artist(&self) -> bool {
        self.slots.contains(&Slot::Artist)
    }

    fn matches(&self, segments: &[&str]) -> bool {
        segments.len() == self.slots.len()
            && self.slots.iter().zip(segments).all(|(slot, segment)| match slot {
                Slot::TrackNumber => TRACK_NUMBER.is_match(segment),
                _ => !segment.is_empty(),
            })
    }
}

const TEMPLATES: &[Template] = &[
    Template {
        name: "artist-album-track-title",
        slots: &[Slot::Artist, Slot::Album, Slot::TrackNumber, Slot::Title],
    },
    Template {
        name: "track-artist-title",
        slots: &[Slot::TrackNumber, Slot::Artist, Slot::Title],
    },
    Template {
        name: "artist-track-title",
        slots: &[Slot::Artist, Slot::TrackNumber, Slot::Title],
    },
    Template {
        name: "artist-album-title",
        slots: &[Slot::Artist, Slot::Album, Slot::Title],
    },
    Template {
        name: "track-title",
        slots: &[Slot::TrackNumber, Slot::Title],
    },
    Template {
        name: "artist-title",
        slots: &[Slot::Artist, Slot::Title],
    },
];

const TRACK_TITLE_SPACE_NAME: &str = "track-title-space";

/// Extract what can be guessed from a raw filename. Never fails: a name that
/// fits no layout yields an empty guess (or only its catalog number).
pub fn parse(filename_raw: &str) -> ParsedFilenameGuess {
    let mut guess = ParsedFilenameGuess::new();

    let name = base_name(filename_raw);
    let name = EXTENSION.replace(name, "");

    let (catalog_number, remainder) = extract_catalog_number(&name);
    if let Some(catalog_number) = &catalog_number {
        guess.insert(TagKey::CatalogNumber, catalog_number, CATALOG_TAGGED_CONFIDENCE);
    }

    let segments: Vec<&str> = SEPARATOR.split(&remainder).map(str::trim).collect();

    if segments.len() <= MAX_SEGMENTS {
        if let Some(template) = TEMPLATES.iter().find(|template| template.matches(&segments)) {
            let confidence = field_confidence(catalog_number.is_some(), template.has_artist());
            for (slot, segment) in template.slots.iter().zip(&segments) {
                guess.insert(slot.key(), segment, confidence);
            }
            guess.template = Some(template.name.to_string());
            debug!(target: "parser", filename = %filename_raw, template = template.name, "filename parsed");
            return guess;
        }

        if segments.len() == 1 {
            if let Some(captures) = TRACK_TITLE_SPACE.captures(segments[0]) {
                let confidence = field_confidence(catalog_number.is_some(), false);
                if let Some(track) = captures.name("track") {
                    guess.insert(TagKey::TrackNumber, track.as_str(), confidence);
                }
                if let Some(title) = captures.name("title") {
                    guess.insert(TagKey::Title, title.as_str(), confidence);
                }
                guess.template = Some(TRACK_TITLE_SPACE_NAME.to_string());
                debug!(target: "parser", filename = %filename_raw, template = TRACK_TITLE_SPACE_NAME, "filename parsed");
                return guess;
            }
        }
    }

    let error = MatchError::ParseAmbiguous(filename_raw.to_string());
    debug!(target: "parser", segments = segments.len(), %error, "no filename template matched");
    guess
}

fn field_confidence(has_catalog_number: bool, has_artist: bool) -> f32 {
    if has_catalog_number {
        CATALOG_TAGGED_CONFIDENCE
    } else if has_artist {
        ARTIST_TITLE_CONFIDENCE
    } else {
        TITLE_ONLY_CONFIDENCE
    }
}

fn base_name(filename_raw: &str) -> &str {
    filename_raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename_raw)
        .trim()
}

/// The first bracketed token holding both letters and digits is the catalog
/// number. Returns it and the name with the token removed.
fn extract_catalog_number(name: &str) -> (Option<String>, String) {
    let found = BRACKETED_CATALOG.captures_iter(name).find_map(|captures| {
        let whole = captures.get(0)?;
        let token = captures.get(1)?.as_str();
        let has_letter = token.chars().any(|c| c.is_ascii_alphabetic());
        let has_digit = token.chars().any(|c| c.is_ascii_digit());
        (has_letter && has_digit).then(|| (token.to_string(), whole.range()))
    });

    match found {
        Some((token, range)) => {
            let mut remainder = String::with_capacity(name.len());
            remainder.push_str(&name[..range.start]);
            remainder.push(' ');
            remainder.push_str(&name[range.end..]);
            let remainder = remainder
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .trim_matches(|c: char| c == '-' || c == '_' || c.is_whitespace())
                .to_string();
            (Some(token), remainder)
        }
        None => (None, name.trim().to_string()),
    }
}

// ============================================================================
// User-defined formats
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("format {0:?} has no recognised placeholder")]
    NoPlaceholders(String),
    #[error("format {format:?} does not compile: {message}")]
    InvalidPattern { format: String, message: String },
}

fn placeholder_key(name: &str) -> Option<TagKey> {
    match name {
        "artist" => Some(TagKey::Artist),
        "title" => Some(TagKey::Title),
        "album" => Some(TagKey::Album),
        "track" => Some(TagKey::TrackNumber),
        "catalog" | "catalog_number" => Some(TagKey::CatalogNumber),
        _ => None,
    }
}

fn group_name(key: TagKey) -> &'static str {
    match key {
        TagKey::Artist => "artist",
        TagKey::Title => "title",
        TagKey::Album => "album",
        TagKey::TrackNumber => "track",
        TagKey::CatalogNumber => "catalog",
    }
}

/// A filename layout written with `%placeholder%` fields, for example
/// `%track% - %artist% - %title%`.
///
/// Recognised placeholders are `%artist%`, `%title%`, `%album%`, `%track%`
/// and `%catalog%`. Other placeholders such as `%year%` still have to match
/// text but their value is dropped. Literal text must match exactly.
#[derive(Debug, Clone)]
pub struct FilenameFormat {
    format: String,
    pattern: Regex,
    keys: Vec<TagKey>,
}

impl FilenameFormat {
    pub fn new(format: &str) -> Result<Self, FormatError> {
        let mut pattern = String::from("^");
        let mut keys: Vec<TagKey> = Vec::new();
        let mut literal_start = 0;

        for captures in PLACEHOLDER.captures_iter(format) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            pattern.push_str(&regex::escape(&format[literal_start..whole.start()]));
            literal_start = whole.end();

            // A repeated placeholder keeps its first value.
            match placeholder_key(name.as_str()).filter(|key| !keys.contains(key)) {
                Some(key) => {
                    pattern.push_str(&format!("(?P<{}>.+?)", group_name(key)));
                    keys.push(key);
                }
                None => pattern.push_str("(?:.+?)"),
            }
        }
        pattern.push_str(&regex::escape(&format[literal_start..]));
        pattern.push('$');

        if keys.is_empty() {
            return Err(FormatError::NoPlaceholders(format.to_string()));
        }
        let pattern = Regex::new(&pattern).map_err(|error| FormatError::InvalidPattern {
            format: format.to_string(),
            message: error.to_string(),
        })?;

        Ok(Self {
            format: format.to_string(),
            pattern,
            keys,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.format
    }

    /// Extract fields from a filename. The extension and any directory are
    /// ignored; a name that does not follow the format yields an empty guess.
    pub fn parse(&self, filename_raw: &str) -> ParsedFilenameGuess {
        let mut guess = ParsedFilenameGuess::new();
        let name = EXTENSION.replace(base_name(filename_raw), "");

        let Some(captures) = self.pattern.captures(&name) else {
            debug!(target: "parser", filename = %filename_raw, format = %self.format, "filename does not follow format");
            return guess;
        };
        for key in &self.keys {
            if let Some(value) = captures.name(group_name(*key)) {
                guess.insert(*key, value.as_str(), USER_FORMAT_CONFIDENCE);
            }
        }
        if !guess.is_empty() {
            guess.template = Some(self.format.clone());
        }
        guess
    }
}

/// Parse a filename with a one-off format. An unusable format yields an
/// empty guess.
pub fn parse_with_format(format: &str, filename_raw: &str) -> ParsedFilenameGuess {
    match FilenameFormat::new(format) {
        Ok(format) => format.parse(filename_raw),
        Err(error) => {
            debug!(target: "parser", %error, "filename format rejected");
            ParsedFilenameGuess::new()
        }
    }
}

/// Fill a format's placeholders from tag values. Unknown placeholders and
/// missing values become empty.
pub fn resolve_format(format: &str, tags: &TagMap) -> String {
    PLACEHOLDER
        .replace_all(format, |captures: &regex::Captures| {
            captures
                .get(1)
                .and_then(|name| placeholder_key(name.as_str()))
                .and_then(|key| tags.get(&key))
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        })
        .into_owned()
}

/// Drop characters that are not allowed in filenames.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .collect::<String>()
        .trim()
        .to_string()
}
