// SPDX-License-Identifier: GPL-3.0-or-later

//! String normalization and fuzzy similarity for artist and title comparison.

use lazy_static::lazy_static;
use regex::Regex;
use strsim::normalized_levenshtein;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref FEATURING_BRACKETED: Regex =
        Regex::new(r"(?i)[\(\[]\s*(?:feat\.?|ft\.?|featuring)\s[^\)\]]*[\)\]]")
            .expect("bracketed featuring regex is valid");
    static ref FEATURING_TRAILING: Regex =
        Regex::new(r"(?i)\s(?:feat\.?|ft\.?|featuring)\s.*$").expect("featuring regex is valid");
    static ref ANNOTATION: Regex =
        Regex::new(r"[\(\[][^\)\]]*[\)\]]").expect("annotation regex is valid");
}

/// Weight of the annotation-free comparison in [`title_similarity`].
const CORE_TITLE_WEIGHT: f32 = 0.8;

/// Lowercase, accent-free, punctuation-free form with featuring credits removed.
pub fn normalize_for_match(value: &str) -> String {
    let without_featuring = FEATURING_BRACKETED.replace_all(value, " ");
    let without_featuring = FEATURING_TRAILING.replace(&without_featuring, "");

    without_featuring
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop bracketed edition annotations such as "(Radio Edit)" or "[Remastered]".
pub fn strip_annotations(value: &str) -> String {
    ANNOTATION
        .replace_all(value, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized Levenshtein similarity in [0, 1]. Empty input never matches.
pub fn similarity(left: &str, right: &str) -> f32 {
    let left = normalize_for_match(left);
    let right = normalize_for_match(right);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    if left == right {
        return 1.0;
    }

    (normalized_levenshtein(&left, &right) as f32).clamp(0.0, 1.0)
}

/// Title similarity blending the annotation-free comparison with the full one,
/// so "Intro" matches "Intro (Radio Edit)" strongly but not perfectly.
pub fn title_similarity(local: &str, catalog: &str) -> f32 {
    let full = similarity(local, catalog);

    let local_core = strip_annotations(local);
    let catalog_core = strip_annotations(catalog);
    if local_core.is_empty() || catalog_core.is_empty() {
        return full;
    }

    let core = similarity(&local_core, &catalog_core);
    (core * CORE_TITLE_WEIGHT + full * (1.0 - CORE_TITLE_WEIGHT)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_folds_case_accents_and_punctuation() {
        assert_eq!(normalize_for_match("  Beyoncé!  "), "beyonce");
        assert_eq!(normalize_for_match("Don't Stop"), "dont stop");
        assert_eq!(normalize_for_match("Röyksopp"), "royksopp");
    }

    #[test]
    fn normalization_removes_featuring_credits() {
        assert_eq!(normalize_for_match("Lose Yourself (feat. Someone)"), "lose yourself");
        assert_eq!(normalize_for_match("Daft Punk ft. Pharrell"), "daft punk");
        assert_eq!(normalize_for_match("Song [Featuring X]"), "song");
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(similarity("One More Time", "one more time"), 1.0);
        assert_eq!(similarity("", "anything"), 0.0);
        let partial = similarity("One More Time", "One More Tim");
        assert!(partial > 0.8 && partial < 1.0);
    }

    #[test]
    fn annotated_title_scores_below_exact() {
        let exact = title_similarity("Intro", "Intro");
        let annotated = title_similarity("Intro", "Intro (Radio Edit)");
        assert_eq!(exact, 1.0);
        assert!(annotated > 0.8 && annotated < 1.0);
    }

    #[test]
    fn title_made_only_of_annotation_uses_full_comparison() {
        assert_eq!(title_similarity("(Untitled)", "(Untitled)"), 1.0);
    }
}
