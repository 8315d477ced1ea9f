// SPDX-License-Identifier: GPL-3.0-or-later

//! Candidate scoring.
//!
//! A candidate's confidence is the weighted sum of three signals:
//! - string similarity of artist and title (0.5)
//! - specificity of the strategy that found it (0.3)
//! - duration fit (0.2)

use crate::duration::DurationReconciler;
use crate::metadata::MergedMetadata;
use crate::similarity::{similarity, title_similarity};
use std::sync::Arc;
use tagnexus_discogs::models::clean_artist_name;
use tagnexus_domain::{CatalogRecord, LocalTrack, MatchCandidate, QueryStrategy, ScoreBreakdown};
use tracing::trace;

const ARTIST_BLEND: f32 = 0.4;
const TITLE_BLEND: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScorer {
    reconciler: DurationReconciler,
    similarity_floor: f32,
    tie_epsilon: f32,
}

impl Default for CandidateScorer {
    fn default() -> Self {
        Self::new(DurationReconciler::default(), 0.4, 0.001)
    }
}

impl CandidateScorer {
    pub fn new(reconciler: DurationReconciler, similarity_floor: f32, tie_epsilon: f32) -> Self {
        Self {
            reconciler,
            similarity_floor: similarity_floor.clamp(0.0, 1.0),
            tie_epsilon: tie_epsilon.abs(),
        }
    }

    pub fn tie_epsilon(&self) -> f32 {
        self.tie_epsilon
    }

    /// Blend of artist and title similarity, or `None` when the local side
    /// has nothing comparable.
    pub fn string_similarity(
        &self,
        metadata: &MergedMetadata,
        record: &CatalogRecord,
        track_index: Option<usize>,
    ) -> Option<f32> {
        let track = track_index.and_then(|index| record.track(index));

        // A compilation's release artist ("Various") says nothing about
        // an uncredited track.
        let catalog_artist = match track.and_then(|track| track.artist.as_deref()) {
            Some(artist) => Some(artist),
            None if record.is_compilation() => None,
            None => Some(record.artist.as_str()),
        };
        let artist_score = metadata
            .artist()
            .zip(catalog_artist)
            .map(|(artist, catalog_artist)| similarity(artist, &clean_artist_name(catalog_artist)));

        let title_score = match (metadata.title(), track) {
            (Some(title), Some(track)) => Some(title_similarity(title, &track.title)),
            (Some(title), None) => Some(title_similarity(title, &record.title)),
            // Without a local title only the track number can tell the
            // release's tracks apart.
            (None, Some(track)) => {
                if !metadata.track_number().is_some_and(|number| same_position(number, &track.position)) {
                    return None;
                }
                metadata.album().map(|album| title_similarity(album, &record.title))
            }
            (None, None) => metadata.album().map(|album| title_similarity(album, &record.title)),
        };

        match (artist_score, title_score) {
            (Some(artist), Some(title)) => Some(artist * ARTIST_BLEND + title * TITLE_BLEND),
            (Some(artist), None) => Some(artist),
            (None, Some(title)) => Some(title),
            (None, None) => None,
        }
    }

    /// Score one pairing. Returns `None` when string similarity is missing or
    /// below the floor.
    pub fn score(
        &self,
        strategy: QueryStrategy,
        local: &LocalTrack,
        metadata: &MergedMetadata,
        record: &Arc<CatalogRecord>,
        track_index: Option<usize>,
    ) -> Option<MatchCandidate> {
        let string_similarity = self.string_similarity(metadata, record, track_index)?;
        if string_similarity < self.similarity_floor {
            return None;
        }

        let candidate_duration = track_index
            .and_then(|index| record.track(index))
            .and_then(|track| track.duration_seconds);
        let breakdown = ScoreBreakdown {
            string_similarity,
            strategy_priority: strategy.priority_weight(),
            duration_fit: self.reconciler.fit(local.duration(), candidate_duration),
        };

        let candidate = MatchCandidate::new(
            local.id.clone(),
            Arc::clone(record),
            track_index,
            strategy,
            breakdown,
        );
        trace!(
            target: "scoring",
            local = %local.id,
            release = %record.title,
            track_index = ?track_index,
            confidence = candidate.confidence(),
            "scored candidate"
        );
        Some(candidate)
    }

    /// Score every track of a record and keep the best. A record without a
    /// tracklist is scored at release level.
    pub fn best_for_record(
        &self,
        strategy: QueryStrategy,
        local: &LocalTrack,
        metadata: &MergedMetadata,
        record: &Arc<CatalogRecord>,
    ) -> Option<MatchCandidate> {
        if record.tracks.is_empty() {
            return self.score(strategy, local, metadata, record, None);
        }

        let scored: Vec<MatchCandidate> = (0..record.tracks.len())
            .filter_map(|index| self.score(strategy, local, metadata, record, Some(index)))
            .collect();
        select_best(&scored, self.tie_epsilon).cloned()
    }
}

/// Highest confidence wins. Within `epsilon` the higher-priority strategy
/// wins, then the earlier candidate.
pub fn select_best(candidates: &[MatchCandidate], epsilon: f32) -> Option<&MatchCandidate> {
    candidates.iter().fold(None, |best: Option<&MatchCandidate>, candidate| match best {
        None => Some(candidate),
        Some(current) => {
            let delta = candidate.confidence() - current.confidence();
            let replaces = if delta.abs() <= epsilon {
                candidate.strategy().priority_weight() > current.strategy().priority_weight()
            } else {
                delta > 0.0
            };
            Some(if replaces { candidate } else { current })
        }
    })
}

/// Order by confidence then strategy priority, keeping discovery order for
/// exact ties.
pub fn rank(candidates: &mut [MatchCandidate]) {
    candidates.sort_by(|left, right| {
        right
            .confidence()
            .total_cmp(&left.confidence())
            .then_with(|| {
                right
                    .strategy()
                    .priority_weight()
                    .total_cmp(&left.strategy().priority_weight())
            })
    });
}

/// Compare a local track number ("02", "2/12") with a catalog position.
fn same_position(local: &str, position: &str) -> bool {
    let local = local.split('/').next().unwrap_or(local).trim();
    let position = position.trim();
    match (local.parse::<u32>(), position.parse::<u32>()) {
        (Ok(local), Ok(position)) => local == position,
        _ => local.eq_ignore_ascii_case(position),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagnexus_domain::{CatalogTrack, ParsedFilenameGuess, TagKey, TagMap};

    fn metadata(fields: &[(TagKey, &str)]) -> MergedMetadata {
        let mut known = TagMap::new();
        for (key, value) in fields {
            known.insert(*key, value.to_string());
        }
        MergedMetadata::merge(&known, &ParsedFilenameGuess::new())
    }

    fn discovery() -> Arc<CatalogRecord> {
        Arc::new(
            CatalogRecord::new("Discovery", "Daft Punk")
                .with_track(CatalogTrack::new("One More Time", "1").with_duration(320.0))
                .with_track(CatalogTrack::new("Aerodynamic", "2").with_duration(212.0)),
        )
    }

    #[test]
    fn exact_match_with_duration_scores_high() {
        let scorer = CandidateScorer::default();
        let local = LocalTrack::new("a", "a.mp3").with_duration(320.0);
        let metadata = metadata(&[(TagKey::Artist, "Daft Punk"), (TagKey::Title, "One More Time")]);

        let candidate = scorer
            .best_for_record(QueryStrategy::ArtistTitle, &local, &metadata, &discovery())
            .expect("candidate");

        assert_eq!(candidate.track_index, Some(0));
        assert!((candidate.confidence() - 0.94).abs() < 1e-5);
    }

    #[test]
    fn unknown_duration_is_neutral() {
        let scorer = CandidateScorer::default();
        let local = LocalTrack::new("a", "a.mp3");
        let metadata = metadata(&[(TagKey::Artist, "Daft Punk"), (TagKey::Title, "Aerodynamic")]);

        let candidate = scorer
            .score(QueryStrategy::TitleProbe, &local, &metadata, &discovery(), Some(1))
            .expect("candidate");
        assert_eq!(candidate.breakdown().duration_fit, 0.5);
        assert!((candidate.confidence() - (0.5 + 0.4 * 0.3 + 0.1)).abs() < 1e-5);
    }

    #[test]
    fn dissimilar_records_fall_below_floor() {
        let scorer = CandidateScorer::default();
        let local = LocalTrack::new("a", "a.mp3");
        let metadata = metadata(&[(TagKey::Artist, "Zzyzx"), (TagKey::Title, "Qwerty Uiop")]);

        assert!(scorer
            .best_for_record(QueryStrategy::ArtistTitle, &local, &metadata, &discovery())
            .is_none());
    }

    #[test]
    fn missing_title_compares_album_with_release() {
        let scorer = CandidateScorer::default();
        let metadata = metadata(&[(TagKey::Album, "Discovery")]);
        assert_eq!(scorer.string_similarity(&metadata, &discovery(), None), Some(1.0));
    }

    #[test]
    fn album_alone_cannot_pick_a_track() {
        let scorer = CandidateScorer::default();
        let local = LocalTrack::new("a", "track.mp3");
        let metadata = metadata(&[(TagKey::Artist, "Daft Punk"), (TagKey::Album, "Discovery")]);
        let record = discovery();

        assert_eq!(scorer.string_similarity(&metadata, &record, Some(0)), None);
        assert_eq!(scorer.string_similarity(&metadata, &record, Some(1)), None);
        assert!(scorer
            .best_for_record(QueryStrategy::ArtistRelease, &local, &metadata, &record)
            .is_none());
    }

    #[test]
    fn track_number_selects_track_without_title() {
        let scorer = CandidateScorer::default();
        let local = LocalTrack::new("a", "track.mp3");
        let metadata = metadata(&[
            (TagKey::Artist, "Daft Punk"),
            (TagKey::Album, "Discovery"),
            (TagKey::TrackNumber, "02/14"),
        ]);

        let candidate = scorer
            .best_for_record(QueryStrategy::ArtistRelease, &local, &metadata, &discovery())
            .expect("candidate");
        assert_eq!(candidate.track_index, Some(1));
        assert_eq!(candidate.breakdown().string_similarity, 1.0);
    }

    #[test]
    fn compilation_artist_is_not_compared() {
        let scorer = CandidateScorer::default();
        let record = CatalogRecord::new("Now 42", "Various")
            .with_track(CatalogTrack::new("Eple", "1"))
            .with_track(CatalogTrack::new("Da Funk", "2").with_artist("Daft Punk"));
        let metadata = metadata(&[(TagKey::Artist, "Röyksopp"), (TagKey::Title, "Eple")]);

        assert_eq!(scorer.string_similarity(&metadata, &record, Some(0)), Some(1.0));
        let credited = scorer
            .string_similarity(&metadata, &record, Some(1))
            .expect("comparable");
        assert!(credited < 0.5);
    }

    #[test]
    fn positions_compare_numerically_or_verbatim() {
        assert!(same_position("01", "1"));
        assert!(same_position("3/12", "3"));
        assert!(same_position("a1", "A1"));
        assert!(!same_position("1", "2"));
        assert!(!same_position("A1", "1"));
    }

    #[test]
    fn nothing_to_compare_yields_no_candidate() {
        let scorer = CandidateScorer::default();
        let local = LocalTrack::new("a", "a.mp3");
        let metadata = metadata(&[(TagKey::TrackNumber, "01")]);
        assert!(scorer
            .score(QueryStrategy::CatalogNumber, &local, &metadata, &discovery(), Some(0))
            .is_none());
    }

    #[test]
    fn catalog_artist_suffix_is_ignored() {
        let scorer = CandidateScorer::default();
        let record = Arc::new(CatalogRecord::new("Eple", "Röyksopp (2)"));
        let metadata = metadata(&[(TagKey::Artist, "Royksopp"), (TagKey::Title, "Eple")]);
        assert_eq!(scorer.string_similarity(&metadata, &record, None), Some(1.0));
    }

    #[test]
    fn ties_prefer_higher_priority_strategy() {
        let scorer = CandidateScorer::default();
        let local = LocalTrack::new("a", "a.mp3").with_duration(320.0);
        let metadata = metadata(&[(TagKey::Artist, "Daft Punk"), (TagKey::Title, "One More Time")]);
        let record = discovery();

        let probe = scorer
            .score(QueryStrategy::TitleProbe, &local, &metadata, &record, Some(0))
            .expect("probe");
        // Same confidence, different strategy label.
        let relabelled = MatchCandidate::new(
            probe.local_track_id.clone(),
            Arc::clone(&probe.record),
            probe.track_index,
            QueryStrategy::CatalogNumber,
            *probe.breakdown(),
        );
        let candidates = vec![probe, relabelled];
        let best = select_best(&candidates, 0.001).expect("best");
        assert_eq!(best.strategy(), QueryStrategy::CatalogNumber);
    }

    #[test]
    fn clear_winner_beats_priority() {
        let scorer = CandidateScorer::default();
        let local = LocalTrack::new("a", "a.mp3").with_duration(320.0);
        let metadata = metadata(&[(TagKey::Artist, "Daft Punk"), (TagKey::Title, "One More Time")]);
        let record = discovery();

        let strong = scorer
            .score(QueryStrategy::TitleProbe, &local, &metadata, &record, Some(0))
            .expect("strong");
        let weak = scorer
            .score(QueryStrategy::CatalogNumber, &local, &metadata, &record, Some(1));
        let mut candidates = vec![strong];
        candidates.extend(weak);
        let best = select_best(&candidates, 0.001).expect("best");
        assert_eq!(best.track_index, Some(0));
    }

    #[test]
    fn rank_orders_by_confidence_then_priority() {
        let scorer = CandidateScorer::default();
        let local = LocalTrack::new("a", "a.mp3").with_duration(320.0);
        let metadata = metadata(&[(TagKey::Artist, "Daft Punk"), (TagKey::Title, "One More Time")]);
        let record = discovery();

        let mut candidates: Vec<MatchCandidate> = [
            QueryStrategy::TitleProbe,
            QueryStrategy::CatalogNumber,
            QueryStrategy::ArtistTitle,
        ]
        .into_iter()
        .filter_map(|strategy| scorer.score(strategy, &local, &metadata, &record, Some(0)))
        .collect();
        rank(&mut candidates);

        let order: Vec<QueryStrategy> = candidates.iter().map(|c| c.strategy()).collect();
        assert_eq!(
            order,
            vec![
                QueryStrategy::CatalogNumber,
                QueryStrategy::ArtistTitle,
                QueryStrategy::TitleProbe
            ]
        );
    }
}
