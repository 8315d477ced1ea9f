// SPDX-License-Identifier: GPL-3.0-or-later

//! Result values produced by the orchestrator.

use crate::error::MatchError;
use serde::Serialize;
use std::sync::Arc;
use tagnexus_domain::{
    AlbumAssignment, CatalogQuery, CatalogRecord, LocalTrackId, MatchCandidate, ParsedFilenameGuess,
    QueryStrategy, TagMap,
};

/// What one catalog query produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Found { records: usize, candidates: usize },
    Empty,
    Failed { message: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyAttempt {
    pub strategy: QueryStrategy,
    pub query: CatalogQuery,
    pub outcome: AttemptOutcome,
}

impl StrategyAttempt {
    pub fn failed(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Matched {
        candidate: MatchCandidate,
    },
    Unresolved {
        reason: MatchError,
        /// `None` when no strategy could be planned or attempted.
        last_strategy: Option<QueryStrategy>,
        best_rejected_confidence: Option<f32>,
    },
}

/// Outcome for one local track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackResolution {
    pub local_track_id: LocalTrackId,
    pub guess: ParsedFilenameGuess,
    pub outcome: ResolutionOutcome,
    /// Runner-up candidates, best first, for manual override.
    pub alternatives: Vec<MatchCandidate>,
    pub attempts: Vec<StrategyAttempt>,
    pub warnings: Vec<String>,
}

impl TrackResolution {
    pub fn unresolved(local_track_id: LocalTrackId, reason: MatchError) -> Self {
        Self {
            local_track_id,
            guess: ParsedFilenameGuess::new(),
            outcome: ResolutionOutcome::Unresolved {
                reason,
                last_strategy: None,
                best_rejected_confidence: None,
            },
            alternatives: Vec::new(),
            attempts: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn candidate(&self) -> Option<&MatchCandidate> {
        match &self.outcome {
            ResolutionOutcome::Matched { candidate } => Some(candidate),
            ResolutionOutcome::Unresolved { .. } => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.candidate().is_some()
    }

    pub fn reason(&self) -> Option<&MatchError> {
        match &self.outcome {
            ResolutionOutcome::Matched { .. } => None,
            ResolutionOutcome::Unresolved { reason, .. } => Some(reason),
        }
    }

    pub fn proposed_tags(&self) -> Option<TagMap> {
        self.candidate().map(MatchCandidate::proposed_tags)
    }
}

/// Outcome for a set of local tracks resolved against one release.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumResolution {
    /// The release the tracks were assigned to, if one was found.
    pub release: Option<Arc<CatalogRecord>>,
    pub strategy: Option<QueryStrategy>,
    pub assignment: AlbumAssignment,
    /// Why no release could be used, when `release` is `None`.
    pub failure: Option<MatchError>,
    pub attempts: Vec<StrategyAttempt>,
    pub warnings: Vec<String>,
}

impl AlbumResolution {
    /// Reason a given track stayed unresolved, or `None` if it was assigned.
    pub fn reason_for(&self, local_track_id: &LocalTrackId) -> Option<MatchError> {
        let entry = self.assignment.get(local_track_id)?;
        if entry.candidate().is_some() {
            return None;
        }
        Some(self.failure.clone().unwrap_or(MatchError::NoCandidate))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveMode {
    Single,
    Album,
    Batch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "result", rename_all = "snake_case")]
pub enum ResolveOutput {
    Single(TrackResolution),
    Album(AlbumResolution),
    Batch(Vec<TrackResolution>),
}

impl ResolveOutput {
    pub fn mode(&self) -> ResolveMode {
        match self {
            ResolveOutput::Single(_) => ResolveMode::Single,
            ResolveOutput::Album(_) => ResolveMode::Album,
            ResolveOutput::Batch(_) => ResolveMode::Batch,
        }
    }

    /// Every accepted candidate, in input order.
    pub fn matched_candidates(&self) -> Vec<&MatchCandidate> {
        match self {
            ResolveOutput::Single(resolution) => resolution.candidate().into_iter().collect(),
            ResolveOutput::Album(album) => album.assignment.assigned().collect(),
            ResolveOutput::Batch(resolutions) => resolutions
                .iter()
                .filter_map(TrackResolution::candidate)
                .collect(),
        }
    }
}

/// Reported after each item completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolveProgress {
    pub completed: usize,
    pub total: usize,
    pub local_track_id: LocalTrackId,
    pub matched: bool,
}

pub type ProgressCallback = Arc<dyn Fn(ResolveProgress) + Send + Sync>;
