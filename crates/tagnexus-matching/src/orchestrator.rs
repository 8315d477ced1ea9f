// SPDX-License-Identifier: GPL-3.0-or-later

//! Single, album and batch resolution workflows.

use crate::assignment::AlbumAssignmentSolver;
use crate::catalog::{CatalogError, CatalogSearch};
use crate::duration::DurationReconciler;
use crate::error::MatchError;
use crate::filename_parser::{self, FilenameFormat};
use crate::metadata::{MergedMetadata, PreparedTrack};
use crate::query_planner::{plan_merged, plan_release, PlannedQuery};
use crate::resolution::{
    AlbumResolution, AttemptOutcome, ProgressCallback, ResolutionOutcome, ResolveMode, ResolveOutput,
    ResolveProgress, StrategyAttempt, TrackResolution,
};
use crate::scoring::{rank, select_best, CandidateScorer};
use crate::similarity::normalize_for_match;
use crate::worker_pool::WorkerPool;
use std::sync::Arc;
use tagnexus_config::{BatchConfig, MatchingConfig};
use tagnexus_domain::{
    AlbumAssignment, AssignmentEntry, AssignmentTarget, CatalogRecord, LocalTrack, LocalTrackId,
    MatchCandidate, ParsedFilenameGuess, QueryStrategy, TagKey, TagMap,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Validated engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSettings {
    pub acceptance_threshold: f32,
    pub high_confidence_threshold: f32,
    pub max_alternatives: usize,
    pub album_release_candidates: usize,
    pub max_concurrent_resolutions: usize,
}

impl MatchSettings {
    pub fn from_config(matching: &MatchingConfig, batch: &BatchConfig) -> Self {
        let defaults = MatchingConfig::default();
        let acceptance_threshold = clamp_threshold(
            "acceptance_threshold",
            matching.acceptance_threshold,
            defaults.acceptance_threshold,
        );
        let high_confidence_threshold = clamp_threshold(
            "high_confidence_threshold",
            matching.high_confidence_threshold,
            defaults.high_confidence_threshold,
        );
        if high_confidence_threshold < acceptance_threshold {
            warn!(
                target: "orchestrator",
                acceptance_threshold,
                high_confidence_threshold,
                "high confidence threshold is below acceptance threshold"
            );
        }

        Self {
            acceptance_threshold,
            high_confidence_threshold,
            max_alternatives: matching.max_alternatives,
            album_release_candidates: matching.album_release_candidates.max(1),
            max_concurrent_resolutions: batch.max_concurrent_resolutions.max(1),
        }
    }
}

fn clamp_threshold(name: &str, value: f32, non_finite_default: f32) -> f32 {
    if !value.is_finite() {
        warn!(target: "orchestrator", name, value, "threshold is not finite, using default {non_finite_default}");
        return non_finite_default;
    }
    if !(0.0..=1.0).contains(&value) {
        let clamped = value.clamp(0.0, 1.0);
        warn!(target: "orchestrator", name, value, clamped, "threshold out of [0.0, 1.0] range, clamping");
        return clamped;
    }
    value
}

struct Inner<C> {
    catalog: C,
    settings: MatchSettings,
    scorer: CandidateScorer,
    solver: AlbumAssignmentSolver,
    pool: WorkerPool,
    filename_format: Option<FilenameFormat>,
}

/// Entry point of the matching engine. Cheap to clone.
pub struct MatchOrchestrator<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for MatchOrchestrator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Result of running one planned query.
enum SearchOutcome {
    Records(Vec<CatalogRecord>),
    Failed(CatalogError),
    Cancelled,
}

impl<C> MatchOrchestrator<C>
where
    C: CatalogSearch + 'static,
{
    pub fn new(catalog: C, matching: &MatchingConfig, batch: &BatchConfig) -> Self {
        let settings = MatchSettings::from_config(matching, batch);
        let defaults = MatchingConfig::default();
        let similarity_floor = clamp_threshold(
            "similarity_floor",
            matching.similarity_floor,
            defaults.similarity_floor,
        );
        let tie_epsilon = if matching.tie_epsilon.is_finite() {
            matching.tie_epsilon.abs()
        } else {
            defaults.tie_epsilon
        };

        let scorer = CandidateScorer::new(
            DurationReconciler::new(matching.duration_tolerance_seconds),
            similarity_floor,
            tie_epsilon,
        );
        let solver = AlbumAssignmentSolver::new(scorer, settings.acceptance_threshold);
        let pool = WorkerPool::new(settings.max_concurrent_resolutions);
        let filename_format = matching.filename_format.as_deref().and_then(|format| {
            FilenameFormat::new(format)
                .map_err(|error| warn!(target: "orchestrator", %error, "ignoring filename format"))
                .ok()
        });

        info!(
            target: "orchestrator",
            acceptance = settings.acceptance_threshold,
            high_confidence = settings.high_confidence_threshold,
            workers = settings.max_concurrent_resolutions,
            "match orchestrator ready"
        );

        Self {
            inner: Arc::new(Inner {
                catalog,
                settings,
                scorer,
                solver,
                pool,
                filename_format,
            }),
        }
    }

    pub fn with_defaults(catalog: C) -> Self {
        Self::new(catalog, &MatchingConfig::default(), &BatchConfig::default())
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.inner.settings
    }

    /// Parse the filename with the configured format, falling back to the
    /// built-in layouts when it does not apply.
    fn prepare(&self, track: LocalTrack) -> PreparedTrack {
        let guess = self
            .inner
            .filename_format
            .as_ref()
            .map(|format| format.parse(&track.filename_raw))
            .filter(|guess| !guess.is_empty())
            .unwrap_or_else(|| filename_parser::parse(&track.filename_raw));
        PreparedTrack::with_guess(track, guess)
    }

    /// Pick the workflow from the shape of the input: one track is a single
    /// resolution, tracks sharing a catalog number or album are an album,
    /// anything else is a batch.
    pub fn detect_mode(tracks: &[PreparedTrack]) -> ResolveMode {
        match tracks.len() {
            0 => ResolveMode::Batch,
            1 => ResolveMode::Single,
            _ if shared_catalog_number(tracks).is_some() || shared_album(tracks).is_some() => {
                ResolveMode::Album
            }
            _ => ResolveMode::Batch,
        }
    }

    pub async fn resolve(
        &self,
        tracks: Vec<LocalTrack>,
        cancel: &CancellationToken,
        progress: Option<ProgressCallback>,
    ) -> ResolveOutput {
        let prepared: Vec<PreparedTrack> = tracks.into_iter().map(|track| self.prepare(track)).collect();
        let mode = Self::detect_mode(&prepared);
        info!(target: "orchestrator", ?mode, tracks = prepared.len(), "resolving");

        match mode {
            ResolveMode::Single => {
                let mut prepared = prepared;
                let Some(track) = prepared.pop() else {
                    return ResolveOutput::Batch(Vec::new());
                };
                let resolution = self.resolve_prepared(track, cancel).await;
                report(&progress, 1, 1, &resolution.local_track_id, resolution.is_matched());
                ResolveOutput::Single(resolution)
            }
            ResolveMode::Album => {
                let album = self.resolve_album_prepared(&prepared, cancel).await;
                let total = album.assignment.entries.len();
                for (index, entry) in album.assignment.entries.iter().enumerate() {
                    report(&progress, index + 1, total, &entry.local_track_id, entry.candidate().is_some());
                }
                ResolveOutput::Album(album)
            }
            ResolveMode::Batch => {
                ResolveOutput::Batch(self.resolve_batch_prepared(prepared, cancel, progress).await)
            }
        }
    }

    /// Resolve one track on its own.
    pub async fn resolve_one(&self, track: LocalTrack, cancel: &CancellationToken) -> TrackResolution {
        self.resolve_prepared(self.prepare(track), cancel).await
    }

    /// Resolve tracks believed to form one release.
    pub async fn resolve_album(
        &self,
        tracks: Vec<LocalTrack>,
        cancel: &CancellationToken,
    ) -> AlbumResolution {
        let prepared: Vec<PreparedTrack> = tracks.into_iter().map(|track| self.prepare(track)).collect();
        self.resolve_album_prepared(&prepared, cancel).await
    }

    /// Resolve tracks independently on the worker pool. Output order equals
    /// input order.
    pub async fn resolve_batch(
        &self,
        tracks: Vec<LocalTrack>,
        cancel: &CancellationToken,
        progress: Option<ProgressCallback>,
    ) -> Vec<TrackResolution> {
        let prepared: Vec<PreparedTrack> = tracks.into_iter().map(|track| self.prepare(track)).collect();
        self.resolve_batch_prepared(prepared, cancel, progress).await
    }

    async fn resolve_batch_prepared(
        &self,
        prepared: Vec<PreparedTrack>,
        cancel: &CancellationToken,
        progress: Option<ProgressCallback>,
    ) -> Vec<TrackResolution> {
        let total = prepared.len();
        let ids: Vec<_> = prepared.iter().map(|item| item.track.id.clone()).collect();
        let guesses: Vec<ParsedFilenameGuess> = prepared.iter().map(|item| item.guess.clone()).collect();

        let work = {
            let this = self.clone();
            let cancel = cancel.clone();
            move |item: PreparedTrack| {
                let this = this.clone();
                let cancel = cancel.clone();
                async move { this.resolve_prepared(item, &cancel).await }
            }
        };

        let mut completed = 0;
        let results = self
            .inner
            .pool
            .run(prepared, work, |index, result| {
                completed += 1;
                let matched = result.as_ref().map(TrackResolution::is_matched).unwrap_or(false);
                report(&progress, completed, total, &ids[index], matched);
            })
            .await;

        let resolutions: Vec<TrackResolution> = results
            .into_iter()
            .enumerate()
            .map(|(index, result)| match result {
                Ok(resolution) => resolution,
                Err(error) => {
                    let mut resolution =
                        TrackResolution::unresolved(ids[index].clone(), MatchError::WorkerFailed(error.to_string()));
                    resolution.guess = guesses[index].clone();
                    resolution
                }
            })
            .collect();

        info!(
            target: "orchestrator",
            total,
            matched = resolutions.iter().filter(|resolution| resolution.is_matched()).count(),
            "batch resolved"
        );
        resolutions
    }

    async fn search(&self, planned: &PlannedQuery, cancel: &CancellationToken) -> SearchOutcome {
        if cancel.is_cancelled() {
            return SearchOutcome::Cancelled;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => SearchOutcome::Cancelled,
            result = self.inner.catalog.search(&planned.query) => match result {
                Ok(records) => SearchOutcome::Records(records),
                Err(error) => SearchOutcome::Failed(error),
            },
        }
    }

    async fn resolve_prepared(&self, prepared: PreparedTrack, cancel: &CancellationToken) -> TrackResolution {
        let settings = &self.inner.settings;
        let scorer = &self.inner.scorer;
        let epsilon = scorer.tie_epsilon();

        let mut attempts: Vec<StrategyAttempt> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut candidates: Vec<MatchCandidate> = Vec::new();
        let mut last_strategy: Option<QueryStrategy> = None;
        let mut last_failure: Option<String> = None;

        for (position, planned) in plan_merged(&prepared.metadata).enumerate() {
            if planned.strategy.is_fallback()
                && candidates
                    .iter()
                    .any(|candidate| candidate.confidence() >= settings.acceptance_threshold)
            {
                debug!(target: "orchestrator", local = %prepared.track.id, "acceptable candidate found, skipping title probe");
                break;
            }

            last_strategy = Some(planned.strategy);
            let outcome = match self.search(&planned, cancel).await {
                SearchOutcome::Cancelled => {
                    attempts.push(StrategyAttempt {
                        strategy: planned.strategy,
                        query: planned.query,
                        outcome: AttemptOutcome::Cancelled,
                    });
                    return self.finish(prepared, candidates, attempts, warnings, last_strategy, Some(MatchError::Cancelled));
                }
                SearchOutcome::Failed(error) => {
                    warn!(target: "orchestrator", local = %prepared.track.id, strategy = %planned.strategy, %error, "catalog query failed");
                    if position == 0 {
                        warnings.push(format!("{} lookup failed: {}", planned.strategy, error));
                    }
                    last_failure = Some(error.to_string());
                    AttemptOutcome::Failed {
                        message: error.to_string(),
                    }
                }
                SearchOutcome::Records(records) if records.is_empty() => AttemptOutcome::Empty,
                SearchOutcome::Records(records) => {
                    let record_count = records.len();
                    let mut found = 0;
                    for record in records {
                        let record = Arc::new(record);
                        if let Some(candidate) =
                            scorer.best_for_record(planned.strategy, &prepared.track, &prepared.metadata, &record)
                        {
                            found += 1;
                            merge_candidate(&mut candidates, candidate, epsilon);
                        }
                    }
                    AttemptOutcome::Found {
                        records: record_count,
                        candidates: found,
                    }
                }
            };
            attempts.push(StrategyAttempt {
                strategy: planned.strategy,
                query: planned.query,
                outcome,
            });

            if select_best(&candidates, epsilon)
                .is_some_and(|best| best.confidence() >= settings.high_confidence_threshold)
            {
                debug!(target: "orchestrator", local = %prepared.track.id, "high confidence candidate found, stopping");
                break;
            }
        }

        let all_failed = !attempts.is_empty() && attempts.iter().all(StrategyAttempt::failed);
        let failure = if all_failed {
            Some(MatchError::ServiceUnavailable(last_failure.unwrap_or_default()))
        } else {
            None
        };
        self.finish(prepared, candidates, attempts, warnings, last_strategy, failure)
    }

    fn finish(
        &self,
        prepared: PreparedTrack,
        mut candidates: Vec<MatchCandidate>,
        attempts: Vec<StrategyAttempt>,
        warnings: Vec<String>,
        last_strategy: Option<QueryStrategy>,
        failure: Option<MatchError>,
    ) -> TrackResolution {
        let settings = &self.inner.settings;
        let epsilon = self.inner.scorer.tie_epsilon();

        let best_index = if failure.is_some() {
            None
        } else {
            let accepted: Vec<MatchCandidate> = candidates
                .iter()
                .filter(|candidate| candidate.confidence() >= settings.acceptance_threshold)
                .cloned()
                .collect();
            select_best(&accepted, epsilon).and_then(|best| candidates.iter().position(|candidate| candidate == best))
        };

        let outcome = match best_index {
            Some(index) => ResolutionOutcome::Matched {
                candidate: candidates.remove(index),
            },
            None => ResolutionOutcome::Unresolved {
                reason: failure.unwrap_or(MatchError::NoCandidate),
                last_strategy,
                best_rejected_confidence: candidates
                    .iter()
                    .map(MatchCandidate::confidence)
                    .fold(None, |best: Option<f32>, confidence| {
                        Some(best.map_or(confidence, |best| best.max(confidence)))
                    }),
            },
        };

        rank(&mut candidates);
        candidates.truncate(settings.max_alternatives);

        match &outcome {
            ResolutionOutcome::Matched { candidate } => debug!(
                target: "orchestrator",
                local = %prepared.track.id,
                confidence = candidate.confidence(),
                strategy = %candidate.strategy(),
                "track matched"
            ),
            ResolutionOutcome::Unresolved { reason, .. } => debug!(
                target: "orchestrator",
                local = %prepared.track.id,
                %reason,
                "track unresolved"
            ),
        }

        TrackResolution {
            local_track_id: prepared.track.id,
            guess: prepared.guess,
            outcome,
            alternatives: candidates,
            attempts,
            warnings,
        }
    }

    async fn resolve_album_prepared(&self, tracks: &[PreparedTrack], cancel: &CancellationToken) -> AlbumResolution {
        let shared = shared_metadata(tracks);
        let mut attempts: Vec<StrategyAttempt> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut last_failure: Option<String> = None;
        let mut found: Option<(QueryStrategy, Vec<CatalogRecord>)> = None;

        for (position, planned) in plan_release(&shared).enumerate() {
            let outcome = match self.search(&planned, cancel).await {
                SearchOutcome::Cancelled => {
                    attempts.push(StrategyAttempt {
                        strategy: planned.strategy,
                        query: planned.query,
                        outcome: AttemptOutcome::Cancelled,
                    });
                    return unassigned(tracks, attempts, warnings, MatchError::Cancelled);
                }
                SearchOutcome::Failed(error) => {
                    warn!(target: "orchestrator", strategy = %planned.strategy, %error, "release query failed");
                    if position == 0 {
                        warnings.push(format!("{} lookup failed: {}", planned.strategy, error));
                    }
                    last_failure = Some(error.to_string());
                    AttemptOutcome::Failed {
                        message: error.to_string(),
                    }
                }
                SearchOutcome::Records(records) => {
                    let record_count = records.len();
                    let with_tracks: Vec<CatalogRecord> =
                        records.into_iter().filter(|record| !record.tracks.is_empty()).collect();
                    let usable = with_tracks.len();
                    if usable > 0 {
                        found = Some((planned.strategy, with_tracks));
                    }
                    if record_count == 0 {
                        AttemptOutcome::Empty
                    } else {
                        AttemptOutcome::Found {
                            records: record_count,
                            candidates: usable,
                        }
                    }
                }
            };
            attempts.push(StrategyAttempt {
                strategy: planned.strategy,
                query: planned.query,
                outcome,
            });
            if found.is_some() {
                break;
            }
        }

        let Some((strategy, records)) = found else {
            let all_failed = !attempts.is_empty() && attempts.iter().all(StrategyAttempt::failed);
            let failure = if all_failed {
                MatchError::ServiceUnavailable(last_failure.unwrap_or_default())
            } else {
                MatchError::NoCandidate
            };
            return unassigned(tracks, attempts, warnings, failure);
        };

        let epsilon = self.inner.scorer.tie_epsilon();
        let mut best: Option<(Arc<CatalogRecord>, AlbumAssignment)> = None;
        let mut conflict: Option<MatchError> = None;

        for record in records.into_iter().take(self.inner.settings.album_release_candidates) {
            let record = Arc::new(record);
            match self.inner.solver.assign(tracks, &record, strategy) {
                Ok(assignment) => {
                    let better = best.as_ref().map_or(true, |(_, current)| {
                        assignment.total_confidence() > current.total_confidence() + epsilon
                    });
                    if better {
                        best = Some((record, assignment));
                    }
                }
                Err(error) => {
                    warn!(target: "orchestrator", release = %record.title, %error, "skipping release");
                    warnings.push(format!("{}: {}", record.title, error));
                    conflict = Some(error);
                }
            }
        }

        match best {
            Some((record, assignment)) => {
                info!(
                    target: "orchestrator",
                    release = %record.title,
                    assigned = assignment.assigned().count(),
                    total = tracks.len(),
                    "album resolved"
                );
                AlbumResolution {
                    release: Some(record),
                    strategy: Some(strategy),
                    assignment,
                    failure: None,
                    attempts,
                    warnings,
                }
            }
            None => unassigned(
                tracks,
                attempts,
                warnings,
                conflict.unwrap_or(MatchError::NoCandidate),
            ),
        }
    }
}

fn unassigned(
    tracks: &[PreparedTrack],
    attempts: Vec<StrategyAttempt>,
    warnings: Vec<String>,
    failure: MatchError,
) -> AlbumResolution {
    info!(target: "orchestrator", %failure, total = tracks.len(), "album unresolved");
    AlbumResolution {
        release: None,
        strategy: None,
        assignment: AlbumAssignment {
            entries: tracks
                .iter()
                .map(|prepared| AssignmentEntry {
                    local_track_id: prepared.track.id.clone(),
                    target: AssignmentTarget::Unresolved {
                        best_rejected_confidence: None,
                    },
                })
                .collect(),
        },
        failure: Some(failure),
        attempts,
        warnings,
    }
}

/// Keep one candidate per release track; a later duplicate only replaces the
/// earlier one when it clearly scores higher.
fn merge_candidate(candidates: &mut Vec<MatchCandidate>, candidate: MatchCandidate, epsilon: f32) {
    let same_target = |existing: &MatchCandidate| {
        existing.track_index == candidate.track_index
            && match (existing.record.release_id, candidate.record.release_id) {
                (Some(left), Some(right)) => left == right,
                _ => existing.record.title == candidate.record.title && existing.record.artist == candidate.record.artist,
            }
    };

    match candidates.iter().position(same_target) {
        Some(index) => {
            if candidate.confidence() > candidates[index].confidence() + epsilon {
                candidates[index] = candidate;
            }
        }
        None => candidates.push(candidate),
    }
}

fn report(
    progress: &Option<ProgressCallback>,
    completed: usize,
    total: usize,
    local_track_id: &LocalTrackId,
    matched: bool,
) {
    if let Some(callback) = progress {
        callback(ResolveProgress {
            completed,
            total,
            local_track_id: local_track_id.clone(),
            matched,
        });
    }
}

fn normalized_catalog_number(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}

/// The catalog number every track carries, if they all carry the same one.
fn shared_catalog_number(tracks: &[PreparedTrack]) -> Option<String> {
    shared_value(tracks, TagKey::CatalogNumber, normalized_catalog_number)
}

/// The album every track names, compared after normalization.
fn shared_album(tracks: &[PreparedTrack]) -> Option<String> {
    shared_value(tracks, TagKey::Album, normalize_for_match)
}

fn shared_value(tracks: &[PreparedTrack], key: TagKey, normalize: fn(&str) -> String) -> Option<String> {
    let first = tracks.first()?.metadata.get(key)?;
    let expected = normalize(first);
    if expected.is_empty() {
        return None;
    }
    tracks
        .iter()
        .all(|prepared| prepared.metadata.get(key).map(normalize).as_deref() == Some(expected.as_str()))
        .then(|| first.to_string())
}

/// Most frequent value of a field across tracks; earlier wins ties.
fn most_common(tracks: &[PreparedTrack], key: TagKey) -> Option<String> {
    let mut counts: Vec<(String, String, usize)> = Vec::new();
    for value in tracks.iter().filter_map(|prepared| prepared.metadata.get(key)) {
        let normalized = normalize_for_match(value);
        if normalized.is_empty() {
            continue;
        }
        match counts.iter_mut().find(|(existing, _, _)| *existing == normalized) {
            Some((_, _, count)) => *count += 1,
            None => counts.push((normalized, value.to_string(), 1)),
        }
    }

    let mut best: Option<&(String, String, usize)> = None;
    for entry in &counts {
        if best.map_or(true, |current| entry.2 > current.2) {
            best = Some(entry);
        }
    }
    best.map(|(_, value, _)| value.clone())
}

/// Release-level metadata shared by an album's tracks.
fn shared_metadata(tracks: &[PreparedTrack]) -> MergedMetadata {
    let mut tags = TagMap::new();
    if let Some(catalog_number) = shared_catalog_number(tracks) {
        tags.insert(TagKey::CatalogNumber, catalog_number);
    }
    for key in [TagKey::Album, TagKey::Artist] {
        if let Some(value) = most_common(tracks, key) {
            tags.insert(key, value);
        }
    }
    MergedMetadata::merge(&tags, &ParsedFilenameGuess::new())
}
