// SPDX-License-Identifier: GPL-3.0-or-later

//! One-to-one mapping of local tracks onto the tracklist of one release.
//!
//! Greedy: every (local, catalog track) pair is scored, then pairs are taken
//! in descending confidence order, skipping pairs where either side is
//! already taken. This is an approximation of the optimal assignment; an
//! exact solver (Hungarian) can replace it behind the same signature.

use crate::error::{MatchError, MatchResult};
use crate::metadata::PreparedTrack;
use crate::scoring::CandidateScorer;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tagnexus_domain::{
    AlbumAssignment, AssignmentEntry, AssignmentTarget, CatalogRecord, MatchCandidate, QueryStrategy,
};
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlbumAssignmentSolver {
    scorer: CandidateScorer,
    acceptance_threshold: f32,
}

impl AlbumAssignmentSolver {
    pub fn new(scorer: CandidateScorer, acceptance_threshold: f32) -> Self {
        Self {
            scorer,
            acceptance_threshold,
        }
    }

    /// Assign local tracks to catalog tracks. Entries keep input order.
    pub fn assign(
        &self,
        local_tracks: &[PreparedTrack],
        record: &Arc<CatalogRecord>,
        strategy: QueryStrategy,
    ) -> MatchResult<AlbumAssignment> {
        let mut best_rejected: Vec<Option<f32>> = vec![None; local_tracks.len()];
        let mut edges: Vec<(usize, MatchCandidate)> = Vec::new();

        for (local_index, prepared) in local_tracks.iter().enumerate() {
            for track_index in 0..record.tracks.len() {
                let Some(candidate) = self.scorer.score(
                    strategy,
                    &prepared.track,
                    &prepared.metadata,
                    record,
                    Some(track_index),
                ) else {
                    continue;
                };

                let best = &mut best_rejected[local_index];
                *best = Some(best.map_or(candidate.confidence(), |b| b.max(candidate.confidence())));

                if candidate.confidence() >= self.acceptance_threshold {
                    edges.push((local_index, candidate));
                }
            }
        }

        edges.sort_by(|(left_local, left), (right_local, right)| {
            right
                .confidence()
                .total_cmp(&left.confidence())
                .then_with(|| {
                    local_tracks[*left_local]
                        .track
                        .id
                        .cmp(&local_tracks[*right_local].track.id)
                })
                .then_with(|| left.track_index.cmp(&right.track_index))
        });

        let mut taken_locals: HashSet<usize> = HashSet::new();
        let mut taken_tracks: HashSet<usize> = HashSet::new();
        let mut assigned: BTreeMap<usize, MatchCandidate> = BTreeMap::new();

        for (local_index, candidate) in edges {
            let Some(track_index) = candidate.track_index else {
                continue;
            };
            if taken_locals.contains(&local_index) || taken_tracks.contains(&track_index) {
                continue;
            }
            taken_locals.insert(local_index);
            taken_tracks.insert(track_index);
            assigned.insert(local_index, candidate);
        }

        let entries = local_tracks
            .iter()
            .enumerate()
            .map(|(local_index, prepared)| {
                let target = match assigned.remove(&local_index) {
                    Some(candidate) => AssignmentTarget::Assigned { candidate },
                    None => AssignmentTarget::Unresolved {
                        best_rejected_confidence: best_rejected[local_index],
                    },
                };
                AssignmentEntry {
                    local_track_id: prepared.track.id.clone(),
                    target,
                }
            })
            .collect();

        let assignment = AlbumAssignment { entries };
        if let Some(track_index) = duplicated_target(&assignment) {
            error!(target: "assignment", track_index, "catalog track assigned twice");
            return Err(MatchError::AssignmentConflict { track_index });
        }

        debug!(
            target: "assignment",
            release = %record.title,
            assigned = assignment.assigned().count(),
            unresolved = assignment.unresolved().count(),
            total_confidence = assignment.total_confidence(),
            "album assignment computed"
        );
        Ok(assignment)
    }
}

fn duplicated_target(assignment: &AlbumAssignment) -> Option<usize> {
    if assignment.is_injective() {
        return None;
    }
    let mut seen = HashSet::new();
    assignment
        .assigned()
        .filter_map(|candidate| candidate.track_index)
        .find(|track_index| !seen.insert(*track_index))
}
