// SPDX-License-Identifier: GPL-3.0-or-later

use serde::Serialize;
use thiserror::Error;

/// Why a local track could not be resolved.
///
/// Errors are per item: one track failing never aborts its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum MatchError {
    /// The filename matched none of the known templates.
    #[error("could not parse filename: {0}")]
    ParseAmbiguous(String),

    #[error("no candidate cleared the acceptance threshold")]
    NoCandidate,

    /// Every attempted catalog query failed at transport level.
    #[error("catalog service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("catalog track {track_index} was assigned to more than one local track")]
    AssignmentConflict { track_index: usize },

    #[error("resolution was cancelled")]
    Cancelled,

    /// The task resolving this item panicked or was aborted.
    #[error("resolution task failed: {0}")]
    WorkerFailed(String),
}

pub type MatchResult<T> = Result<T, MatchError>;
