// SPDX-License-Identifier: GPL-3.0-or-later

//! Smart metadata matching engine.
//!
//! Reconciles a local file's tags and filename against a catalog search
//! service and proposes high-confidence metadata, either per track or for a
//! whole set of files mapped onto one release.

pub mod assignment;
pub mod catalog;
pub mod duration;
pub mod error;
pub mod filename_parser;
pub mod metadata;
pub mod orchestrator;
pub mod query_planner;
pub mod resolution;
pub mod scoring;
pub mod similarity;
pub mod tag_store;
pub mod worker_pool;

pub use assignment::AlbumAssignmentSolver;
pub use catalog::{CatalogError, CatalogSearch};
pub use duration::DurationReconciler;
pub use error::{MatchError, MatchResult};
pub use filename_parser::{FilenameFormat, FormatError};
pub use metadata::{MergedMetadata, PreparedTrack};
pub use orchestrator::{MatchOrchestrator, MatchSettings};
pub use query_planner::{plan, plan_release, PlannedQuery, QueryPlan};
pub use resolution::{
    AlbumResolution, AttemptOutcome, ProgressCallback, ResolutionOutcome, ResolveMode, ResolveOutput,
    ResolveProgress, StrategyAttempt, TrackResolution,
};
pub use scoring::CandidateScorer;
pub use tag_store::{InMemoryTagStore, TagStore, TagStoreError};
pub use worker_pool::WorkerPool;
