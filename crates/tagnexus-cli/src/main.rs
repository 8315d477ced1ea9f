// SPDX-License-Identifier: GPL-3.0-or-later
mod lofty_store;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use lofty_store::LoftyTagStore;
use tagnexus_config::{load as load_config, DiscogsConfig};
use tagnexus_discogs::DiscogsClient;
use tagnexus_domain::{LocalTrack, LocalTrackId, TagMap};
use tagnexus_matching::filename_parser::{resolve_format, sanitize_filename};
use tagnexus_matching::{
    FilenameFormat, MatchOrchestrator, ProgressCallback, ResolveOutput, ResolveProgress, TagStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "tagnexus", version)]
#[command(about = "Propose catalog metadata for audio files")]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write proposed tags back to matched files
    #[arg(long)]
    apply: bool,

    /// Minimum confidence for --apply (default: the high confidence threshold)
    #[arg(long)]
    min_apply_confidence: Option<f32>,

    /// Filename layout such as "%artist% - %title%", tried before the built-in layouts
    #[arg(long)]
    filename_format: Option<String>,

    /// Rename applied files after their new tags, e.g. "%track% - %title%"
    #[arg(long, requires = "apply")]
    rename_format: Option<String>,

    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    init_tracing(&config.telemetry.log_level);

    if let Some(format) = &args.filename_format {
        FilenameFormat::new(format)?;
        config.matching.filename_format = Some(format.clone());
    }

    let client = discogs_client(&config.discogs)?;
    let orchestrator = MatchOrchestrator::new(client, &config.matching, &config.batch);
    let store = LoftyTagStore::new();

    let tracks: Vec<LocalTrack> = args.files.iter().map(|path| load_track(&store, path)).collect();

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_interrupt(cancel.clone()));

    let progress: ProgressCallback = std::sync::Arc::new(|update: ResolveProgress| {
        info!(
            target: "cli",
            completed = update.completed,
            total = update.total,
            local = %update.local_track_id,
            matched = update.matched,
            "progress"
        );
    });
    let output = orchestrator.resolve(tracks, &cancel, Some(progress)).await;

    println!("{}", serde_json::to_string_pretty(&output)?);

    if args.apply {
        if cancel.is_cancelled() {
            warn!(target: "cli", "cancelled, not writing tags");
            return Ok(());
        }
        let threshold = args
            .min_apply_confidence
            .unwrap_or(orchestrator.settings().high_confidence_threshold);
        apply_tags(&store, &output, threshold, args.rename_format.as_deref());
    }

    Ok(())
}

fn init_tracing(default_level: &str) {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn discogs_client(config: &DiscogsConfig) -> Result<DiscogsClient> {
    let mut builder = DiscogsClient::builder()
        .max_concurrent_requests(config.max_concurrent_requests)
        .min_request_interval(Duration::from_millis(config.min_request_interval_ms))
        .results_per_query(config.results_per_query)
        .timeout(Duration::from_secs(config.timeout_secs));
    if let Some(token) = &config.token {
        builder = builder.token(token.as_str());
    } else {
        warn!(target: "cli", "no Discogs token configured, requests are unauthenticated");
    }
    if let Some(base_url) = &config.base_url {
        builder = builder.base_url(base_url.as_str());
    }
    Ok(builder.build()?)
}

/// Unreadable files are still matched on their filename alone.
fn load_track(store: &impl TagStore, path: &Path) -> LocalTrack {
    store.load_track(path).unwrap_or_else(|error| {
        warn!(target: "cli", path = %path.display(), %error, "could not read tags");
        LocalTrack::from_path(path)
    })
}

/// Proposed tags for every matched item at or above `threshold`.
fn applicable(output: &ResolveOutput, threshold: f32) -> Vec<(LocalTrackId, TagMap)> {
    output
        .matched_candidates()
        .into_iter()
        .filter(|candidate| candidate.confidence() >= threshold)
        .map(|candidate| (candidate.local_track_id.clone(), candidate.proposed_tags()))
        .collect()
}

fn apply_tags(store: &impl TagStore, output: &ResolveOutput, threshold: f32, rename_format: Option<&str>) {
    for (local_track_id, tags) in applicable(output, threshold) {
        let path = Path::new(local_track_id.as_str());
        match store.write(path, &tags) {
            Ok(()) => info!(target: "cli", path = %path.display(), "tags applied"),
            Err(error) => {
                warn!(target: "cli", path = %path.display(), %error, "could not write tags");
                continue;
            }
        }
        if let Some(format) = rename_format {
            rename_file(path, format, &tags);
        }
    }
}

/// Target name for `path` built from `format`, keeping the extension.
/// `None` when the name would be empty, unchanged, or already taken.
fn renamed_path(path: &Path, format: &str, tags: &TagMap) -> Option<PathBuf> {
    let stem = sanitize_filename(&resolve_format(format, tags));
    if stem.is_empty() {
        return None;
    }
    let name = match path.extension().and_then(|extension| extension.to_str()) {
        Some(extension) => format!("{stem}.{extension}"),
        None => stem,
    };
    let target = path.with_file_name(name);
    (target != path && !target.exists()).then_some(target)
}

fn rename_file(path: &Path, format: &str, tags: &TagMap) {
    let Some(target) = renamed_path(path, format, tags) else {
        debug!(target: "cli", path = %path.display(), "not renamed");
        return;
    };
    match std::fs::rename(path, &target) {
        Ok(()) => info!(target: "cli", from = %path.display(), to = %target.display(), "file renamed"),
        Err(error) => warn!(target: "cli", path = %path.display(), %error, "could not rename file"),
    }
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!(target: "cli", "interrupt received, cancelling");
        cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tagnexus_domain::{CatalogRecord, CatalogTrack, MatchCandidate, QueryStrategy, ScoreBreakdown, TagKey};
    use tagnexus_matching::{InMemoryTagStore, MatchError, ResolutionOutcome, TrackResolution};

    fn candidate(id: &str, string_similarity: f32) -> MatchCandidate {
        let record = CatalogRecord::new("Discovery", "Daft Punk")
            .with_catalog_number("V2940")
            .with_track(CatalogTrack::new("Aerodynamic", "2").with_duration(212.0));
        MatchCandidate::new(
            LocalTrackId::new(id),
            Arc::new(record),
            Some(0),
            QueryStrategy::ArtistTitle,
            ScoreBreakdown {
                string_similarity,
                strategy_priority: QueryStrategy::ArtistTitle.priority_weight(),
                duration_fit: 1.0,
            },
        )
    }

    fn matched(candidate: MatchCandidate) -> TrackResolution {
        let mut resolution = TrackResolution::unresolved(candidate.local_track_id.clone(), MatchError::NoCandidate);
        resolution.outcome = ResolutionOutcome::Matched { candidate };
        resolution
    }

    #[test]
    fn test_args_parse_flags_and_files() {
        let args = Args::try_parse_from([
            "tagnexus",
            "--apply",
            "--min-apply-confidence",
            "0.9",
            "a.mp3",
            "b.flac",
        ])
        .expect("args parse");

        assert!(args.apply);
        assert_eq!(args.min_apply_confidence, Some(0.9));
        assert_eq!(args.files, vec![PathBuf::from("a.mp3"), PathBuf::from("b.flac")]);
        assert!(args.config.is_none());
        assert!(args.filename_format.is_none());
    }

    #[test]
    fn test_args_accept_filename_and_rename_formats() {
        let args = Args::try_parse_from([
            "tagnexus",
            "--filename-format",
            "%track% - %title%",
            "--apply",
            "--rename-format",
            "%artist% - %title%",
            "a.mp3",
        ])
        .expect("args parse");

        assert_eq!(args.filename_format.as_deref(), Some("%track% - %title%"));
        assert_eq!(args.rename_format.as_deref(), Some("%artist% - %title%"));
    }

    #[test]
    fn test_rename_format_requires_apply() {
        assert!(Args::try_parse_from(["tagnexus", "--rename-format", "%title%", "a.mp3"]).is_err());
    }

    #[test]
    fn test_args_require_files() {
        assert!(Args::try_parse_from(["tagnexus"]).is_err());
    }

    #[test]
    fn test_only_confident_matches_are_applied() {
        let output = ResolveOutput::Batch(vec![
            matched(candidate("strong.mp3", 1.0)),
            matched(candidate("weak.mp3", 0.5)),
            TrackResolution::unresolved(LocalTrackId::new("none.mp3"), MatchError::NoCandidate),
        ]);

        let applied = applicable(&output, 0.8);
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].0.as_str(), "strong.mp3");
        assert_eq!(applied[0].1.get(&TagKey::Title).map(String::as_str), Some("Aerodynamic"));
    }

    #[test]
    fn test_apply_writes_through_store() {
        let store = InMemoryTagStore::new();
        store
            .insert("strong.mp3", TagMap::new(), Some(212.0))
            .expect("insert");
        let output = ResolveOutput::Single(matched(candidate("strong.mp3", 1.0)));

        apply_tags(&store, &output, 0.8, None);

        let tags = store.read(Path::new("strong.mp3")).expect("read back");
        assert_eq!(tags.get(&TagKey::Album).map(String::as_str), Some("Discovery"));
        assert_eq!(tags.get(&TagKey::CatalogNumber).map(String::as_str), Some("V2940"));
    }

    fn proposed() -> TagMap {
        candidate("unused", 1.0).proposed_tags()
    }

    #[test]
    fn test_renamed_path_keeps_extension_and_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("track01.flac");

        let target = renamed_path(&path, "%track% - %artist%: %title%", &proposed()).expect("renamed");
        assert_eq!(target, dir.path().join("2 - Daft Punk Aerodynamic.flac"));
    }

    #[test]
    fn test_renamed_path_skips_unchanged_taken_and_empty_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let current = dir.path().join("Aerodynamic.mp3");
        assert_eq!(renamed_path(&current, "%title%", &proposed()), None);

        let other = dir.path().join("other.mp3");
        std::fs::write(&current, b"taken").expect("write");
        assert_eq!(renamed_path(&other, "%title%", &proposed()), None);

        assert_eq!(renamed_path(&other, "%year%", &proposed()), None);
    }

    #[test]
    fn test_rename_file_moves_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("track01.mp3");
        std::fs::write(&path, b"audio").expect("write");

        rename_file(&path, "%artist% - %title%", &proposed());

        assert!(!path.exists());
        assert!(dir.path().join("Daft Punk - Aerodynamic.mp3").exists());
    }

    #[test]
    fn test_unreadable_file_keeps_filename() {
        let track = load_track(&InMemoryTagStore::new(), Path::new("Daft Punk - Aerodynamic.mp3"));
        assert_eq!(track.filename_raw, "Daft Punk - Aerodynamic.mp3");
        assert!(track.known_tags.is_empty());
    }

    #[test]
    fn test_discogs_client_from_config() {
        let config = DiscogsConfig {
            token: Some("token".to_string()),
            base_url: Some("http://localhost:9999".to_string()),
            ..DiscogsConfig::default()
        };
        let client = discogs_client(&config).expect("client builds");
        assert_eq!(client.base_url(), "http://localhost:9999");
    }
}
