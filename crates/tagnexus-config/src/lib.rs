// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::Path;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Thresholds and tolerances used by the matching engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Duration delta (seconds) at which the duration fit reaches zero.
    pub duration_tolerance_seconds: f64,
    /// Minimum confidence for a candidate to be reported at all.
    pub acceptance_threshold: f32,
    /// Confidence at which single-track resolution stops querying.
    pub high_confidence_threshold: f32,
    /// Records whose string similarity falls below this are discarded.
    pub similarity_floor: f32,
    pub tie_epsilon: f32,
    pub max_alternatives: usize,
    /// How many releases album mode evaluates before picking one.
    pub album_release_candidates: usize,
    /// Filename layout such as `%artist% - %title%`, tried before the
    /// built-in layouts.
    pub filename_format: Option<String>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            duration_tolerance_seconds: 10.0,
            acceptance_threshold: 0.35,
            high_confidence_threshold: 0.8,
            similarity_floor: 0.4,
            tie_epsilon: 0.001,
            max_alternatives: 5,
            album_release_candidates: 3,
            filename_format: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscogsConfig {
    pub token: Option<String>,
    pub base_url: Option<String>,
    pub max_concurrent_requests: usize,
    pub min_request_interval_ms: u64,
    /// Search hits hydrated into full releases per query.
    pub results_per_query: usize,
    pub timeout_secs: u64,
}

impl Default for DiscogsConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: None,
            max_concurrent_requests: 1,
            min_request_interval_ms: 1000,
            results_per_query: 5,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub max_concurrent_resolutions: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_resolutions: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub telemetry: TelemetryConfig,
    pub matching: MatchingConfig,
    pub discogs: DiscogsConfig,
    pub batch: BatchConfig,
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: TAGNEXUS_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("TAGNEXUS_").split("__"));

    let config: AppConfig = figment.extract()?;
    info!(target: "config", "configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.matching.duration_tolerance_seconds, 10.0);
        assert_eq!(config.matching.acceptance_threshold, 0.35);
        assert_eq!(config.matching.high_confidence_threshold, 0.8);
        assert_eq!(config.discogs.max_concurrent_requests, 1);
        assert_eq!(config.batch.max_concurrent_resolutions, 4);
        assert!(config.matching.filename_format.is_none());
    }

    #[test]
    fn toml_and_env_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "tagnexus.toml",
                r#"
                [matching]
                duration_tolerance_seconds = 5.0
                filename_format = "%track% - %title%"

                [batch]
                max_concurrent_resolutions = 2
                "#,
            )?;
            jail.set_env("TAGNEXUS_DISCOGS__TOKEN", "secret");

            let config = load(Some(Path::new("tagnexus.toml")))
                .map_err(|err| figment::Error::from(err.to_string()))?;

            assert_eq!(config.matching.duration_tolerance_seconds, 5.0);
            assert_eq!(config.matching.acceptance_threshold, 0.35);
            assert_eq!(config.matching.filename_format.as_deref(), Some("%track% - %title%"));
            assert_eq!(config.batch.max_concurrent_resolutions, 2);
            assert_eq!(config.discogs.token.as_deref(), Some("secret"));
            Ok(())
        });
    }
}
