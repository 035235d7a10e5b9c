use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mode::{ExecutionMode, PlaybackType};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config value {key} must be positive")]
    NotPositive { key: &'static str },
}

/// Session settings. Keys absent from the file keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CleanupConfig {
    pub execution_mode: ExecutionMode,
    pub playback_type: PlaybackType,
    /// Seconds per trial.
    pub session_time_limit: u32,
    pub max_number_of_trials: u32,
    pub reduce_load_in_data_gen: bool,
    pub snapshot_dir: PathBuf,
    pub score_file: Option<PathBuf>,
    pub random_seed: Option<u64>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::Competition,
            playback_type: PlaybackType::Off,
            session_time_limit: 600,
            max_number_of_trials: 15,
            reduce_load_in_data_gen: false,
            snapshot_dir: PathBuf::from("EnvironmentInfo"),
            score_file: None,
            random_seed: None,
        }
    }
}

impl CleanupConfig {
    /// Reads the config file, or returns the defaults when no path is given.
    pub fn from_json_file(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: CleanupConfig =
            serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_time_limit == 0 {
            return Err(ConfigError::NotPositive {
                key: "sessionTimeLimit",
            });
        }
        if self.max_number_of_trials == 0 {
            return Err(ConfigError::NotPositive {
                key: "maxNumberOfTrials",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreSummary<'a> {
    number_of_trials: u32,
    trial_scores: &'a [i32],
    total_score: i64,
}

/// Trial counter and grand total, shared by every trial of a run.
#[derive(Debug, Clone, Default)]
pub struct SessionLedger {
    number_of_trials: u32,
    trial_scores: Vec<i32>,
    total_score: i64,
    score_file: Option<PathBuf>,
}

impl SessionLedger {
    pub fn with_score_file(score_file: Option<PathBuf>) -> Self {
        Self {
            score_file,
            ..Self::default()
        }
    }

    pub fn increment_number_of_trials(&mut self) -> u32 {
        self.number_of_trials += 1;
        self.number_of_trials
    }

    /// One-based index of the current trial; zero before the first one.
    pub fn number_of_trials(&self) -> u32 {
        self.number_of_trials
    }

    pub fn add_score(&mut self, score: i32) {
        self.trial_scores.push(score);
        self.total_score += i64::from(score);
    }

    pub fn total_score(&self) -> i64 {
        self.total_score
    }

    pub fn trial_scores(&self) -> &[i32] {
        &self.trial_scores
    }

    /// Persists the running totals. A ledger without a score file keeps them
    /// in memory only.
    pub fn record_score_in_file(&self) -> anyhow::Result<()> {
        let Some(path) = &self.score_file else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating score directory {}", parent.display()))?;
        }
        let summary = ScoreSummary {
            number_of_trials: self.number_of_trials,
            trial_scores: &self.trial_scores,
            total_score: self.total_score,
        };
        let json = serde_json::to_string_pretty(&summary).context("serializing score summary")?;
        fs::write(path, json + "\n")
            .with_context(|| format!("writing score file {}", path.display()))?;
        log::debug!("recorded total score in {}", path.display());
        Ok(())
    }
}

const XTION_DEPTH_INTERVAL_MS: u64 = 100;
const XTION_RGB_INTERVAL_MS: u64 = 100;
const STEREO_RGB_INTERVAL_MS: u64 = 100;
const WIDE_RGB_INTERVAL_MS: u64 = 100;
const REDUCED_LOAD_FACTOR: u64 = 1000;

/// Publishing intervals of the robot's camera sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorRates {
    pub xtion_depth_ms: u64,
    pub xtion_rgb_ms: u64,
    pub stereo_rgb_ms: u64,
    pub wide_rgb_ms: u64,
}

impl Default for SensorRates {
    fn default() -> Self {
        Self {
            xtion_depth_ms: XTION_DEPTH_INTERVAL_MS,
            xtion_rgb_ms: XTION_RGB_INTERVAL_MS,
            stereo_rgb_ms: STEREO_RGB_INTERVAL_MS,
            wide_rgb_ms: WIDE_RGB_INTERVAL_MS,
        }
    }
}

impl SensorRates {
    /// Data generation has no robot in the loop, so its sensors can be slowed
    /// down when the config asks for it.
    pub fn for_mode(mode: ExecutionMode, reduce_load_in_data_gen: bool) -> Self {
        let rates = Self::default();
        if mode == ExecutionMode::DataGeneration && reduce_load_in_data_gen {
            Self {
                xtion_depth_ms: rates.xtion_depth_ms * REDUCED_LOAD_FACTOR,
                xtion_rgb_ms: rates.xtion_rgb_ms * REDUCED_LOAD_FACTOR,
                stereo_rgb_ms: rates.stereo_rgb_ms * REDUCED_LOAD_FACTOR,
                wide_rgb_ms: rates.wide_rgb_ms * REDUCED_LOAD_FACTOR,
            }
        } else {
            rates
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_config_keeps_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "executionMode": 1, "playbackType": 1, "randomSeed": 42 }"#,
        )
        .expect("write config");
        let config = CleanupConfig::from_json_file(Some(&path)).expect("config loads");
        assert_eq!(config.execution_mode, ExecutionMode::DataGeneration);
        assert_eq!(config.playback_type, PlaybackType::Record);
        assert_eq!(config.random_seed, Some(42));
        assert_eq!(config.session_time_limit, 600);
        assert_eq!(config.snapshot_dir, PathBuf::from("EnvironmentInfo"));
    }

    #[test]
    fn invalid_execution_mode_is_fatal() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "executionMode": 7 }"#).expect("write config");
        let err = CleanupConfig::from_json_file(Some(&path)).expect_err("mode 7 is invalid");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("illegal execution mode"));
    }

    #[test]
    fn zero_time_limit_is_rejected() {
        let config = CleanupConfig {
            session_time_limit: 0,
            ..CleanupConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive {
                key: "sessionTimeLimit"
            })
        ));
    }

    #[test]
    fn missing_path_yields_defaults() {
        let config = CleanupConfig::from_json_file(None).expect("defaults");
        assert_eq!(config, CleanupConfig::default());
    }

    #[test]
    fn ledger_writes_score_summary() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("scores").join("total.json");
        let mut ledger = SessionLedger::with_score_file(Some(path.clone()));
        ledger.increment_number_of_trials();
        ledger.add_score(40);
        ledger.increment_number_of_trials();
        ledger.add_score(-10);
        ledger.record_score_in_file().expect("score file written");

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read back")).expect("json");
        assert_eq!(written["numberOfTrials"], 2);
        assert_eq!(written["trialScores"], serde_json::json!([40, -10]));
        assert_eq!(written["totalScore"], 30);
    }

    #[test]
    fn sensor_rates_slow_down_only_for_reduced_data_generation() {
        let normal = SensorRates::for_mode(ExecutionMode::DataGeneration, false);
        assert_eq!(normal, SensorRates::default());
        let competition = SensorRates::for_mode(ExecutionMode::Competition, true);
        assert_eq!(competition, SensorRates::default());
        let reduced = SensorRates::for_mode(ExecutionMode::DataGeneration, true);
        assert_eq!(reduced.xtion_depth_ms, XTION_DEPTH_INTERVAL_MS * 1000);
        assert_eq!(reduced.wide_rgb_ms, WIDE_RGB_INTERVAL_MS * 1000);
    }
}
