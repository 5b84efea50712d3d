//! Runtime configuration, loaded from an optional JSON file.
//!
//! Every section has defaults, and a partial file only overrides the keys
//! it names. Missing or malformed files fall back to defaults with a
//! warning. Values are checked by `validate` before any session starts.

use crate::challenge::ChallengeConfig;
use crate::classifier::ClassifierConfig;
use crate::error::ConfigError;
use crate::stabilizer::StabilizerConfig;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// Upper bound for every configured duration.
pub const MAX_DURATION_MS: u64 = 60_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub classifier: ClassifierConfig,
    pub stabilizer: StabilizerConfig,
    pub challenge: ChallengeConfig,
    pub session: SessionConfig,
}

/// Sampling loop and persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sampling cadence. 33ms ≈ 30 Hz.
    pub tick_ms: u64,
    /// Where completed lessons are remembered
    pub progress_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_ms: 33,
            progress_path: PathBuf::from("string-master-progress.json"),
        }
    }
}

impl Config {
    /// Load from a JSON file. Falls back to defaults if absent or malformed.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) => {
                warn!("Config {:?} not readable ({}), using defaults", path, e);
                return Self::default();
            }
        };
        match serde_json::from_str(&data) {
            Ok(c) => {
                info!("Loaded config from {:?}", path);
                c
            }
            Err(e) => {
                warn!("Failed to parse config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)?;
        info!("Config saved to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.classifier;
        if !(0.0..=1.0).contains(&c.confidence_threshold) {
            return Err(invalid(
                "confidence_threshold",
                format!("{} is outside 0.0–1.0", c.confidence_threshold),
            ));
        }

        let s = &self.stabilizer;
        if !(s.smoothing_factor > 0.0 && s.smoothing_factor <= 1.0) {
            return Err(invalid(
                "smoothing_factor",
                format!("{} is outside (0.0, 1.0]", s.smoothing_factor),
            ));
        }
        if !(s.snap_epsilon_cents > 0.0) {
            return Err(invalid("snap_epsilon_cents", "must be positive".into()));
        }
        for (field, v) in [
            ("in_tune_margin_cents", s.in_tune_margin_cents),
            ("lock_in_margin_cents", s.lock_in_margin_cents),
        ] {
            if !(v > 0.0 && v <= 50.0) {
                return Err(invalid(field, format!("{} is outside (0, 50]", v)));
            }
        }

        for (field, v) in [
            ("decay_ms", s.decay_ms),
            ("lock_in_hold_ms", s.lock_in_hold_ms),
            ("hold_ms", self.challenge.hold_ms),
            ("completion_grace_ms", self.challenge.completion_grace_ms),
        ] {
            if v > MAX_DURATION_MS {
                return Err(invalid(
                    field,
                    format!("{}ms is longer than {}ms", v, MAX_DURATION_MS),
                ));
            }
        }

        // 10–60 Hz
        if !(16..=100).contains(&self.session.tick_ms) {
            return Err(invalid(
                "tick_ms",
                format!("{}ms is outside 16–100ms", self.session.tick_ms),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidValue { field, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let c = Config::default();
        c.validate().unwrap();
        assert_eq!(c.classifier.confidence_threshold, 0.85);
        assert_eq!(c.stabilizer.decay_ms, 750);
        assert_eq!(c.stabilizer.lock_in_hold_ms, 1000);
        assert_eq!(c.challenge.hold_ms, 1200);
        assert_eq!(c.challenge.completion_grace_ms, 2000);
    }

    #[test]
    fn test_partial_file_overrides_named_keys_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"stabilizer":{"lock_in_margin_cents":8.0},"session":{"tick_ms":20}}"#,
        )
        .unwrap();
        let c = Config::load(&path);
        assert_eq!(c.stabilizer.lock_in_margin_cents, 8.0);
        assert_eq!(c.stabilizer.in_tune_margin_cents, 5.0);
        assert_eq!(c.session.tick_ms, 20);
        assert_eq!(c.challenge.hold_ms, 1200);
    }

    #[test]
    fn test_missing_or_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = Config::load(&dir.path().join("nope.json"));
        assert_eq!(c.session.tick_ms, 33);

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let c = Config::load(&path);
        assert_eq!(c.classifier.confidence_threshold, 0.85);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut c = Config::default();
        c.classifier.confidence_threshold = 0.0;
        c.save(&path).unwrap();
        assert_eq!(Config::load(&path).classifier.confidence_threshold, 0.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut c = Config::default();
        c.classifier.confidence_threshold = 1.5;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.stabilizer.smoothing_factor = 0.0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.stabilizer.lock_in_margin_cents = -1.0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.session.tick_ms = 0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.session.tick_ms = 10;
        assert!(c.validate().is_err(), "100 Hz is faster than supported");
    }

    #[test]
    fn test_validate_bounds_durations() {
        let mut c = Config::default();
        c.challenge.hold_ms = MAX_DURATION_MS;
        c.challenge.completion_grace_ms = 0;
        assert!(c.validate().is_ok());

        let mut c = Config::default();
        c.challenge.hold_ms = u64::from(u32::MAX) + 1;
        match c.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "hold_ms"),
            other => panic!("expected hold_ms rejection, got {:?}", other),
        }

        let mut c = Config::default();
        c.challenge.completion_grace_ms = u64::MAX;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.stabilizer.decay_ms = MAX_DURATION_MS + 1;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.stabilizer.lock_in_hold_ms = MAX_DURATION_MS + 1;
        assert!(c.validate().is_err());
    }
}
