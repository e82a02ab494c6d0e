use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{ReflexError, Result};

pub const MAX_ATTEMPTS: usize = 5;
pub const MIN_DELAY_MS: u64 = 1_000;
pub const COARSE_JITTER_MS: u64 = 2_000;
pub const FINE_JITTER_MS: u64 = 500;
pub const CORRECTION_MS: u64 = 50;
pub const DEFAULT_LATENCY_MS: u32 = 200;
pub const POST_TRIAL_DELAY_MS: u64 = 500;
pub const CALIBRATION_STEPS: u32 = 100;
pub const STEP_INTERVAL_MS: u64 = 20;
pub const STAGE_EVERY: u32 = 20;
pub const FINAL_HOLD_MS: u64 = 800;

/// Trial protocol parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub max_attempts: usize,
    pub min_delay_ms: u64,
    /// Width of the whole-millisecond part of the stimulus delay draw.
    pub coarse_jitter_ms: u64,
    /// Width of the fractional part of the stimulus delay draw.
    pub fine_jitter_ms: u64,
    pub correction_ms: u64,
    pub default_latency_ms: u32,
    pub post_trial_delay_ms: u64,
}

impl ProtocolConfig {
    /// Total spread of the stimulus delay above `min_delay_ms`.
    pub fn delay_range_ms(&self) -> u64 {
        self.coarse_jitter_ms + self.fine_jitter_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.min_delay_ms + self.delay_range_ms()
    }

    pub fn post_trial_delay(&self) -> Duration {
        Duration::from_millis(self.post_trial_delay_ms)
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            min_delay_ms: MIN_DELAY_MS,
            coarse_jitter_ms: COARSE_JITTER_MS,
            fine_jitter_ms: FINE_JITTER_MS,
            correction_ms: CORRECTION_MS,
            default_latency_ms: DEFAULT_LATENCY_MS,
            post_trial_delay_ms: POST_TRIAL_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub steps: u32,
    pub step_interval_ms: u64,
    pub stage_every: u32,
    pub final_hold_ms: u64,
}

impl CalibrationConfig {
    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }

    pub fn final_hold(&self) -> Duration {
        Duration::from_millis(self.final_hold_ms)
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            steps: CALIBRATION_STEPS,
            step_interval_ms: STEP_INTERVAL_MS,
            stage_every: STAGE_EVERY,
            final_hold_ms: FINAL_HOLD_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub log_level: String,
    /// Log destination; stderr when absent.
    pub log_file: Option<String>,
    pub event_log_capacity: usize,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_file: Some("reflex.log".into()),
            event_log_capacity: 512,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflexConfig {
    pub protocol: ProtocolConfig,
    pub calibration: CalibrationConfig,
    pub ops: OpsConfig,
}

impl ReflexConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            ReflexError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            ReflexError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.protocol.max_attempts == 0 {
            return Err(ReflexError::Configuration(
                "protocol.max_attempts must be greater than zero".into(),
            ));
        }
        if self.protocol.coarse_jitter_ms == 0 {
            return Err(ReflexError::Configuration(
                "protocol.coarse_jitter_ms must be greater than zero".into(),
            ));
        }
        if self.protocol.default_latency_ms == 0 {
            return Err(ReflexError::Configuration(
                "protocol.default_latency_ms must be at least 1".into(),
            ));
        }
        if self.calibration.steps == 0 {
            return Err(ReflexError::Configuration(
                "calibration.steps must be greater than zero".into(),
            ));
        }
        if self.calibration.stage_every == 0 {
            return Err(ReflexError::Configuration(
                "calibration.stage_every must be greater than zero".into(),
            ));
        }
        if self.ops.event_log_capacity == 0 {
            return Err(ReflexError::Configuration(
                "ops.event_log_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = ReflexConfig::default();
        assert_eq!(config.protocol.max_attempts, 5);
        assert_eq!(config.protocol.min_delay_ms, 1_000);
        assert_eq!(config.protocol.delay_range_ms(), 2_500);
        assert_eq!(config.protocol.max_delay_ms(), 3_500);
        assert_eq!(config.protocol.correction_ms, 50);
        assert_eq!(config.protocol.post_trial_delay_ms, 500);
        assert_eq!(config.calibration.steps, 100);
        assert_eq!(config.calibration.step_interval_ms, 20);
        assert_eq!(config.calibration.final_hold_ms, 800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_reflex_config_from_file() {
        let temp_path = std::env::temp_dir().join("reflex-config-test.toml");
        let mut config = ReflexConfig::default();
        config.protocol.max_attempts = 3;
        config.calibration.step_interval_ms = 5;
        config.ops.log_file = Some("trials.log".into());

        let doc = toml::to_string(&config).expect("serialize config");
        fs::write(&temp_path, doc).expect("write temp config");

        let loaded = ReflexConfig::from_file(&temp_path).expect("load config");
        assert_eq!(loaded, config);
        fs::remove_file(&temp_path).expect("cleanup temp config");
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let loaded: ReflexConfig =
            toml::from_str("[protocol]\nmax_attempts = 10\n").expect("parse partial config");
        assert_eq!(loaded.protocol.max_attempts, 10);
        assert_eq!(loaded.protocol.min_delay_ms, MIN_DELAY_MS);
        assert_eq!(loaded.calibration, CalibrationConfig::default());
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let err = ReflexConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ReflexError::Configuration(_)));
    }

    #[test]
    fn validate_configuration_rules() {
        let mut config = ReflexConfig::default();
        config.protocol.max_attempts = 0;
        assert!(config.validate().is_err());
        config.protocol.max_attempts = 5;
        config.protocol.coarse_jitter_ms = 0;
        assert!(config.validate().is_err());
        config.protocol.coarse_jitter_ms = 2_000;
        config.protocol.default_latency_ms = 0;
        assert!(config.validate().is_err());
        config.protocol.default_latency_ms = 200;
        config.calibration.steps = 0;
        assert!(config.validate().is_err());
        config.calibration.steps = 100;
        config.calibration.stage_every = 0;
        assert!(config.validate().is_err());
        config.calibration.stage_every = 20;
        config.ops.event_log_capacity = 0;
        assert!(config.validate().is_err());
        config.ops.event_log_capacity = 16;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let shipped: ReflexConfig =
            toml::from_str(include_str!("../../../configs/default.toml")).expect("parse shipped config");
        assert_eq!(shipped, ReflexConfig::default());
    }
}
