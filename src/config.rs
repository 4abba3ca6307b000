//! Environment-based configuration (spec §6 "Configuration" table), following
//! the teacher's `ZVaultConfig`/`ConfigError` pattern: `CHALLENGER_*`
//! environment variables, sensible defaults where the spec allows one, and a
//! plain in-memory constructor for embedding and tests.

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::hashing::H256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Recognized configuration options (spec §6). `leaf_heights` is `[H0, H1,
/// H2]`, the per-level leaf-count constants consumed by the history
/// provider.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub edge_tracker_wake_interval: Duration,
    pub watcher_poll_interval: Duration,
    pub challenge_period_blocks: u64,
    pub opcodes_per_big_step: u64,
    pub leaf_heights: [u64; 3],
    pub validator_name: String,
    pub validator_address: [u8; 20],
    pub wasm_root: H256,
    pub batch: u64,
    pub log_level: String,
    pub log_json: bool,
}

impl EngineConfig {
    /// Plain in-memory constructor — this crate ships no CLI, so embedders
    /// and tests build a config directly rather than through `from_env`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        edge_tracker_wake_interval: Duration,
        watcher_poll_interval: Duration,
        challenge_period_blocks: u64,
        opcodes_per_big_step: u64,
        leaf_heights: [u64; 3],
        validator_name: impl Into<String>,
        validator_address: [u8; 20],
        wasm_root: H256,
        batch: u64,
    ) -> Self {
        EngineConfig {
            edge_tracker_wake_interval,
            watcher_poll_interval,
            challenge_period_blocks,
            opcodes_per_big_step,
            leaf_heights,
            validator_name: validator_name.into(),
            validator_address,
            wasm_root,
            batch,
            log_level: "info".to_string(),
            log_json: false,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let edge_tracker_wake_interval = duration_secs_var(
            "CHALLENGER_EDGE_TRACKER_WAKE_INTERVAL_SECS",
            30,
        )?;
        let watcher_poll_interval =
            duration_secs_var("CHALLENGER_WATCHER_POLL_INTERVAL_SECS", 12)?;
        let challenge_period_blocks =
            parsed_var("CHALLENGER_CHALLENGE_PERIOD_BLOCKS", 45_818)?;
        let opcodes_per_big_step = parsed_var("CHALLENGER_OPCODES_PER_BIG_STEP", 2_u64.pow(20))?;

        let leaf_heights = [
            parsed_var("CHALLENGER_LEAF_HEIGHT_BLOCK", 2_u64.pow(5))?,
            parsed_var("CHALLENGER_LEAF_HEIGHT_BIG_STEP", 2_u64.pow(7))?,
            parsed_var("CHALLENGER_LEAF_HEIGHT_SMALL_STEP", 2_u64.pow(20))?,
        ];

        let validator_name = env::var("CHALLENGER_VALIDATOR_NAME")
            .map_err(|_| ConfigError::MissingEnvVar("CHALLENGER_VALIDATOR_NAME".to_string()))?;

        let validator_address = hex_address_var("CHALLENGER_VALIDATOR_ADDRESS")?;
        let wasm_root = hex_h256_var("CHALLENGER_WASM_ROOT")?;
        let batch = parsed_var("CHALLENGER_BATCH", 0)?;

        let log_level = env::var("CHALLENGER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("CHALLENGER_LOG_JSON")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(EngineConfig {
            edge_tracker_wake_interval,
            watcher_poll_interval,
            challenge_period_blocks,
            opcodes_per_big_step,
            leaf_heights,
            validator_name,
            validator_address,
            wasm_root,
            batch,
            log_level,
            log_json,
        })
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), value)),
        Err(_) => Ok(default),
    }
}

fn duration_secs_var(name: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(parsed_var(name, default_secs)?))
}

fn hex_address_var(name: &str) -> Result<[u8; 20], ConfigError> {
    let raw = env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
    let trimmed = raw.strip_prefix("0x").unwrap_or(&raw);
    let mut out = [0u8; 20];
    hex::decode_to_slice(trimmed, &mut out)
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))?;
    Ok(out)
}

fn hex_h256_var(name: &str) -> Result<H256, ConfigError> {
    let raw = env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
    raw.parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_constructor_defaults_log_level_to_info() {
        let config = EngineConfig::new(
            Duration::from_secs(30),
            Duration::from_secs(12),
            45_818,
            1 << 20,
            [32, 128, 1 << 20],
            "validator-1",
            [0u8; 20],
            H256::ZERO,
            0,
        );
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
        assert_eq!(config.leaf_heights[0], 32);
    }

    #[test]
    fn parsed_var_rejects_malformed_values() {
        std::env::set_var("CHALLENGER_TEST_MALFORMED", "not-a-number");
        let err = parsed_var::<u64>("CHALLENGER_TEST_MALFORMED", 0).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_, _)));
        std::env::remove_var("CHALLENGER_TEST_MALFORMED");
    }
}
