//! Process configuration from the environment.
//!
//! Read once at startup (after `dotenvy` has loaded any `.env` file) and
//! immutable afterwards. Every knob has a default so the service runs out
//! of the box.

use std::env;
use std::path::PathBuf;

use crate::design::ValidationLimits;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 5000;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP port to listen on.
    pub port: u16,
    /// Base directory for request-scoped working directories.
    pub upload_dir: PathBuf,
    /// Combinatorial ceilings for the design validation engine.
    pub limits: ValidationLimits,
    /// External format converter command.
    pub converter_cmd: String,
    /// External document validator command.
    pub validator_cmd: String,
    /// External study-design generator command.
    pub generator_cmd: String,
    /// Base URL of the external study repository for imports.
    pub import_base_url: String,
}

impl Config {
    /// Build the configuration from `ISAREST_*` environment variables,
    /// falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            port: env_parse("ISAREST_PORT", DEFAULT_PORT),
            upload_dir: env::var("ISAREST_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join("isarest")),
            limits: limits_from_env(),
            converter_cmd: env_or("ISAREST_CONVERTER_CMD", "isatools-convert"),
            validator_cmd: env_or("ISAREST_VALIDATOR_CMD", "isatools-validate"),
            generator_cmd: env_or("ISAREST_GENERATOR_CMD", "isatools-design"),
            import_base_url: env_or(
                "ISAREST_IMPORT_BASE_URL",
                "https://www.metabolomicsworkbench.org/data/study_archive",
            ),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn limits_from_env() -> ValidationLimits {
    let defaults = ValidationLimits::default();
    ValidationLimits {
        max_arms: env_parse("ISAREST_MAX_ARMS", defaults.max_arms),
        max_subjects_per_arm: env_parse(
            "ISAREST_MAX_SUBJECTS_PER_ARM",
            defaults.max_subjects_per_arm,
        ),
        max_sample_size: env_parse("ISAREST_MAX_SAMPLE_SIZE", defaults.max_sample_size),
        max_assay_combinations: env_parse(
            "ISAREST_MAX_ASSAY_COMBINATIONS",
            defaults.max_assay_combinations,
        ),
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
