//! Run configuration for the ingestion engine.
//!
//! All knobs live in one explicit struct handed to the engine at
//! construction; there is no ambient global configuration. The struct is
//! serde-friendly so hosts can keep it in a TOML file.

use chrono::Datelike;
use redline_core::classify::FileFormat;
use redline_core::normalize::{NormalizeOptions, NullPolicy};
use redline_core::store::DEFAULT_TABLE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file: {0}")]
    Io(String),

    #[error("parse config TOML: {0}")]
    Parse(String),

    #[error("batch_size must be positive")]
    ZeroBatchSize,

    #[error("invalid table name '{0}': must be a bare SQL identifier")]
    InvalidTableName(String),
}

/// Configuration consumed (not owned) by the ingestion core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Files per batch; bounds peak memory to one batch's parsed tables.
    pub batch_size: usize,
    /// Declared input format. `None` auto-detects per file from the
    /// extension.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_format: Option<FileFormat>,
    /// Probe `.txt` headers for the required Stooq tokens before accepting.
    pub validate_stooq_header: bool,
    /// Which null pattern disqualifies a row from persistence.
    pub null_policy: NullPolicy,
    /// Name of the persisted table.
    pub table_name: String,
    /// Inclusive year bounds applied to Stooq timestamps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_range: Option<(i32, i32)>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            input_format: None,
            validate_stooq_header: true,
            null_policy: NullPolicy::default(),
            table_name: DEFAULT_TABLE.to_string(),
            year_range: Some((1900, chrono::Utc::now().year())),
        }
    }
}

impl IngestConfig {
    /// Load a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if !is_bare_identifier(&self.table_name) {
            return Err(ConfigError::InvalidTableName(self.table_name.clone()));
        }
        Ok(())
    }

    /// Normalizer options derived from this configuration.
    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            policy: self.null_policy,
            year_range: self.year_range,
        }
    }
}

/// Table names are interpolated into SQL, so only bare identifiers are
/// accepted: ASCII letters, digits, underscores, not starting with a digit.
fn is_bare_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
