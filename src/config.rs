//! Configuration file parser for ~/.config/decant/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`,
//! which enables every known source with default options. Unknown keys are
//! silently ignored by serde (with `deny_unknown_fields` off), though we log
//! a warning when the file contains potential typos.
//!
//! Credentials never live here: the Reddit and Twitter adapters read theirs
//! from the environment only.

use crate::model::{SeenStrategy, Source, SourceConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Duplicate [[sources]] entry for {0}")]
    DuplicateSource(Source),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level application configuration.
///
/// `sources` is a list of `[[sources]]` tables, one per upstream:
///
/// ```toml
/// [[sources]]
/// source = "reddit"
/// enabled = true
///
/// [sources.options]
/// subreddits = ["rust", "programming"]
/// page_size = 25
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: vec![
                SourceConfig::enabled(Source::HackerNews),
                SourceConfig::enabled(Source::Reddit),
                SourceConfig::enabled(Source::Twitter),
            ],
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to avoid slurping a corrupted file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to flag likely typos at the top level.
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if key != "sources" {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.check_duplicates()?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    fn check_duplicates(&self) -> Result<(), ConfigError> {
        let mut seen = Vec::new();
        for entry in &self.sources {
            if seen.contains(&entry.source) {
                return Err(ConfigError::DuplicateSource(entry.source));
            }
            seen.push(entry.source);
        }
        Ok(())
    }

    /// Enabled source configs, in file order.
    pub fn enabled_sources(&self) -> Vec<SourceConfig> {
        self.sources.iter().filter(|s| s.enabled).cloned().collect()
    }

    /// The seen strategy declared for each configured source; the ledger
    /// uses this for sources with no persisted entry yet.
    pub fn seen_strategies(&self) -> HashMap<Source, SeenStrategy> {
        self.sources
            .iter()
            .map(|s| (s.source, s.options.seen_strategy))
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
