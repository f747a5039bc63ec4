//! Bot settings loaded from config.toml
//!
//! The `[training]` table tunes the rules of the training regimen and the
//! `[review]` table names the channel where completed sessions are posted for
//! approval. Every value has a default, so a missing file is not an error;
//! a file that exists but does not parse is.

use crate::errors::{Error, Result};
use chrono::Duration;
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Rules applied by the training engine
    #[serde(default)]
    pub training: TrainingRules,
    /// Where completed sessions are sent for review
    #[serde(default)]
    pub review: ReviewSettings,
}

/// Tunable rules of the training regimen.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrainingRules {
    /// Smallest post (non-whitespace characters) that counts at all
    pub min_post_symbols: i64,
    /// Symbols that must be written within one hour
    pub symbols_per_hour: i64,
    /// Maximum accepted posts per hour
    pub max_posts_per_hour: i32,
    /// Length of one training hour in minutes
    pub hour_minutes: i64,
    /// Minimum gap between two identical warnings, in minutes
    pub warning_interval_minutes: i64,
    /// Wait after a session ends before another may start, in hours
    pub restart_cooldown_hours: i64,
    /// Fewest hours a session may be configured with
    pub min_hours: i32,
    /// Most hours a session may be configured with
    pub max_hours: i32,
}

impl Default for TrainingRules {
    fn default() -> Self {
        Self {
            min_post_symbols: 400,
            symbols_per_hour: 3200,
            max_posts_per_hour: 4,
            hour_minutes: 60,
            warning_interval_minutes: 3,
            restart_cooldown_hours: 24,
            min_hours: 1,
            max_hours: 10,
        }
    }
}

impl TrainingRules {
    /// Length of one training hour.
    #[must_use]
    pub fn hour_length(&self) -> Duration {
        Duration::minutes(self.hour_minutes)
    }

    /// Minimum gap between repeated warnings of the same kind.
    #[must_use]
    pub fn warning_interval(&self) -> Duration {
        Duration::minutes(self.warning_interval_minutes)
    }

    /// Wait between the end of one session and the start of the next.
    #[must_use]
    pub fn restart_cooldown(&self) -> Duration {
        Duration::hours(self.restart_cooldown_hours)
    }
}

/// Review channel configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewSettings {
    /// Discord channel that receives completed session summaries
    pub channel_id: Option<u64>,
}

/// Loads settings from a TOML file, falling back to defaults when the file
/// does not exist.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!("No config file at {:?}, using default settings", path);
        return Ok(Settings::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path.display()),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path.display()),
    })
}

/// Loads settings from `CONFIG_PATH`, or `./config.toml` when unset.
pub fn load_default_settings() -> Result<Settings> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_settings(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_defaults_match_regimen() {
        let rules = TrainingRules::default();
        assert_eq!(rules.min_post_symbols, 400);
        assert_eq!(rules.symbols_per_hour, 3200);
        assert_eq!(rules.max_posts_per_hour, 4);
        assert_eq!(rules.hour_length(), Duration::minutes(60));
        assert_eq!(rules.warning_interval(), Duration::minutes(3));
        assert_eq!(rules.restart_cooldown(), Duration::hours(24));
        assert_eq!((rules.min_hours, rules.max_hours), (1, 10));
    }

    #[test]
    fn test_parse_partial_settings() {
        let toml_str = r#"
            [training]
            symbols_per_hour = 2000
            max_posts_per_hour = 6

            [review]
            channel_id = 123456789
        "#;

        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.training.symbols_per_hour, 2000);
        assert_eq!(settings.training.max_posts_per_hour, 6);
        // Unlisted fields keep their defaults
        assert_eq!(settings.training.min_post_symbols, 400);
        assert_eq!(settings.review.channel_id, Some(123_456_789));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let settings = load_settings("definitely/not/here.toml").unwrap();
        assert_eq!(settings.training, TrainingRules::default());
        assert!(settings.review.channel_id.is_none());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let path = std::env::temp_dir().join("training_bot_bad_config.toml");
        std::fs::write(&path, "[training\nsymbols_per_hour = ").unwrap();
        let result = load_settings(&path);
        assert!(matches!(result, Err(Error::Config { .. })));
        let _ = std::fs::remove_file(&path);
    }
}
