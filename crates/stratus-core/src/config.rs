use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Weather refresh settings
    #[serde(default)]
    pub weather: WeatherConfig,
}

/// Weather refresh settings.
///
/// Every TTL field is an override in minutes; `None` means the engine's
/// built-in table applies. These values are handed to the refresh engine
/// explicitly rather than read from ambient state.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WeatherConfig {
    /// Id of the source used to resolve the device position, when a
    /// location is configured as "current position".
    pub location_source: Option<String>,

    pub main_ttl_minutes: Option<u32>,
    pub air_quality_ttl_minutes: Option<u32>,
    pub pollen_ttl_minutes: Option<u32>,
    pub minutely_ttl_minutes: Option<u32>,
    pub alerts_ttl_minutes: Option<u32>,
    pub normals_ttl_minutes: Option<u32>,
}

impl Config {
    /// Load config from disk, or return defaults if no file exists yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;
        self.save_to(&path)
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| ConfigError::NotFound("platform config directory".to_string()))?;
        Ok(base.join("stratus").join("config.toml"))
    }

    /// Validate the configuration, collecting errors and warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        let ttls = [
            ("weather.main_ttl_minutes", self.weather.main_ttl_minutes),
            (
                "weather.air_quality_ttl_minutes",
                self.weather.air_quality_ttl_minutes,
            ),
            ("weather.pollen_ttl_minutes", self.weather.pollen_ttl_minutes),
            (
                "weather.minutely_ttl_minutes",
                self.weather.minutely_ttl_minutes,
            ),
            ("weather.alerts_ttl_minutes", self.weather.alerts_ttl_minutes),
            (
                "weather.normals_ttl_minutes",
                self.weather.normals_ttl_minutes,
            ),
        ];

        for (field, ttl) in ttls {
            match ttl {
                Some(0) => result.add_error(field, "TTL must be at least 1 minute"),
                // A week-plus TTL almost certainly means a unit mix-up
                Some(m) if m > 10_080 => {
                    result.add_warning(field, "TTL is longer than a week");
                }
                _ => {}
            }
        }

        if let Some(source) = &self.weather.location_source {
            if source.trim().is_empty() {
                result.add_error("weather.location_source", "source id must not be empty");
            }
        }

        result
    }
}
