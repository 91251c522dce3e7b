use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Environment variable that overrides `weather.api_key`
pub const WEATHER_API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

/// Longest accepted cache TTL (one year)
pub const MAX_CACHE_TTL_HOURS: u32 = 24 * 365;

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

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a message summarizing all errors
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database holding the queue, the sessions and both caches
    pub database_path: PathBuf,

    /// Geolocation API settings
    #[serde(default)]
    pub geo: GeoConfig,

    /// Weather API settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Periodic trigger settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// Base URL; the client IP is appended as the last path segment
    #[serde(default = "default_geo_api_url")]
    pub api_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Lifetime of a cached geolocation
    #[serde(default = "default_geo_ttl_hours")]
    pub cache_ttl_hours: u32,
}

fn default_geo_api_url() -> String {
    "http://www.telize.com/geoip".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_geo_ttl_hours() -> u32 {
    24
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            api_url: default_geo_api_url(),
            timeout_secs: default_timeout_secs(),
            cache_ttl_hours: default_geo_ttl_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Current-weather endpoint
    #[serde(default = "default_weather_api_url")]
    pub api_url: String,

    /// OpenWeatherMap application id (can be set via environment)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Unit system passed to the API
    #[serde(default = "default_units")]
    pub units: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Lifetime of a cached weather reading
    #[serde(default = "default_weather_ttl_hours")]
    pub cache_ttl_hours: u32,
}

fn default_weather_api_url() -> String {
    "http://api.openweathermap.org/data/2.5/weather".to_string()
}

fn default_units() -> String {
    "metric".to_string()
}

fn default_weather_ttl_hours() -> u32 {
    3
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_url: default_weather_api_url(),
            api_key: None,
            units: default_units(),
            timeout_secs: default_timeout_secs(),
            cache_ttl_hours: default_weather_ttl_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between two ticks (default: 30)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Claimed items resolved concurrently within one pass
    #[serde(default = "default_max_concurrent_items")]
    pub max_concurrent_items: usize,

    /// Drop expired cache rows at the start of each pass
    #[serde(default = "default_purge_expired")]
    pub purge_expired: bool,
}

fn default_interval_secs() -> u64 {
    30
}

fn default_max_concurrent_items() -> usize {
    4
}

fn default_purge_expired() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_concurrent_items: default_max_concurrent_items(),
            purge_expired: default_purge_expired(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let database_path = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("geowx")
            .join("geowx.db");

        Self {
            database_path,
            geo: GeoConfig::default(),
            weather: WeatherConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, writing defaults there if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str::<Config>(&contents)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            let config = Self::default();
            config.save_to(path)?;
            config
        };

        if let Ok(key) = std::env::var(WEATHER_API_KEY_ENV) {
            config.weather.api_key = Some(key);
        }

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns an error if validation fails with critical errors; warnings are logged.
    pub fn load_validated(path: Option<&Path>) -> Result<(Self, ValidationResult)> {
        let config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.geo.api_url, "geo.api_url", &mut result);
        self.validate_url(&self.weather.api_url, "weather.api_url", &mut result);

        if self.geo.timeout_secs == 0 {
            result.add_error("geo.timeout_secs", "Timeout must be greater than 0");
        }
        if self.weather.timeout_secs == 0 {
            result.add_error("weather.timeout_secs", "Timeout must be greater than 0");
        }

        Self::validate_ttl(self.geo.cache_ttl_hours, "geo.cache_ttl_hours", &mut result);
        Self::validate_ttl(
            self.weather.cache_ttl_hours,
            "weather.cache_ttl_hours",
            &mut result,
        );
        if (25..=MAX_CACHE_TTL_HOURS).contains(&self.weather.cache_ttl_hours) {
            result.add_warning(
                "weather.cache_ttl_hours",
                "Weather readings cached for more than 24 hours",
            );
        }

        match self.weather.api_key.as_deref() {
            None | Some("") => result.add_warning(
                "weather.api_key",
                format!(
                    "No weather API key configured (set {}) - weather lookups will fail",
                    WEATHER_API_KEY_ENV
                ),
            ),
            Some(_) => {}
        }

        if self.weather.units.is_empty() {
            result.add_error("weather.units", "Units must not be empty");
        }

        if self.scheduler.interval_secs == 0 {
            result.add_error("scheduler.interval_secs", "Interval must be greater than 0");
        }
        if self.scheduler.max_concurrent_items == 0 {
            result.add_error(
                "scheduler.max_concurrent_items",
                "At least one item must be processed at a time",
            );
        }

        result
    }

    fn validate_ttl(hours: u32, field_name: &str, result: &mut ValidationResult) {
        if hours == 0 {
            result.add_error(field_name, "Cache TTL must be greater than 0");
        } else if hours > MAX_CACHE_TTL_HOURS {
            result.add_error(
                field_name,
                format!("Cache TTL must be at most {} hours", MAX_CACHE_TTL_HOURS),
            );
        }
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if let Some(port) = url.port() {
                    if port == 0 {
                        result.add_error(field_name, "Port cannot be 0");
                    }
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the given path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("geowx");

        Ok(config_dir.join("config.toml"))
    }
}
