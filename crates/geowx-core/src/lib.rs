pub mod config;
pub mod error;
pub mod model;

pub use config::{Config, GeoConfig, SchedulerConfig, ValidationResult, WeatherConfig};
pub use error::{AppError, ConfigError, DatabaseError, NetworkError};
pub use model::{GeoPoint, GeoRecord, PendingItem, Session, SessionEnrichment, WeatherRecord};

use anyhow::Result;

/// User agent sent by every outbound HTTP client
pub const USER_AGENT: &str = concat!("geowx/", env!("CARGO_PKG_VERSION"));

/// Initialize logging for the daemon
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    tracing::info!("geowx core initialized");
    Ok(())
}
