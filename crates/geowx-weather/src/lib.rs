//! Current weather for geowx.
//!
//! Provides weather readings via the OpenWeatherMap current-weather API with
//! a TTL cache keyed by coordinates.

pub mod cache;
pub mod provider;
pub mod resolver;
pub mod types;

pub use cache::{open_weather_cache, WeatherCache, WEATHER_CACHE_TABLE};
pub use provider::WeatherProvider;
pub use resolver::WeatherResolver;
pub use types::*;
