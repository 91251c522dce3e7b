//! Cache-aside weather resolution.

use geowx_core::{GeoRecord, WeatherRecord};

use crate::cache::WeatherCache;
use crate::provider::WeatherProvider;
use crate::types::coordinate_key;

/// Resolves the current weather at a geolocation, consulting the cache first.
#[derive(Debug, Clone)]
pub struct WeatherResolver {
    cache: WeatherCache,
    provider: WeatherProvider,
}

impl WeatherResolver {
    pub fn new(cache: WeatherCache, provider: WeatherProvider) -> Self {
        Self { cache, provider }
    }

    pub fn cache(&self) -> &WeatherCache {
        &self.cache
    }

    /// Resolve weather for `geo`. Without a geolocation there is nothing to
    /// look up and the result is `None`.
    pub async fn resolve(&self, geo: Option<&GeoRecord>) -> Option<WeatherRecord> {
        let geo = geo?;
        let key = coordinate_key(geo.longitude, geo.latitude);

        match self.cache.get(&key).await {
            Ok(Some(entry)) => {
                tracing::debug!("Weather cache hit for {}", key);
                return Some(entry.value);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Weather cache read failed for {}: {}", key, e),
        }

        let response = match self.provider.fetch_current(geo.latitude, geo.longitude).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Weather lookup failed for {}: {}", key, e);
                return None;
            }
        };

        let Some(record) = response.into_record() else {
            tracing::debug!("Weather API returned no conditions for {}", key);
            return None;
        };

        match self.cache.put(&key, record.clone()).await {
            Ok(entry) => Some(entry.value),
            Err(e) => {
                tracing::warn!("Failed to cache weather for {}: {}", key, e);
                Some(record)
            }
        }
    }
}
