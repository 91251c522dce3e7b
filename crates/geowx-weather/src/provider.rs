use std::sync::Arc;
use std::time::Duration;

use geowx_core::error::ReqwestErrorExt;
use geowx_core::{WeatherConfig, USER_AGENT};
use reqwest::Client;

use crate::types::{CurrentWeatherResponse, WeatherError};

/// OpenWeatherMap current-weather client
#[derive(Debug, Clone)]
pub struct WeatherProvider {
    client: Arc<Client>,
    api_url: String,
    api_key: Option<String>,
    units: String,
}

impl WeatherProvider {
    pub fn new(
        api_url: &str,
        api_key: Option<String>,
        units: &str,
        timeout: Duration,
    ) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| WeatherError::Client(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            api_url: api_url.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            units: units.to_string(),
        })
    }

    pub fn from_config(config: &WeatherConfig) -> Result<Self, WeatherError> {
        Self::new(
            &config.api_url,
            config.api_key.clone(),
            &config.units,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Fetch current conditions at a coordinate pair.
    ///
    /// A body that does not decode yields an empty response rather than an error.
    pub async fn fetch_current(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<CurrentWeatherResponse, WeatherError> {
        let api_key = self.api_key.as_deref().ok_or(WeatherError::MissingApiKey)?;

        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("units", self.units.clone()),
                ("APPID", api_key.to_string()),
            ])
            .send()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status().as_u16()));
        }

        match response.json::<CurrentWeatherResponse>().await {
            Ok(body) => Ok(body),
            Err(e) if e.is_decode() => {
                tracing::debug!(
                    "Weather response for {},{} did not decode: {}",
                    latitude,
                    longitude,
                    e
                );
                Ok(CurrentWeatherResponse::default())
            }
            Err(e) => Err(e.into_network_error().into()),
        }
    }
}
