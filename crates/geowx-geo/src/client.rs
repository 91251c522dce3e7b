//! HTTP client for the IP geolocation API (Telize-compatible).
//!
//! `GET {base_url}/{ip}` answers with a flat JSON object; only `latitude`
//! and `longitude` are required, place names default to empty strings.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use geowx_core::error::{NetworkError, ReqwestErrorExt};
use geowx_core::{GeoConfig, GeoRecord, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;

/// Geolocation lookup errors
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    #[error("Geolocation API returned status {0}")]
    Status(u16),
    #[error("Invalid IP address: {0}")]
    InvalidIp(String),
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Raw geolocation API response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoIpResponse {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub region_code: Option<String>,
    pub country_code: Option<String>,
    pub city: Option<String>,
}

impl GeoIpResponse {
    /// Normalize into a `GeoRecord`.
    ///
    /// Returns `None` unless both coordinates are present.
    pub fn into_record(self) -> Option<GeoRecord> {
        let latitude = self.latitude?;
        let longitude = self.longitude?;

        Some(GeoRecord {
            country: self.country.unwrap_or_default(),
            region: self.region.unwrap_or_default(),
            region_code: self.region_code.unwrap_or_default(),
            country_code: self.country_code.unwrap_or_default(),
            city: self.city.unwrap_or_default(),
            longitude,
            latitude,
        })
    }
}

/// Geolocation API client
#[derive(Debug, Clone)]
pub struct GeoIpClient {
    base_url: String,
    client: Arc<Client>,
}

impl GeoIpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GeoError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GeoError::Client(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Arc::new(client),
        })
    }

    pub fn from_config(config: &GeoConfig) -> Result<Self, GeoError> {
        Self::new(&config.api_url, Duration::from_secs(config.timeout_secs))
    }

    /// Look up `ip`. Only transport and HTTP status failures are errors;
    /// a body that does not decode yields an empty response.
    pub async fn lookup(&self, ip: IpAddr) -> Result<GeoIpResponse, GeoError> {
        let url = format!("{}/{}", self.base_url, ip);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        if !response.status().is_success() {
            return Err(GeoError::Status(response.status().as_u16()));
        }

        match response.json::<GeoIpResponse>().await {
            Ok(body) => Ok(body),
            Err(e) if e.is_decode() => {
                tracing::debug!("Geolocation response for {} did not decode: {}", ip, e);
                Ok(GeoIpResponse::default())
            }
            Err(e) => Err(e.into_network_error().into()),
        }
    }
}
