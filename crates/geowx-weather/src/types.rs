use geowx_core::error::NetworkError;
use geowx_core::WeatherRecord;
use serde::Deserialize;

/// One entry of the `weather` array
#[derive(Debug, Clone, Deserialize)]
pub struct ConditionEntry {
    /// Condition group, e.g. "Clear", "Rain", "Snow"
    pub main: String,
    /// Icon id, e.g. "01d"
    pub icon: String,
}

/// The `main` block of readings
#[derive(Debug, Clone, Deserialize)]
pub struct MainReadings {
    pub temp: f64,
}

/// Current-weather API response. Only the fields we keep are modelled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentWeatherResponse {
    pub weather: Option<Vec<ConditionEntry>>,
    pub main: Option<MainReadings>,
}

impl CurrentWeatherResponse {
    /// Extract a `WeatherRecord` from the first condition and the temperature.
    ///
    /// Returns `None` when `weather` is missing or empty, or `main.temp` is absent.
    pub fn into_record(self) -> Option<WeatherRecord> {
        let condition = self.weather?.into_iter().next()?;
        let main = self.main?;

        Some(WeatherRecord {
            kind: condition.main,
            temperature: main.temp,
            weather_icon: condition.icon,
        })
    }
}

/// Cache key for a coordinate pair: `"{longitude},{latitude}"`.
///
/// Floats are formatted as-is, so nearby but distinct readings get distinct keys.
pub fn coordinate_key(longitude: f64, latitude: f64) -> String {
    format!("{},{}", longitude, latitude)
}

/// Weather provider errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    #[error("Weather API returned status {0}")]
    Status(u16),
    #[error("No weather API key configured")]
    MissingApiKey,
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}
