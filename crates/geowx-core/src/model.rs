//! Shared data model for the enrichment pipeline.
//!
//! These types cross crate boundaries: the store persists them, the resolvers
//! produce them and the pipeline moves them from one to the other.

use serde::{Deserialize, Serialize};

/// A session waiting for geolocation and weather enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingItem {
    /// Identifier of the session to enrich
    pub id: String,
    /// Client IP address recorded for the session
    pub ip: String,
}

impl PendingItem {
    pub fn new(id: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ip: ip.into(),
        }
    }
}

/// Geolocation resolved for a client IP.
///
/// A `GeoRecord` always carries coordinates; lookups that produce none
/// resolve to `None` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub region_code: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub city: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoRecord {
    /// Record with coordinates only; every place name is empty.
    pub fn at(longitude: f64, latitude: f64) -> Self {
        Self {
            country: String::new(),
            region: String::new(),
            region_code: String::new(),
            country_code: String::new(),
            city: String::new(),
            longitude,
            latitude,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            longitude: self.longitude,
            latitude: self.latitude,
        }
    }
}

/// Geospatial point stored alongside the session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

/// Current weather at a session's location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    /// Condition group, e.g. "Clear" or "Rain"
    #[serde(rename = "type")]
    pub kind: String,
    pub temperature: f64,
    pub weather_icon: String,
}

/// The three fields written onto a session by an enrichment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionEnrichment {
    pub geo: Option<GeoRecord>,
    pub point: Option<GeoPoint>,
    pub weather: Option<WeatherRecord>,
}

impl SessionEnrichment {
    /// Build the update, deriving `point` from the geolocation when present.
    pub fn new(geo: Option<GeoRecord>, weather: Option<WeatherRecord>) -> Self {
        let point = geo.as_ref().map(GeoRecord::point);
        Self {
            geo,
            point,
            weather,
        }
    }
}

/// A session row as seen by the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub ip: String,
    #[serde(flatten)]
    pub enrichment: SessionEnrichment,
}
