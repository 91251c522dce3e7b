//! IP geolocation for geowx.
//!
//! Resolves client IPs through a TTL cache backed by an external
//! geolocation API.

pub mod cache;
pub mod client;
pub mod resolver;

pub use cache::{open_geo_cache, GeoCache, GEO_CACHE_TABLE};
pub use client::{GeoError, GeoIpClient, GeoIpResponse};
pub use resolver::GeoResolver;
