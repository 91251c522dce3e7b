//! Geolocation cache keyed by client IP.

use chrono::Duration;
use geowx_core::GeoRecord;
use geowx_store::{Database, DbResult, TtlCache};

pub const GEO_CACHE_TABLE: &str = "cached_geolocations";

/// Default lifetime of a cached geolocation.
pub const DEFAULT_GEO_TTL_HOURS: i64 = 24;

pub type GeoCache = TtlCache<GeoRecord>;

/// Open the geolocation cache on `db`.
pub fn open_geo_cache(db: &Database, ttl: Duration) -> DbResult<GeoCache> {
    TtlCache::new(db, GEO_CACHE_TABLE, ttl)
}
