//! Weather cache keyed by `"{longitude},{latitude}"`.

use chrono::Duration;
use geowx_core::WeatherRecord;
use geowx_store::{Database, DbResult, TtlCache};

pub const WEATHER_CACHE_TABLE: &str = "cached_weathers";

/// Default lifetime of a cached weather reading.
pub const DEFAULT_WEATHER_TTL_HOURS: i64 = 3;

pub type WeatherCache = TtlCache<WeatherRecord>;

/// Open the weather cache on `db`.
pub fn open_weather_cache(db: &Database, ttl: Duration) -> DbResult<WeatherCache> {
    TtlCache::new(db, WEATHER_CACHE_TABLE, ttl)
}
