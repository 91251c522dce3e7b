//! Session records and their enrichment fields.

use geowx_core::{GeoPoint, GeoRecord, Session, SessionEnrichment, WeatherRecord};
use rusqlite::{params, OptionalExtension};

use crate::db::{Database, DbResult};

/// Storage for the sessions being enriched.
///
/// Implementations are used from the blocking thread pool.
pub trait SessionStore: Send + Sync {
    /// Register a session with no enrichment yet.
    fn create(&self, id: &str, ip: &str) -> DbResult<()>;

    fn get(&self, id: &str) -> DbResult<Option<Session>>;

    /// Overwrite the `geo`, `point` and `weather` fields of a session.
    ///
    /// Returns `false` when no session has that id.
    fn update(&self, id: &str, enrichment: &SessionEnrichment) -> DbResult<bool>;
}

/// SQLite-backed session store.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    db: Database,
}

impl SqliteSessionStore {
    pub fn new(db: &Database) -> DbResult<Self> {
        let store = Self { db: db.clone() };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> DbResult<()> {
        self.db.with_conn(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS sessions (
                    id TEXT PRIMARY KEY,
                    ip TEXT NOT NULL,
                    geo_json TEXT,
                    point_longitude REAL,
                    point_latitude REAL,
                    weather_json TEXT
                );
                "#,
            )?;
            Ok(())
        })
    }
}

impl SessionStore for SqliteSessionStore {
    fn create(&self, id: &str, ip: &str) -> DbResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, ip) VALUES (?1, ?2)",
                params![id, ip],
            )?;
            Ok(())
        })
    }

    fn get(&self, id: &str) -> DbResult<Option<Session>> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, ip, geo_json, point_longitude, point_latitude, weather_json FROM sessions WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, Option<f64>>(3)?,
                            row.get::<_, Option<f64>>(4)?,
                            row.get::<_, Option<String>>(5)?,
                        ))
                    },
                )
                .optional()?;

            let Some((id, ip, geo_json, longitude, latitude, weather_json)) = row else {
                return Ok(None);
            };

            let geo = geo_json
                .as_deref()
                .map(serde_json::from_str::<GeoRecord>)
                .transpose()?;
            let weather = weather_json
                .as_deref()
                .map(serde_json::from_str::<WeatherRecord>)
                .transpose()?;
            let point = match (longitude, latitude) {
                (Some(longitude), Some(latitude)) => Some(GeoPoint {
                    longitude,
                    latitude,
                }),
                _ => None,
            };

            Ok(Some(Session {
                id,
                ip,
                enrichment: SessionEnrichment {
                    geo,
                    point,
                    weather,
                },
            }))
        })
    }

    fn update(&self, id: &str, enrichment: &SessionEnrichment) -> DbResult<bool> {
        let geo_json = enrichment
            .geo
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let weather_json = enrichment
            .weather
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let (longitude, latitude) = match enrichment.point {
            Some(point) => (Some(point.longitude), Some(point.latitude)),
            None => (None, None),
        };

        self.db.with_conn(|conn| {
            let changed = conn.execute(
                r#"
                UPDATE sessions
                SET geo_json = ?2, point_longitude = ?3, point_latitude = ?4, weather_json = ?5
                WHERE id = ?1
                "#,
                params![id, geo_json, longitude, latitude, weather_json],
            )?;
            Ok(changed > 0)
        })
    }
}
