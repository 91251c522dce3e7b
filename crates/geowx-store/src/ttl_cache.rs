//! SQLite-backed key/value cache with per-entry expiry.
//!
//! Entries are written once per TTL window: a `put` against a live key keeps
//! the existing value, a `put` against an expired key replaces it. Reads
//! check `expires_at` themselves instead of trusting a background purge.

use std::marker::PhantomData;

use chrono::{DateTime, Duration, Utc};
use geowx_core::error::DatabaseError;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::{run_blocking, Database, DbResult};

/// A cached value together with its lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Typed TTL cache stored in its own table.
pub struct TtlCache<V> {
    db: Database,
    table: &'static str,
    ttl: Duration,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            table: self.table,
            ttl: self.ttl,
            _value: PhantomData,
        }
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("table", &self.table)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<V> TtlCache<V>
where
    V: Serialize + DeserializeOwned + Send + 'static,
{
    /// Create the cache, creating `table` if needed.
    ///
    /// `table` must be a plain SQL identifier.
    pub fn new(db: &Database, table: &'static str, ttl: Duration) -> DbResult<Self> {
        let cache = Self {
            db: db.clone(),
            table,
            ttl,
            _value: PhantomData,
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> DbResult<()> {
        let table = self.table;
        self.db.with_conn(|conn| {
            conn.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    key TEXT PRIMARY KEY,
                    value_json TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_{table}_expires ON {table}(expires_at);
                "#
            ))?;
            Ok(())
        })
    }

    /// Look up a live entry as of `now`.
    pub fn lookup_at(&self, key: &str, now: DateTime<Utc>) -> DbResult<Option<CacheEntry<V>>> {
        self.db
            .with_conn(|conn| select_entry(conn, self.table, key))
            .map(|entry| entry.filter(|e| !e.is_expired_at(now)))
    }

    /// Store `value` under `key` as of `now` and return the entry that ends up cached.
    ///
    /// When a live entry already exists it is kept and returned unchanged.
    pub fn store_at(&self, key: &str, value: &V, now: DateTime<Utc>) -> DbResult<CacheEntry<V>> {
        let value_json = serde_json::to_string(value)?;
        let created_at = now.timestamp_millis();
        let table = self.table;
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| {
                DatabaseError::QueryFailed(format!("{table}: ttl {} out of range", self.ttl))
            })?
            .timestamp_millis();

        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    r#"
                    INSERT INTO {table} (key, value_json, created_at, expires_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(key) DO UPDATE SET
                        value_json = excluded.value_json,
                        created_at = excluded.created_at,
                        expires_at = excluded.expires_at
                    WHERE {table}.expires_at <= excluded.created_at
                    "#
                ),
                params![key, value_json, created_at, expires_at],
            )?;

            select_entry(conn, table, key)?.ok_or_else(|| {
                DatabaseError::QueryFailed(format!("{table}: entry {key} missing after insert"))
            })
        })
    }

    /// Delete every entry expired as of `now`. Returns the number removed.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> DbResult<usize> {
        let table = self.table;
        self.db.with_conn(|conn| {
            let removed = conn.execute(
                &format!("DELETE FROM {table} WHERE expires_at <= ?1"),
                params![now.timestamp_millis()],
            )?;
            Ok(removed)
        })
    }

    /// Number of rows, expired or not.
    pub fn len(&self) -> DbResult<usize> {
        let table = self.table;
        self.db.with_conn(|conn| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
    }

    pub fn is_empty(&self) -> DbResult<bool> {
        self.len().map(|n| n == 0)
    }

    /// Async lookup against the current time.
    pub async fn get(&self, key: &str) -> DbResult<Option<CacheEntry<V>>> {
        let cache = self.clone();
        let key = key.to_string();
        run_blocking(move || cache.lookup_at(&key, Utc::now())).await
    }

    /// Async store against the current time.
    pub async fn put(&self, key: &str, value: V) -> DbResult<CacheEntry<V>> {
        let cache = self.clone();
        let key = key.to_string();
        run_blocking(move || cache.store_at(&key, &value, Utc::now())).await
    }

    /// Async purge against the current time.
    pub async fn purge_expired(&self) -> DbResult<usize> {
        let cache = self.clone();
        run_blocking(move || cache.purge_expired_at(Utc::now())).await
    }
}

fn select_entry<V: DeserializeOwned>(
    conn: &Connection,
    table: &str,
    key: &str,
) -> DbResult<Option<CacheEntry<V>>> {
    let row = conn
        .query_row(
            &format!("SELECT value_json, created_at, expires_at FROM {table} WHERE key = ?1"),
            params![key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((value_json, created_ms, expires_ms)) = row else {
        return Ok(None);
    };

    Ok(Some(CacheEntry {
        value: serde_json::from_str(&value_json)?,
        created_at: from_millis(created_ms)?,
        expires_at: from_millis(expires_ms)?,
    }))
}

fn from_millis(ms: i64) -> DbResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DatabaseError::Decode(format!("timestamp out of range: {ms}")))
}
