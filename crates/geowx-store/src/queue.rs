//! Pending enrichment queue.

use chrono::Utc;
use geowx_core::PendingItem;
use rusqlite::{params, TransactionBehavior};

use crate::db::{Database, DbResult};

/// Outcome of claiming one queue row.
///
/// `previous` is the row the delete observed. A claimer that lost a race
/// against another claimer sees `None` and must not process the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub previous: Option<PendingItem>,
}

impl Claim {
    pub fn observed(item: PendingItem) -> Self {
        Self {
            previous: Some(item),
        }
    }

    pub fn lost() -> Self {
        Self { previous: None }
    }
}

/// Queue of sessions awaiting enrichment.
///
/// Implementations are used from the blocking thread pool.
pub trait PendingQueue: Send + Sync {
    /// Add (or replace) the pending entry for a session.
    fn enqueue(&self, item: &PendingItem) -> DbResult<()>;

    /// Atomically delete every pending entry and return what was deleted.
    ///
    /// An empty queue yields an empty vector.
    fn claim_all(&self) -> DbResult<Vec<Claim>>;

    /// Number of entries currently waiting.
    fn pending_count(&self) -> DbResult<usize>;
}

/// SQLite-backed pending queue.
#[derive(Debug, Clone)]
pub struct SqlitePendingQueue {
    db: Database,
}

impl SqlitePendingQueue {
    pub fn new(db: &Database) -> DbResult<Self> {
        let queue = Self { db: db.clone() };
        queue.init_schema()?;
        Ok(queue)
    }

    fn init_schema(&self) -> DbResult<()> {
        self.db.with_conn(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS pending_geo_sessions (
                    id TEXT PRIMARY KEY,
                    ip TEXT NOT NULL,
                    queued_at INTEGER NOT NULL
                );
                "#,
            )?;
            Ok(())
        })
    }
}

impl PendingQueue for SqlitePendingQueue {
    fn enqueue(&self, item: &PendingItem) -> DbResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO pending_geo_sessions (id, ip, queued_at) VALUES (?1, ?2, ?3)",
                params![item.id, item.ip, Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
    }

    fn claim_all(&self) -> DbResult<Vec<Claim>> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let claimed = {
                let mut stmt = tx.prepare("DELETE FROM pending_geo_sessions RETURNING id, ip")?;
                let rows = stmt.query_map([], |row| {
                    Ok(PendingItem {
                        id: row.get(0)?,
                        ip: row.get(1)?,
                    })
                })?;
                rows.map(|row| row.map(Claim::observed))
                    .collect::<Result<Vec<_>, _>>()?
            };
            tx.commit()?;

            if !claimed.is_empty() {
                tracing::debug!("Claimed {} pending sessions", claimed.len());
            }
            Ok(claimed)
        })
    }

    fn pending_count(&self) -> DbResult<usize> {
        self.db.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM pending_geo_sessions", [], |row| {
                    row.get(0)
                })?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
    }
}
