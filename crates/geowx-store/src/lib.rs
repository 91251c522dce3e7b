//! SQLite persistence for geowx.
//!
//! One database file holds the pending queue, the sessions and the two
//! lookup caches.

pub mod db;
pub mod queue;
pub mod session;
pub mod ttl_cache;

pub use db::{run_blocking, Database, DbResult};
pub use queue::{Claim, PendingQueue, SqlitePendingQueue};
pub use session::{SessionStore, SqliteSessionStore};
pub use ttl_cache::{CacheEntry, TtlCache};
