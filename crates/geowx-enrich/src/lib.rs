//! Session enrichment pipeline.
//!
//! Claims pending sessions, resolves their geolocation and weather, and
//! writes the result back, one guarded pass at a time.

pub mod guard;
pub mod pipeline;
pub mod scheduler;
pub mod updater;

pub use guard::{PassGuard, PassPermit};
pub use pipeline::{EnrichmentPipeline, PassSummary, TickOutcome};
pub use scheduler::Scheduler;
pub use updater::SessionUpdater;
