//! The enrichment pass: claim, resolve geolocation, resolve weather, update.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use geowx_core::{AppError, Config, ConfigError};
use geowx_geo::{open_geo_cache, GeoIpClient, GeoResolver};
use geowx_store::{
    run_blocking, Claim, Database, PendingQueue, SqlitePendingQueue, SqliteSessionStore,
};
use geowx_weather::{open_weather_cache, WeatherProvider, WeatherResolver};

use crate::guard::PassGuard;
use crate::updater::SessionUpdater;

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Rows returned by the claim, including lost races
    pub claimed: usize,
    /// Claims that observed no prior value
    pub discarded: usize,
    /// Sessions written
    pub enriched: usize,
    /// Written sessions without geolocation
    pub geo_missing: usize,
    /// Written sessions without weather
    pub weather_missing: usize,
    /// Claimed items whose session does not exist
    pub session_missing: usize,
    /// Claimed items whose session write failed
    pub update_failed: usize,
    /// Expired cache rows removed before claiming
    pub purged: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Discarded => self.discarded += 1,
            ItemOutcome::Enriched { geo, weather } => {
                self.enriched += 1;
                if !geo {
                    self.geo_missing += 1;
                }
                if !weather {
                    self.weather_missing += 1;
                }
            }
            ItemOutcome::SessionMissing => self.session_missing += 1,
            ItemOutcome::UpdateFailed => self.update_failed += 1,
        }
    }
}

/// Result of a scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(PassSummary),
    /// Another pass held the guard; nothing was done.
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Discarded,
    Enriched { geo: bool, weather: bool },
    SessionMissing,
    UpdateFailed,
}

pub struct EnrichmentPipeline {
    queue: Arc<dyn PendingQueue>,
    geo: GeoResolver,
    weather: WeatherResolver,
    updater: SessionUpdater,
    guard: PassGuard,
    max_concurrent_items: usize,
    purge_expired: bool,
}

impl EnrichmentPipeline {
    pub fn new(
        queue: Arc<dyn PendingQueue>,
        geo: GeoResolver,
        weather: WeatherResolver,
        updater: SessionUpdater,
    ) -> Self {
        Self {
            queue,
            geo,
            weather,
            updater,
            guard: PassGuard::new(),
            max_concurrent_items: 1,
            purge_expired: false,
        }
    }

    /// Wire the whole pipeline onto `db` from configuration.
    ///
    /// HTTP clients that cannot be built from the settings surface as
    /// configuration errors.
    pub fn from_config(config: &Config, db: &Database) -> Result<Self, AppError> {
        let geo_cache = open_geo_cache(
            db,
            chrono::Duration::hours(i64::from(config.geo.cache_ttl_hours)),
        )?;
        let weather_cache = open_weather_cache(
            db,
            chrono::Duration::hours(i64::from(config.weather.cache_ttl_hours)),
        )?;

        let geo_client = GeoIpClient::from_config(&config.geo).map_err(|e| {
            ConfigError::Invalid(format!("geo: cannot build client: {}", e))
        })?;
        let provider = WeatherProvider::from_config(&config.weather).map_err(|e| {
            ConfigError::Invalid(format!("weather: cannot build client: {}", e))
        })?;

        let queue = SqlitePendingQueue::new(db)?;
        let sessions = SqliteSessionStore::new(db)?;

        Ok(Self::new(
            Arc::new(queue),
            GeoResolver::new(geo_cache, geo_client),
            WeatherResolver::new(weather_cache, provider),
            SessionUpdater::new(Arc::new(sessions)),
        )
        .with_max_concurrent_items(config.scheduler.max_concurrent_items)
        .with_purge_expired(config.scheduler.purge_expired))
    }

    /// Number of claimed items resolved concurrently (at least one).
    pub fn with_max_concurrent_items(mut self, n: usize) -> Self {
        self.max_concurrent_items = n.max(1);
        self
    }

    pub fn with_purge_expired(mut self, purge: bool) -> Self {
        self.purge_expired = purge;
        self
    }

    pub fn guard(&self) -> &PassGuard {
        &self.guard
    }

    /// Run a pass unless one is already in flight.
    ///
    /// The guard is held until every claimed item has been written.
    pub async fn tick(&self) -> Result<TickOutcome, AppError> {
        let Some(_permit) = self.guard.try_acquire() else {
            tracing::debug!("Enrichment pass already running, skipping tick");
            return Ok(TickOutcome::AlreadyRunning);
        };

        self.run_pass().await.map(TickOutcome::Completed)
    }

    /// Only a failed claim is an error; per-item failures end up in the summary.
    async fn run_pass(&self) -> Result<PassSummary, AppError> {
        let mut summary = PassSummary {
            purged: self.purge_caches().await,
            ..PassSummary::default()
        };

        let queue = self.queue.clone();
        let claims = run_blocking(move || queue.claim_all()).await?;
        summary.claimed = claims.len();

        if claims.is_empty() {
            tracing::debug!("No pending sessions");
            return Ok(summary);
        }

        let outcomes: Vec<ItemOutcome> = stream::iter(claims)
            .map(|claim| self.process(claim))
            .buffer_unordered(self.max_concurrent_items)
            .collect()
            .await;

        for outcome in outcomes {
            summary.record(outcome);
        }

        tracing::info!(
            claimed = summary.claimed,
            enriched = summary.enriched,
            discarded = summary.discarded,
            geo_missing = summary.geo_missing,
            weather_missing = summary.weather_missing,
            failed = summary.update_failed + summary.session_missing,
            "Enrichment pass complete"
        );
        Ok(summary)
    }

    async fn process(&self, claim: Claim) -> ItemOutcome {
        let Some(item) = claim.previous else {
            return ItemOutcome::Discarded;
        };

        let geo = self.geo.resolve(&item.ip).await;
        let weather = self.weather.resolve(geo.as_ref()).await;
        let outcome = ItemOutcome::Enriched {
            geo: geo.is_some(),
            weather: weather.is_some(),
        };

        match self.updater.apply(&item.id, geo, weather).await {
            Ok(true) => outcome,
            Ok(false) => {
                tracing::warn!("Session {} no longer exists, dropping enrichment", item.id);
                ItemOutcome::SessionMissing
            }
            Err(e) => {
                tracing::warn!("Failed to update session {}: {}", item.id, e);
                ItemOutcome::UpdateFailed
            }
        }
    }

    async fn purge_caches(&self) -> usize {
        if !self.purge_expired {
            return 0;
        }

        let mut purged = 0;
        match self.geo.cache().purge_expired().await {
            Ok(n) => purged += n,
            Err(e) => tracing::warn!("Failed to purge geolocation cache: {}", e),
        }
        match self.weather.cache().purge_expired().await {
            Ok(n) => purged += n,
            Err(e) => tracing::warn!("Failed to purge weather cache: {}", e),
        }
        if purged > 0 {
            tracing::debug!("Purged {} expired cache entries", purged);
        }
        purged
    }
}

impl std::fmt::Debug for EnrichmentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentPipeline")
            .field("max_concurrent_items", &self.max_concurrent_items)
            .field("purge_expired", &self.purge_expired)
            .field("running", &self.guard.is_running())
            .finish_non_exhaustive()
    }
}
