//! Periodic trigger for enrichment passes.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{EnrichmentPipeline, TickOutcome};

/// Fires a pipeline tick every `interval` until cancelled.
///
/// Ticks are spawned rather than awaited so a slow pass never delays the
/// timer; overlapping ticks are turned away by the pipeline's guard.
#[derive(Debug)]
pub struct Scheduler {
    pipeline: Arc<EnrichmentPipeline>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(pipeline: Arc<EnrichmentPipeline>, interval: Duration) -> Self {
        Self { pipeline, interval }
    }

    /// Run until `cancel` fires, then wait for in-flight passes to finish.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!("Enrichment scheduler started (every {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut passes = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    while passes.try_join_next().is_some() {}

                    let pipeline = self.pipeline.clone();
                    passes.spawn(async move {
                        match pipeline.tick().await {
                            Ok(TickOutcome::Completed(_)) => {}
                            Ok(TickOutcome::AlreadyRunning) => {
                                tracing::debug!("Previous enrichment pass still in flight");
                            }
                            Err(e) => {
                                tracing::error!("Enrichment pass failed: {} ({})", e, e.user_message());
                            }
                        }
                    });
                }
            }
        }

        tracing::info!("Enrichment scheduler stopping, waiting for in-flight pass");
        while let Some(result) = passes.join_next().await {
            if let Err(e) = result {
                tracing::error!("Enrichment pass task panicked: {}", e);
            }
        }
        tracing::info!("Enrichment scheduler stopped");
    }
}
