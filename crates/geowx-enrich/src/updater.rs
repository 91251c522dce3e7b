//! Writes resolved geolocation and weather onto a session.

use std::sync::Arc;

use geowx_core::{GeoRecord, SessionEnrichment, WeatherRecord};
use geowx_store::{run_blocking, DbResult, SessionStore};

#[derive(Clone)]
pub struct SessionUpdater {
    sessions: Arc<dyn SessionStore>,
}

impl SessionUpdater {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }

    /// Overwrite the session's `geo`, `point` and `weather` fields.
    ///
    /// `point` is only set when a geolocation is present. Applying the same
    /// inputs twice leaves the session unchanged. Returns `false` when the
    /// session does not exist.
    pub async fn apply(
        &self,
        session_id: &str,
        geo: Option<GeoRecord>,
        weather: Option<WeatherRecord>,
    ) -> DbResult<bool> {
        let enrichment = SessionEnrichment::new(geo, weather);
        let sessions = self.sessions.clone();
        let id = session_id.to_string();
        run_blocking(move || sessions.update(&id, &enrichment)).await
    }
}

impl std::fmt::Debug for SessionUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionUpdater").finish_non_exhaustive()
    }
}
