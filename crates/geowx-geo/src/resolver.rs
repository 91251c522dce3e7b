//! Cache-aside geolocation resolution.

use std::net::IpAddr;

use geowx_core::GeoRecord;

use crate::cache::GeoCache;
use crate::client::{GeoError, GeoIpClient};

/// Resolves a client IP to a `GeoRecord`, consulting the cache first.
///
/// Failures are never cached, so an IP that failed once is retried on the
/// next pass.
#[derive(Debug, Clone)]
pub struct GeoResolver {
    cache: GeoCache,
    client: GeoIpClient,
}

impl GeoResolver {
    pub fn new(cache: GeoCache, client: GeoIpClient) -> Self {
        Self { cache, client }
    }

    pub fn cache(&self) -> &GeoCache {
        &self.cache
    }

    /// Resolve `ip`, returning `None` when no geolocation is available.
    pub async fn resolve(&self, ip: &str) -> Option<GeoRecord> {
        match self.cache.get(ip).await {
            Ok(Some(entry)) => {
                tracing::debug!("Geolocation cache hit for {}", ip);
                return Some(entry.value);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Geolocation cache read failed for {}: {}", ip, e),
        }

        let record = match self.fetch(ip).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!("Geolocation API returned no coordinates for {}", ip);
                return None;
            }
            Err(e) => {
                tracing::warn!("Geolocation lookup failed for {}: {}", ip, e);
                return None;
            }
        };

        match self.cache.put(ip, record.clone()).await {
            Ok(entry) => Some(entry.value),
            Err(e) => {
                tracing::warn!("Failed to cache geolocation for {}: {}", ip, e);
                Some(record)
            }
        }
    }

    async fn fetch(&self, ip: &str) -> Result<Option<GeoRecord>, GeoError> {
        let addr: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| GeoError::InvalidIp(ip.to_string()))?;
        let response = self.client.lookup(addr).await?;
        Ok(response.into_record())
    }
}
