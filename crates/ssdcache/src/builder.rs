// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for [`SsdCache`].

use opentelemetry::metrics::MeterProvider;
use ssdcache_store::EmbeddingStore;
use tick::Clock;

use crate::telemetry::CacheName;
use crate::{CacheDirectory, ConfigError, ConfigErrorKind, SsdCache, SsdCacheConfig, TelemetryConfig};

const DEFAULT_NAME: CacheName = "ssd_cache";

/// Builder for an [`SsdCache`].
///
/// Created by [`SsdCache::builder`].
///
/// # Examples
///
/// ```
/// use ssdcache::{SsdCache, SsdCacheConfig};
/// use tick::Clock;
///
/// let config = SsdCacheConfig::builder().sets(4).ways(2).row_width(8).build()?;
/// let store = config.memory_store()?;
/// let cache = SsdCache::builder(config, store, Clock::new_frozen())
///     .name("user_embeddings")
///     .logs()
///     .build()?;
/// assert_eq!(cache.name(), "user_embeddings");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct SsdCacheBuilder<S> {
    name: CacheName,
    config: SsdCacheConfig,
    store: S,
    clock: Clock,
    telemetry: TelemetryConfig,
}

impl<S> SsdCacheBuilder<S>
where
    S: EmbeddingStore,
{
    pub(crate) fn new(config: SsdCacheConfig, store: S, clock: Clock) -> Self {
        Self {
            name: DEFAULT_NAME,
            config,
            store,
            clock,
            telemetry: TelemetryConfig::new(),
        }
    }

    /// Sets the name used in logs and metrics.
    #[must_use]
    pub fn name(mut self, name: CacheName) -> Self {
        self.name = name;
        self
    }

    /// Enables structured `tracing` events.
    #[must_use]
    pub fn logs(mut self) -> Self {
        self.telemetry = self.telemetry.with_logs();
        self
    }

    /// Enables OpenTelemetry metrics through `provider`.
    #[must_use]
    pub fn metrics(mut self, provider: &dyn MeterProvider) -> Self {
        self.telemetry = self.telemetry.with_metrics(provider);
        self
    }

    /// Replaces the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Builds the cache with every slot empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigErrorKind::RowWidthMismatch`] if the store's row size differs
    /// from the configured one, and [`ConfigErrorKind::InvalidCacheShape`] if the cache
    /// rows do not fit in memory.
    pub fn build(self) -> Result<SsdCache<S>, ConfigError> {
        if self.store.row_bytes() != self.config.row_bytes() {
            return Err(ConfigError::new(ConfigErrorKind::RowWidthMismatch));
        }
        if self.config.slots().checked_mul(self.config.row_bytes()).is_none() {
            return Err(ConfigError::new(ConfigErrorKind::InvalidCacheShape));
        }

        let directory = CacheDirectory::new(self.config.sets(), self.config.ways())?;
        Ok(SsdCache::new(
            self.name,
            self.config,
            self.store,
            directory,
            self.clock,
            self.telemetry,
        ))
    }
}

#[cfg(test)]
mod tests {
    use ssdcache_store::testing::MockStore;

    use super::*;

    fn config() -> SsdCacheConfig {
        SsdCacheConfig::builder().sets(2).ways(2).row_width(2).build().unwrap()
    }

    #[test]
    fn build_uses_default_name() {
        let config = config();
        let store = MockStore::new(config.row_bytes());
        let cache = SsdCache::builder(config, store, Clock::new_frozen()).build().unwrap();

        assert_eq!(cache.name(), "ssd_cache");
        assert_eq!(cache.directory().slots(), 4);
        assert_eq!(cache.directory().occupied(), 0);
    }

    #[test]
    fn build_rejects_row_width_mismatch() {
        let config = config();
        let store = MockStore::new(config.row_bytes() + 1);
        let err = SsdCache::builder(config, store, Clock::new_frozen()).build().unwrap_err();

        assert_eq!(err.kind(), ConfigErrorKind::RowWidthMismatch);
    }

    #[test]
    fn build_with_telemetry() {
        let config = config();
        let store = MockStore::new(config.row_bytes());
        let cache = SsdCache::builder(config, store, Clock::new_frozen())
            .name("tables")
            .telemetry(TelemetryConfig::new().with_logs())
            .build()
            .unwrap();

        assert_eq!(cache.name(), "tables");
    }
}
