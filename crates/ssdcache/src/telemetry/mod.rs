// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache telemetry integration with OpenTelemetry.
//!
//! Step operations emit structured `tracing` events and OpenTelemetry metrics when
//! enabled through [`TelemetryConfig`]. Both are off by default.

use std::sync::Arc;

use opentelemetry::logs::Severity;
use opentelemetry::metrics::{Meter, MeterProvider};

pub(crate) mod attributes;
pub(crate) mod cache;
pub(crate) mod metrics;
#[cfg(test)]
pub(crate) mod testing;

/// Static string identifying a cache instance in logs and metrics.
pub type CacheName = &'static str;

/// Telemetry recorder of an [`SsdCache`](crate::SsdCache).
///
/// Cloning is cheap; clones share instruments.
#[derive(Clone, Debug)]
pub struct CacheTelemetry {
    inner: Arc<cache::CacheTelemetryInner>,
}

/// Configuration for cache telemetry.
///
/// # Examples
///
/// ```
/// use ssdcache::TelemetryConfig;
///
/// let provider = opentelemetry::global::meter_provider();
/// let config = TelemetryConfig::new().with_logs().with_metrics(provider.as_ref());
/// ```
#[derive(Clone, Debug, Default)]
pub struct TelemetryConfig {
    logs_enabled: bool,
    meter: Option<Meter>,
}

impl TelemetryConfig {
    /// Creates a configuration with logs and metrics disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables structured logging through `tracing`.
    #[must_use]
    pub fn with_logs(self) -> Self {
        Self {
            logs_enabled: true,
            ..self
        }
    }

    /// Enables metrics through the given meter provider.
    #[must_use]
    pub fn with_metrics(mut self, provider: &dyn MeterProvider) -> Self {
        self.meter = Some(metrics::scoped_meter(provider));
        self
    }

    /// Returns `true` if neither logs nor metrics are enabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        !self.logs_enabled && self.meter.is_none()
    }

    pub(crate) fn build(self) -> CacheTelemetry {
        CacheTelemetry::new(self.logs_enabled, self.meter.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheOperation {
    Prefetch,
    FinishStep,
    Flush,
    Compact,
}

impl CacheOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prefetch => "ssd_cache.prefetch",
            Self::FinishStep => "ssd_cache.finish_step",
            Self::Flush => "ssd_cache.flush",
            Self::Compact => "ssd_cache.compact",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    Hit,
    Miss,
    ConflictMiss,
    Eviction,
    DirtyEviction,
    WrittenBack,
    Ok,
    Error,
}

impl CacheActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "ssd_cache.hit",
            Self::Miss => "ssd_cache.miss",
            Self::ConflictMiss => "ssd_cache.conflict_miss",
            Self::Eviction => "ssd_cache.eviction",
            Self::DirtyEviction => "ssd_cache.dirty_eviction",
            Self::WrittenBack => "ssd_cache.written_back",
            Self::Ok => "ssd_cache.ok",
            Self::Error => "ssd_cache.error",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::Hit | Self::Miss | Self::Eviction | Self::WrittenBack | Self::Ok => Severity::Debug,
            Self::ConflictMiss | Self::DirtyEviction => Severity::Info,
            Self::Error => Severity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_operation_as_str() {
        assert_eq!(CacheOperation::Prefetch.as_str(), "ssd_cache.prefetch");
        assert_eq!(CacheOperation::FinishStep.as_str(), "ssd_cache.finish_step");
        assert_eq!(CacheOperation::Flush.as_str(), "ssd_cache.flush");
        assert_eq!(CacheOperation::Compact.as_str(), "ssd_cache.compact");
    }

    #[test]
    fn cache_activity_as_str() {
        assert_eq!(CacheActivity::Hit.as_str(), "ssd_cache.hit");
        assert_eq!(CacheActivity::Miss.as_str(), "ssd_cache.miss");
        assert_eq!(CacheActivity::ConflictMiss.as_str(), "ssd_cache.conflict_miss");
        assert_eq!(CacheActivity::Eviction.as_str(), "ssd_cache.eviction");
        assert_eq!(CacheActivity::DirtyEviction.as_str(), "ssd_cache.dirty_eviction");
        assert_eq!(CacheActivity::WrittenBack.as_str(), "ssd_cache.written_back");
        assert_eq!(CacheActivity::Ok.as_str(), "ssd_cache.ok");
        assert_eq!(CacheActivity::Error.as_str(), "ssd_cache.error");
    }

    #[test]
    fn cache_activity_severity() {
        assert_eq!(CacheActivity::Hit.severity(), Severity::Debug);
        assert_eq!(CacheActivity::Ok.severity(), Severity::Debug);
        assert_eq!(CacheActivity::ConflictMiss.severity(), Severity::Info);
        assert_eq!(CacheActivity::DirtyEviction.severity(), Severity::Info);
        assert_eq!(CacheActivity::Error.severity(), Severity::Error);
    }

    #[test]
    fn telemetry_config_defaults_to_disabled() {
        assert!(TelemetryConfig::new().is_disabled());
        assert!(!TelemetryConfig::new().with_logs().is_disabled());
    }
}
