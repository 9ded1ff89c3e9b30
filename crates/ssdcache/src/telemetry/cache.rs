// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache telemetry implementation and recording.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::{KeyValue, logs::Severity, metrics::Meter};

use crate::telemetry::metrics::Instruments;
use crate::telemetry::{CacheActivity, CacheName, CacheOperation, CacheTelemetry, attributes};

#[derive(Debug)]
pub(crate) struct CacheTelemetryInner {
    logging_enabled: bool,
    instruments: Option<Instruments>,
}

impl CacheTelemetry {
    /// Creates a new cache telemetry collector.
    ///
    /// # Arguments
    ///
    /// * `logging_enabled` - Whether to emit `tracing` events
    /// * `meter` - The meter to create instruments from, if metrics are enabled
    #[must_use]
    pub fn new(logging_enabled: bool, meter: Option<&Meter>) -> Self {
        Self {
            inner: Arc::new(CacheTelemetryInner {
                logging_enabled,
                instruments: meter.map(Instruments::new),
            }),
        }
    }

    /// Records `count` occurrences of an activity of a step operation.
    ///
    /// # Arguments
    ///
    /// * `cache_name` - Static string identifying the cache instance
    /// * `operation` - The step operation
    /// * `activity` - What happened
    /// * `count` - How many times it happened; zero counts are not recorded
    /// * `timestamp` - The step timestamp
    /// * `duration` - Optional operation duration
    #[inline]
    pub(crate) fn record(
        &self,
        cache_name: CacheName,
        operation: CacheOperation,
        activity: CacheActivity,
        count: u64,
        timestamp: i64,
        duration: Option<Duration>,
    ) {
        if count == 0 {
            return;
        }

        let attrs = [
            KeyValue::new(attributes::CACHE_NAME, cache_name),
            KeyValue::new(attributes::CACHE_OPERATION_NAME, operation.as_str()),
            KeyValue::new(attributes::CACHE_ACTIVITY_NAME, activity.as_str()),
        ];

        if let Some(instruments) = &self.inner.instruments {
            instruments.count(count, &attrs);
            if let Some(elapsed) = duration {
                instruments.time(elapsed, &attrs);
            }
        }

        if self.inner.logging_enabled {
            Self::emit(cache_name, operation, activity, count, timestamp, duration);
        }
    }

    /// Records the number of occupied cache slots.
    #[inline]
    pub(crate) fn record_occupancy(&self, cache_name: CacheName, occupied: u64) {
        if let Some(instruments) = &self.inner.instruments {
            instruments.occupied(occupied, &[KeyValue::new(attributes::CACHE_NAME, cache_name)]);
        }
    }

    fn emit(
        cache_name: CacheName,
        operation: CacheOperation,
        activity: CacheActivity,
        count: u64,
        timestamp: i64,
        duration: Option<Duration>,
    ) {
        let op = operation.as_str();
        let ev = activity.as_str();
        let duration_ns = duration.map(|d| d.as_nanos());

        // Tracing level must be constant, so a macro selects the level.
        // Field names must match constants in attributes.rs.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    ssd_cache.name = cache_name,
                    ssd_cache.operation = op,
                    ssd_cache.activity = ev,
                    ssd_cache.count = count,
                    ssd_cache.timestamp = timestamp,
                    ssd_cache.duration_ns = ?duration_ns,
                    "ssd_cache.event"
                )
            };
        }

        match activity.severity() {
            Severity::Error => emit_event!(error),
            Severity::Info => emit_event!(info),
            Severity::Debug => emit_event!(debug),
            _ => {}
        }
    }
}
