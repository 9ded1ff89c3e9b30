// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `OpenTelemetry` instruments a cache records into.

use std::time::Duration;

use opentelemetry::{
    InstrumentationScope, KeyValue,
    metrics::{Counter, Gauge, Histogram, Meter, MeterProvider},
};

const SCOPE_NAME: &str = "ssdcache";
const SCOPE_SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";

pub(crate) const EVENT_COUNT: &str = "ssd_cache.event.count";
pub(crate) const OPERATION_DURATION: &str = "ssd_cache.operation.duration";
pub(crate) const OCCUPIED_SLOTS: &str = "ssd_cache.occupied_slots";

/// A meter scoped to this crate and its version.
pub(crate) fn scoped_meter(provider: &dyn MeterProvider) -> Meter {
    let scope = InstrumentationScope::builder(SCOPE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(SCOPE_SCHEMA_URL)
        .build();
    provider.meter_with_scope(scope)
}

/// Step event counter, operation duration histogram and slot occupancy gauge.
#[derive(Debug, Clone)]
pub(crate) struct Instruments {
    events: Counter<u64>,
    durations: Histogram<f64>,
    occupancy: Gauge<u64>,
}

impl Instruments {
    pub(crate) fn new(meter: &Meter) -> Self {
        Self {
            events: meter
                .u64_counter(EVENT_COUNT)
                .with_description("Hits, misses, evictions and outcomes of cache step operations")
                .with_unit("{event}")
                .build(),
            durations: meter
                .f64_histogram(OPERATION_DURATION)
                .with_description("Wall time of prefetch, finish_step, flush and compact")
                .with_unit("s")
                .build(),
            occupancy: meter
                .u64_gauge(OCCUPIED_SLOTS)
                .with_description("Cache slots holding a row after the last prefetch")
                .with_unit("{slot}")
                .build(),
        }
    }

    pub(crate) fn count(&self, count: u64, attrs: &[KeyValue]) {
        self.events.add(count, attrs);
    }

    pub(crate) fn time(&self, elapsed: Duration, attrs: &[KeyValue]) {
        self.durations.record(elapsed.as_secs_f64(), attrs);
    }

    pub(crate) fn occupied(&self, slots: u64, attrs: &[KeyValue]) {
        self.occupancy.record(slots, attrs);
    }
}
