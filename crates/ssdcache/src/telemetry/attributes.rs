// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

pub(crate) const CACHE_NAME: &str = "ssd_cache.name";

#[cfg(test)]
pub(crate) const CACHE_EVENT_NAME: &str = "ssd_cache.event";

pub(crate) const CACHE_OPERATION_NAME: &str = "ssd_cache.operation";

pub(crate) const CACHE_ACTIVITY_NAME: &str = "ssd_cache.activity";

#[cfg(test)]
pub(crate) const CACHE_COUNT_NAME: &str = "ssd_cache.count";

#[cfg(test)]
pub(crate) const CACHE_TIMESTAMP_NAME: &str = "ssd_cache.timestamp";

#[cfg(test)]
pub(crate) const CACHE_DURATION_NAME: &str = "ssd_cache.duration_ns";
