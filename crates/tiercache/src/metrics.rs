//! Prometheus metrics for tiered caches.
//!
//! This module provides:
//! - Hit/miss counters per tier
//! - Durable write and flush counters
//! - Live local-tier entry gauges per cache
//!
//! Recording is a no-op until a recorder is installed, either by the host
//! process or through [`init_metrics`].

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "tiercache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "tiercache_misses_total";
    pub const DURABLE_WRITES_TOTAL: &str = "tiercache_durable_writes_total";
    pub const FLUSHES_TOTAL: &str = "tiercache_flushes_total";
    pub const CACHE_ENTRIES: &str = "tiercache_entries";
}

/// Installs the Prometheus recorder.
///
/// Returns `true` if initialization succeeded, `false` if already initialized
/// or another recorder is installed.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }
            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Renders metrics in Prometheus text format, if the recorder is installed.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}

pub fn record_cache_hit(cache: &str, tier: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "cache" => cache.to_string(), "tier" => tier).increment(1);
}

pub fn record_cache_miss(cache: &str) {
    counter!(names::CACHE_MISSES_TOTAL, "cache" => cache.to_string()).increment(1);
}

pub fn record_flush(cache: &str, written: usize) {
    counter!(names::FLUSHES_TOTAL, "cache" => cache.to_string()).increment(1);
    counter!(names::DURABLE_WRITES_TOTAL, "cache" => cache.to_string()).increment(written as u64);
}

pub fn set_cache_entries(cache: &str, count: usize) {
    gauge!(names::CACHE_ENTRIES, "cache" => cache.to_string()).set(count as f64);
}
