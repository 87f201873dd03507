//! Metrics — Prometheus instrumentation for the level store and connector.
//!
//! Slimmed down from the teacher's full catalogue (blocks/transactions
//! pipeline throughput, RPC, cache, sync-lag) to the handful this
//! component can actually report: entries appended, entries removed,
//! cascade promotions, rebalance backfills, and corrupt-level
//! detections (§10.4 of SPEC_FULL.md). Kept on the same `prometheus`
//! crate and `Timer`/`gather_metrics` shape the teacher uses, swapping
//! `lazy_static` for `once_cell` (already this crate's global-state
//! primitive, see `config.rs` and `index_manager.rs`) since the
//! teacher's dependency for static init is no longer carried.

use std::time::Instant;

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static ENTRIES_APPENDED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "txaddridx_entries_appended_total",
        "Total entries appended to the level store",
    )
    .unwrap()
});

pub static ENTRIES_REMOVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "txaddridx_entries_removed_total",
        "Total entries removed from the level store",
    )
    .unwrap()
});

pub static CASCADE_PROMOTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "txaddridx_cascade_promotions_total",
        "Total upward level promotions triggered by append",
    )
    .unwrap()
});

pub static REBALANCE_BACKFILLS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "txaddridx_rebalance_backfills_total",
        "Total backfill-from-above passes triggered by remove",
    )
    .unwrap()
});

pub static CORRUPT_LEVELS_DETECTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "txaddridx_corrupt_levels_total",
        "Total level values rejected for not being a multiple of the entry size",
    )
    .unwrap()
});

pub static UNSUPPORTED_ADDRESSES_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "txaddridx_unsupported_addresses_skipped_total",
            "Total address classification skips, by call site",
        ),
        &["call_site"],
    )
    .unwrap()
});

/// Register every metric with [`REGISTRY`]. Call once at process start.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    REGISTRY.register(Box::new(ENTRIES_APPENDED.clone()))?;
    REGISTRY.register(Box::new(ENTRIES_REMOVED.clone()))?;
    REGISTRY.register(Box::new(CASCADE_PROMOTIONS.clone()))?;
    REGISTRY.register(Box::new(REBALANCE_BACKFILLS.clone()))?;
    REGISTRY.register(Box::new(CORRUPT_LEVELS_DETECTED.clone()))?;
    REGISTRY.register(Box::new(UNSUPPORTED_ADDRESSES_SKIPPED.clone()))?;
    Ok(())
}

/// Gather metrics in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Timer for measuring cascade/rebalance durations in trace spans.
pub struct Timer {
    start: Instant,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
