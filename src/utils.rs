//! Utility functions for packet processing.
//!
//! This module contains shared utility functions used throughout the application.

use crate::network::processing::StatsSnapshot;
use log::info;

/// Logs interception statistics: packets seen, diverted and passed through,
/// plus the diversion percentage.
///
/// # Arguments
///
/// * `stats` - Snapshot of the engine counters
pub fn log_statistics(stats: &StatsSnapshot) {
    info!(
        "Seen Packets: {}, Diverted Packets: {}, Passed Packets: {} - {:.2}% diverted",
        stats.seen,
        stats.diverted,
        stats.passthrough,
        stats.diversion_rate()
    );

    if stats.enqueue_failures > 0 || stats.short_read_discards > 0 || stats.inject_failures > 0 {
        info!(
            "Enqueue Failures: {}, Short Reads: {}, Inject Failures: {}",
            stats.enqueue_failures, stats.short_read_discards, stats.inject_failures
        );
    }
}

/// Parses a log level name, falling back to `Info` for anything unknown.
///
/// # Arguments
///
/// * `level` - One of `off`, `error`, `warn`, `info`, `debug`, `trace` (any case)
pub fn parse_level(level: &str) -> log::LevelFilter {
    level.parse().unwrap_or(log::LevelFilter::Info)
}
