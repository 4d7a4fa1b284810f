//! Gateway counters.
//!
//! 32-bit atomics (Xtensa has no 64-bit ones), bumped from the ingestion
//! path and read by the `/metrics` handler.  Rendered in the Prometheus
//! text exposition format.

use core::fmt::Write;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::app::ports::MetricsPort;

#[derive(Debug, Default)]
pub struct GatewayMetrics {
    received_advertisements: AtomicU32,
    dropped_advertisements: AtomicU32,
    malformed_frames: AtomicU32,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub received_advertisements: u32,
    pub dropped_advertisements: u32,
    pub malformed_frames: u32,
}

impl GatewayMetrics {
    pub const fn new() -> Self {
        Self {
            received_advertisements: AtomicU32::new(0),
            dropped_advertisements: AtomicU32::new(0),
            malformed_frames: AtomicU32::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received_advertisements: self.received_advertisements.load(Ordering::Relaxed),
            dropped_advertisements: self.dropped_advertisements.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
        }
    }

    /// Prometheus text exposition of all counters.
    pub fn render(&self) -> String {
        let snap = self.snapshot();
        let mut out = String::with_capacity(384);
        for (name, help, value) in [
            (
                "blegw_received_advertisements",
                "Advertisement frames received from the BLE co-processor",
                snap.received_advertisements,
            ),
            (
                "blegw_dropped_advertisements",
                "Advertisements dropped because the table was full",
                snap.dropped_advertisements,
            ),
            (
                "blegw_malformed_frames",
                "Advertisement frames rejected by validation",
                snap.malformed_frames,
            ),
        ] {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {value}");
        }
        out
    }
}

impl MetricsPort for GatewayMetrics {
    fn increment_received_advertisements(&self) {
        self.received_advertisements.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_dropped_advertisements(&self) {
        self.dropped_advertisements.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_malformed_frames(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }
}
