//! Outbound throughput tracking
//!
//! The engine already reports a per-interval throughput figure, so the
//! estimator keeps the latest sample as-is instead of smoothing it. Rate
//! limiting of the decisions that sample may drive lives in
//! [`AdaptationController`](crate::adaptation::AdaptationController).

use std::time::Instant;
use tracing::debug;

/// One statistics report from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandwidthSample {
    pub at: Instant,
    /// Measured outbound throughput in bytes per second
    pub bytes_out_per_sec: u64,
    pub fps: u16,
}

impl BandwidthSample {
    #[must_use]
    pub fn new(bytes_out_per_sec: u64, fps: u16) -> Self {
        Self {
            at: Instant::now(),
            bytes_out_per_sec,
            fps,
        }
    }

    /// Throughput in kilobits per second
    #[must_use]
    pub const fn kbps(&self) -> u64 {
        self.bytes_out_per_sec / 125
    }
}

#[derive(Debug, Default)]
pub struct BandwidthEstimator {
    latest: Option<BandwidthSample>,
}

impl BandwidthEstimator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, sample: BandwidthSample) {
        debug!(fps = sample.fps, kbps = sample.kbps(), "Publish statistics");
        self.latest = Some(sample);
    }

    /// Most recent sample, `None` until the engine reports one
    #[must_use]
    pub const fn current_throughput(&self) -> Option<BandwidthSample> {
        self.latest
    }
}
