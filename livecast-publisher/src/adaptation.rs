//! Bitrate back-off under uplink pressure
//!
//! Each backpressure signal may cut the encoder bitrate by a fixed percentage,
//! at most once per cooldown window. Bursts of signals inside the window are
//! absorbed. There is no automatic step up: `SufficientBandwidth` is accepted
//! and ignored until a product decision defines an increase policy.

use crate::engine::MediaEngine;
use crate::estimator::{BandwidthEstimator, BandwidthSample};
use livecast_core::PublisherConfig;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptationPolicy {
    /// Share of the current bitrate kept per step, in percent
    pub decay_percent: u32,
    pub cooldown: Duration,
    /// Automatic adaptation never goes below this (bps)
    pub min_bitrate: u32,
}

impl Default for AdaptationPolicy {
    fn default() -> Self {
        Self::from(&PublisherConfig::default())
    }
}

impl From<&PublisherConfig> for AdaptationPolicy {
    fn from(config: &PublisherConfig) -> Self {
        Self {
            decay_percent: config.decay_percent,
            cooldown: config.adaptation_cooldown(),
            min_bitrate: config.min_bitrate,
        }
    }
}

/// A bitrate reduction that has been applied to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptationDecision {
    pub previous_bitrate: u32,
    pub new_bitrate: u32,
    pub at: Instant,
    /// Throughput the engine last reported before the decision
    pub throughput: Option<BandwidthSample>,
}

#[derive(Debug)]
pub struct AdaptationController {
    policy: AdaptationPolicy,
    current_bitrate: u32,
    last_adaptation: Option<Instant>,
}

impl AdaptationController {
    #[must_use]
    pub const fn new(policy: AdaptationPolicy, initial_bitrate: u32) -> Self {
        Self {
            policy,
            current_bitrate: initial_bitrate,
            last_adaptation: None,
        }
    }

    #[must_use]
    pub const fn current_bitrate(&self) -> u32 {
        self.current_bitrate
    }

    /// Record the bitrate the encoder was (re)configured with
    pub fn set_current_bitrate(&mut self, bitrate: u32) {
        self.current_bitrate = bitrate;
    }

    /// Compute the next bitrate without applying it.
    ///
    /// `None` while inside the cooldown window or when already at the floor.
    #[must_use]
    pub fn propose(&self, now: Instant) -> Option<u32> {
        if let Some(last) = self.last_adaptation {
            if now.saturating_duration_since(last) <= self.policy.cooldown {
                return None;
            }
        }

        let decayed = u64::from(self.current_bitrate) * u64::from(self.policy.decay_percent) / 100;
        let next = u32::try_from(decayed)
            .unwrap_or(u32::MAX)
            .max(self.policy.min_bitrate);

        (next < self.current_bitrate).then_some(next)
    }

    /// Handle a backpressure signal from the publish pipeline
    pub fn on_insufficient_bandwidth(
        &mut self,
        engine: &dyn MediaEngine,
        estimator: &BandwidthEstimator,
        now: Instant,
    ) -> Option<AdaptationDecision> {
        let Some(new_bitrate) = self.propose(now) else {
            debug!(
                bitrate = self.current_bitrate,
                "Insufficient bandwidth within cooldown or at floor, keeping bitrate"
            );
            return None;
        };

        engine.set_video_bitrate(new_bitrate);

        let decision = AdaptationDecision {
            previous_bitrate: self.current_bitrate,
            new_bitrate,
            at: now,
            throughput: estimator.current_throughput(),
        };
        self.current_bitrate = new_bitrate;
        self.last_adaptation = Some(now);

        info!(
            previous_bitrate = decision.previous_bitrate,
            new_bitrate,
            observed_kbps = decision.throughput.map(|sample| sample.kbps()),
            "Insufficient bandwidth, lowering video bitrate"
        );
        Some(decision)
    }

    /// Uplink has headroom again. Intentionally does nothing.
    pub fn on_sufficient_bandwidth(&mut self) {
        debug!(bitrate = self.current_bitrate, "Sufficient bandwidth reported");
    }
}
