//! Media Engine capability surface
//!
//! The engine owns capture, encoding and the RTMP transport. The controller only
//! drives it through [`MediaEngine`] and learns about progress through
//! [`EngineEvent`]s pushed into the [`EventSink`] it hands over on configure.
//! Capability calls never block on the network: `connect`, `publish` and `close`
//! complete later through the event path.

use crate::estimator::BandwidthSample;
use crate::types::{AudioSettings, CameraPosition, CaptureSettings, StreamKey, VideoSettings};
use thiserror::Error;
use tokio::sync::mpsc;

/// RTMP `NetConnection` status codes
pub mod status_code {
    pub const CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";
    pub const CONNECT_FAILED: &str = "NetConnection.Connect.Failed";
    pub const CONNECT_CLOSED: &str = "NetConnection.Connect.Closed";
}

/// Failures reported synchronously by engine setup calls.
///
/// These are never fatal for the session; the stream continues degraded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("audio session: {0}")]
    AudioSession(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("stream setup: {0}")]
    StreamSetup(String),
}

#[cfg_attr(test, mockall::automock)]
pub trait MediaEngine: Send + Sync {
    /// Configure the platform audio session for play-and-record
    fn configure_audio_session(&self) -> Result<(), EngineError>;

    /// Create the stream objects with capture and audio settings
    fn prepare_stream(
        &self,
        capture: &CaptureSettings,
        audio: &AudioSettings,
    ) -> Result<(), EngineError>;

    /// Register the sink receiving connection, error, bandwidth and statistics events
    fn subscribe(&self, sink: EventSink);

    fn attach_audio(&self) -> Result<(), EngineError>;

    fn attach_camera(&self, position: CameraPosition) -> Result<(), EngineError>;

    fn connect(&self, url: &str);

    fn set_video_settings(&self, settings: &VideoSettings);

    fn publish(&self, stream_key: &StreamKey);

    /// Release the publish handle
    fn close(&self);

    /// Change the live encoder bitrate (bps)
    fn set_video_bitrate(&self, bitrate: u32);
}

/// Asynchronous notifications from the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ConnectSuccess,
    ConnectFailed,
    ConnectClosed,
    IoError(String),
    /// Encoder output exceeds the available uplink
    InsufficientBandwidth,
    SufficientBandwidth,
    /// Periodic publish statistics
    Statistics(BandwidthSample),
}

impl EngineEvent {
    /// Translate an RTMP status code. Codes the controller does not act on map to `None`.
    #[must_use]
    pub fn from_status_code(code: &str) -> Option<Self> {
        match code {
            status_code::CONNECT_SUCCESS => Some(Self::ConnectSuccess),
            status_code::CONNECT_FAILED => Some(Self::ConnectFailed),
            status_code::CONNECT_CLOSED => Some(Self::ConnectClosed),
            _ => None,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConnectSuccess => "connect_success",
            Self::ConnectFailed => "connect_failed",
            Self::ConnectClosed => "connect_closed",
            Self::IoError(_) => "io_error",
            Self::InsufficientBandwidth => "insufficient_bandwidth",
            Self::SufficientBandwidth => "sufficient_bandwidth",
            Self::Statistics(_) => "statistics",
        }
    }
}

/// An engine event stamped with the session generation it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEnvelope {
    pub generation: u64,
    pub event: EngineEvent,
}

/// Handle the engine uses to report events for one session generation
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<EngineEnvelope>,
}

impl EventSink {
    pub(crate) const fn new(generation: u64, tx: mpsc::UnboundedSender<EngineEnvelope>) -> Self {
        Self { generation, tx }
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue an event. Returns false once the controller is gone.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(EngineEnvelope {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Translate and queue an RTMP status code; unknown codes are dropped.
    pub fn emit_status_code(&self, code: &str) -> bool {
        match EngineEvent::from_status_code(code) {
            Some(event) => self.emit(event),
            None => {
                tracing::trace!(code, "Ignoring RTMP status code");
                true
            }
        }
    }
}
