//! `livecast` publisher
//!
//! Controls a single outbound live stream on top of an external media engine
//! that provides capture, encoding and the RTMP transport.
//!
//! ## Architecture
//!
//! - **`SessionController`**: owns the session and serializes commands and engine events
//! - **`ConnectionStateMachine`**: idle → connecting → connected → publishing → closed/failed
//! - **`AdaptationController`**: cuts the video bitrate under uplink backpressure
//! - **`BandwidthEstimator`**: keeps the latest throughput report
//! - **`CommandHandler`**: maps host method calls onto the controller
//!
//! ## Usage
//!
//! ```rust,ignore
//! use livecast_publisher::{CommandHandler, SessionController};
//!
//! let (controller, mut notifications) = SessionController::new(engine, config.publisher);
//! controller.spawn_event_loop();
//!
//! let commands = CommandHandler::new(controller);
//! commands.handle("configure", json!({ "broadcastUrl": "rtmp://host/app/key" }))?;
//! commands.handle("startStream", json!({ "width": 1280, "height": 720 }))?;
//!
//! while let Some(notification) = notifications.recv().await {
//!     host.invoke(notification.method(), notification.arguments());
//! }
//! ```

mod adaptation;
mod command;
mod engine;
mod error;
mod estimator;
mod notification;
mod session;
mod state;
mod types;

pub use adaptation::{AdaptationController, AdaptationDecision, AdaptationPolicy};
pub use command::CommandHandler;
pub use engine::{status_code, EngineEnvelope, EngineError, EngineEvent, EventSink, MediaEngine};
pub use error::{Error, Result};
pub use estimator::{BandwidthEstimator, BandwidthSample};
pub use notification::{Notification, RtmpStatus};
pub use session::SessionController;
pub use state::{ConnectionState, ConnectionStateMachine};
pub use types::{
    AudioSettings, BroadcastUrl, CameraPosition, CaptureSettings, H264Profile, SessionPreset,
    StreamKey, VideoSettings,
};
