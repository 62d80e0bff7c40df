//! Session controller - top-level orchestration for one outbound stream
//!
//! This module provides:
//! - The configure / start / end / switch-camera commands
//! - Serialized dispatch of engine events into the connection state machine
//!   and the adaptation controller
//! - Outward notifications for the host layer
//!
//! All session state sits behind one mutex. Engine callbacks never touch it
//! directly; they queue [`EngineEnvelope`]s through an [`EventSink`] and the
//! event loop applies them one at a time, so a command and a transition never
//! interleave. Engine implementations must report through the sink rather than
//! calling back into the controller from inside a capability call.

use crate::adaptation::{AdaptationController, AdaptationPolicy};
use crate::engine::{EngineEnvelope, EngineEvent, EventSink, MediaEngine};
use crate::error::{Error, Result};
use crate::estimator::{BandwidthEstimator, BandwidthSample};
use crate::notification::Notification;
use crate::state::{ConnectionState, ConnectionStateMachine};
use crate::types::{
    AudioSettings, BroadcastUrl, CameraPosition, CaptureSettings, H264Profile, SessionPreset,
    StreamKey, VideoSettings,
};
use livecast_core::PublisherConfig;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Mutable state of the single outbound stream
struct Session {
    /// Bumped by every configure; events from older generations are dropped
    generation: u64,
    target: Option<BroadcastUrl>,
    camera: CameraPosition,
    stream_prepared: bool,
    connection: ConnectionStateMachine,
    estimator: BandwidthEstimator,
    adaptation: AdaptationController,
    video: Option<VideoSettings>,
    /// Stream key waiting for the connection to come up
    pending_publish: Option<StreamKey>,
}

impl Session {
    fn new(config: &PublisherConfig) -> Self {
        Self {
            generation: 0,
            target: None,
            camera: CameraPosition::default(),
            stream_prepared: false,
            connection: ConnectionStateMachine::new(),
            estimator: BandwidthEstimator::new(),
            adaptation: AdaptationController::new(
                AdaptationPolicy::from(config),
                config.initial_bitrate,
            ),
            video: None,
            pending_publish: None,
        }
    }
}

pub struct SessionController {
    engine: Arc<dyn MediaEngine>,
    config: PublisherConfig,
    session: Mutex<Session>,
    events_tx: mpsc::UnboundedSender<EngineEnvelope>,
    /// Taken once by the event loop
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<EngineEnvelope>>>,
    notifications: mpsc::UnboundedSender<Notification>,
    /// Cancelled on drop so the event loop stops even while sinks stay alive
    shutdown: CancellationToken,
}

impl SessionController {
    /// Create a controller and the receiver the host reads notifications from.
    ///
    /// Engine events queue up until [`Self::spawn_event_loop`] or
    /// [`Self::take_event_receiver`] consumes them, so one of the two should be
    /// called right after construction.
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        config: PublisherConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Notification>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notifications, notifications_rx) = mpsc::unbounded_channel();

        let controller = Arc::new(Self {
            engine,
            session: Mutex::new(Session::new(&config)),
            config,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            notifications,
            shutdown: CancellationToken::new(),
        });

        (controller, notifications_rx)
    }

    #[must_use]
    pub const fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Store the broadcast URL, prepare the engine and start connecting.
    ///
    /// Starts a fresh session; only allowed while no connection is live.
    pub fn configure(&self, broadcast_url: &str) -> Result<()> {
        let target = BroadcastUrl::parse(broadcast_url)?;
        let mut session = self.session.lock();

        let state = session.connection.state().clone();
        if state.is_live() {
            warn!(state = %state, "Ignoring configure while a connection is live");
            return Err(Error::precondition("configure", state));
        }

        let generation = session.generation + 1;
        let camera = session.camera;
        *session = Session::new(&self.config);
        session.generation = generation;
        session.camera = camera;

        info!(url = %target, generation, "Configuring broadcast session");

        if let Err(e) = self.engine.configure_audio_session() {
            warn!(error = %e, "Audio session setup failed, continuing");
        }

        if let Err(e) = self
            .engine
            .prepare_stream(&self.capture_settings(), &self.audio_settings())
        {
            warn!(error = %e, "Stream setup failed, continuing");
        }
        session.stream_prepared = true;

        self.engine
            .subscribe(EventSink::new(generation, self.events_tx.clone()));

        if let Err(e) = self.engine.attach_audio() {
            warn!(error = %e, "Attaching audio failed, publishing without audio");
        }
        if let Err(e) = self.engine.attach_camera(camera) {
            warn!(error = %e, camera = %camera, "Attaching camera failed");
        }

        session.connection.connect(self.engine.as_ref(), target.app_url())?;
        session.target = Some(target);
        Ok(())
    }

    /// Apply output settings and publish under the configured stream key.
    ///
    /// When the connection is still coming up the publish is issued as soon
    /// as it reports success.
    pub fn start_stream(&self, width: u32, height: u32) -> Result<()> {
        let mut session = self.session.lock();
        let state = session.connection.state().clone();

        let Some(stream_key) = session.target.as_ref().map(|t| t.stream_key().clone()) else {
            return Err(Error::precondition("start stream", state));
        };
        if !matches!(state, ConnectionState::Connecting | ConnectionState::Connected) {
            warn!(state = %state, "Cannot start stream");
            return Err(Error::precondition("start stream", state));
        }

        let video = VideoSettings {
            width,
            height,
            bitrate: self.config.initial_bitrate,
            profile: H264Profile::BaselineAutoLevel,
            max_key_frame_interval_secs: self.config.max_key_frame_interval_secs,
        };
        info!(width, height, bitrate = video.bitrate, "Starting stream");
        self.engine.set_video_settings(&video);
        session.adaptation.set_current_bitrate(video.bitrate);
        session.video = Some(video);

        if state == ConnectionState::Connected {
            session.connection.publish(self.engine.as_ref(), &stream_key)?;
        } else {
            debug!(stream_key = %stream_key, "Publish deferred until connected");
            session.pending_publish = Some(stream_key);
        }
        Ok(())
    }

    /// Close the publish session. Best effort; never fails.
    pub fn end_stream(&self) {
        let mut session = self.session.lock();
        session.pending_publish = None;

        info!("Ending stream");
        if let Err(e) = session.connection.close(self.engine.as_ref()) {
            debug!(error = %e, "Nothing to close");
        }
    }

    /// Toggle between front and back camera. Independent of the connection.
    pub fn switch_camera(&self) -> CameraPosition {
        let mut session = self.session.lock();
        session.camera = session.camera.toggled();
        let camera = session.camera;

        info!(camera = %camera, "Changing camera");
        if session.stream_prepared {
            if let Err(e) = self.engine.attach_camera(camera) {
                warn!(error = %e, camera = %camera, "Attaching camera failed");
            }
        }
        camera
    }

    /// Single entry point for engine events
    pub fn handle_engine_event(&self, envelope: EngineEnvelope) {
        let mut session = self.session.lock();

        if envelope.generation != session.generation {
            debug!(
                event = envelope.event.kind(),
                event_generation = envelope.generation,
                generation = session.generation,
                "Dropping event from previous session"
            );
            return;
        }

        match envelope.event {
            EngineEvent::Statistics(sample) => {
                if accepts_events(session.connection.state()) {
                    session.estimator.observe(sample);
                }
            }
            EngineEvent::InsufficientBandwidth => {
                self.on_insufficient_bandwidth(&mut session);
            }
            EngineEvent::SufficientBandwidth => {
                if *session.connection.state() == ConnectionState::Publishing {
                    session.adaptation.on_sufficient_bandwidth();
                }
            }
            event => self.on_connection_event(&mut session, &event),
        }
    }

    /// Backpressure only means something once the encoder output is published
    fn on_insufficient_bandwidth(&self, session: &mut Session) {
        if *session.connection.state() != ConnectionState::Publishing {
            debug!(state = %session.connection.state(), "Ignoring backpressure while not publishing");
            return;
        }
        let Session {
            adaptation,
            estimator,
            video,
            ..
        } = session;

        let Some(decision) =
            adaptation.on_insufficient_bandwidth(self.engine.as_ref(), estimator, Instant::now())
        else {
            return;
        };
        if let Some(video) = video.as_mut() {
            video.bitrate = decision.new_bitrate;
        }
    }

    fn on_connection_event(&self, session: &mut Session, event: &EngineEvent) {
        if let Some(notification) = session.connection.on_engine_event(event) {
            self.notify(notification);
        }

        let state = session.connection.state().clone();
        match state {
            ConnectionState::Connected => {
                if let Some(stream_key) = session.pending_publish.take() {
                    if let Err(e) = session.connection.publish(self.engine.as_ref(), &stream_key) {
                        warn!(error = %e, "Deferred publish failed");
                    }
                }
            }
            state if state.is_terminal() => {
                session.pending_publish = None;
            }
            _ => {}
        }
    }

    fn notify(&self, notification: Notification) {
        debug!(
            method = notification.method(),
            arguments = %notification.arguments(),
            "Notifying host"
        );
        if self.notifications.send(notification).is_err() {
            debug!("Notification receiver dropped");
        }
    }

    /// Take the engine event receiver (can only be called once).
    /// Used when the caller drives dispatch itself instead of [`Self::spawn_event_loop`].
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<EngineEnvelope>> {
        self.events_rx.lock().take()
    }

    /// Spawn the task that feeds queued engine events into
    /// [`Self::handle_engine_event`]. Returns `None` if the receiver was taken.
    ///
    /// The task ends when the controller is dropped, even if the engine still
    /// holds sinks.
    pub fn spawn_event_loop(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        let mut events = self.take_event_receiver()?;
        let controller: Weak<Self> = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();

        let span = tracing::info_span!("engine_events");
        Some(tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        envelope = events.recv() => {
                            let Some(envelope) = envelope else {
                                break;
                            };
                            let Some(controller) = controller.upgrade() else {
                                break;
                            };
                            controller.handle_engine_event(envelope);
                        }
                    }
                }
                debug!("Engine event loop stopped");
            }
            .instrument(span),
        ))
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session.lock().connection.state().clone()
    }

    #[must_use]
    pub fn camera(&self) -> CameraPosition {
        self.session.lock().camera
    }

    /// Current encoder bitrate (bps)
    #[must_use]
    pub fn current_bitrate(&self) -> u32 {
        self.session.lock().adaptation.current_bitrate()
    }

    #[must_use]
    pub fn current_throughput(&self) -> Option<BandwidthSample> {
        self.session.lock().estimator.current_throughput()
    }

    #[must_use]
    pub fn video_settings(&self) -> Option<VideoSettings> {
        self.session.lock().video.clone()
    }

    #[must_use]
    pub fn target_url(&self) -> Option<String> {
        self.session
            .lock()
            .target
            .as_ref()
            .map(|t| t.as_str().to_string())
    }

    /// Generation of the current session; sinks stamped with another value are stale
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.session.lock().generation
    }

    fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            fps: self.config.fps,
            preset: SessionPreset::Medium,
            continuous_exposure: true,
            continuous_autofocus: true,
        }
    }

    fn audio_settings(&self) -> AudioSettings {
        AudioSettings {
            muted: false,
            bitrate: self.config.audio_bitrate,
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

const fn accepts_events(state: &ConnectionState) -> bool {
    !matches!(state, ConnectionState::Idle | ConnectionState::Closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, MockMediaEngine};
    use crate::notification::RtmpStatus;
    use mockall::predicate::eq;
    use mockall::Sequence;

    /// Engine accepting every setup call; connection calls are left to each test
    fn setup_engine() -> MockMediaEngine {
        let mut engine = MockMediaEngine::new();
        engine.expect_configure_audio_session().returning(|| Ok(()));
        engine.expect_prepare_stream().returning(|_, _| Ok(()));
        engine.expect_subscribe().return_const(());
        engine.expect_attach_audio().returning(|| Ok(()));
        engine.expect_attach_camera().returning(|_| Ok(()));
        engine.expect_set_video_settings().return_const(());
        engine
    }

    fn event(controller: &SessionController, event: EngineEvent) {
        controller.handle_engine_event(EngineEnvelope {
            generation: controller.generation(),
            event,
        });
    }

    #[test]
    fn test_configure_without_url() {
        // No expectations: any engine call would panic
        let (controller, _rx) =
            SessionController::new(Arc::new(MockMediaEngine::new()), PublisherConfig::default());

        assert!(matches!(controller.configure(""), Err(Error::Configuration(_))));
        assert!(matches!(
            controller.configure("rtmp://host/"),
            Err(Error::Configuration(_))
        ));
        assert_eq!(controller.state(), ConnectionState::Idle);
        assert!(controller.target_url().is_none());
    }

    #[test]
    fn test_configure_connects_to_app_url() {
        let mut engine = MockMediaEngine::new();
        engine
            .expect_configure_audio_session()
            .returning(|| Err(EngineError::AudioSession("busy".into())));
        engine.expect_prepare_stream().returning(|capture, audio| {
            assert_eq!(capture.fps, 30);
            assert_eq!(audio.bitrate, 32_000);
            Ok(())
        });
        engine
            .expect_subscribe()
            .withf(|sink| sink.generation() == 1)
            .return_const(());
        engine
            .expect_attach_audio()
            .returning(|| Err(EngineError::DeviceUnavailable("no microphone".into())));
        engine
            .expect_attach_camera()
            .with(eq(CameraPosition::Front))
            .returning(|_| Ok(()));
        engine
            .expect_connect()
            .with(eq("rtmp://host/app"))
            .times(1)
            .return_const(());

        let (controller, _rx) = SessionController::new(Arc::new(engine), PublisherConfig::default());
        controller.configure("rtmp://host/app/key").unwrap();

        assert_eq!(controller.state(), ConnectionState::Connecting);
        assert_eq!(controller.target_url().as_deref(), Some("rtmp://host/app/key"));
        assert_eq!(controller.generation(), 1);
    }

    #[test]
    fn test_start_stream_before_configure() {
        let (controller, _rx) =
            SessionController::new(Arc::new(MockMediaEngine::new()), PublisherConfig::default());

        assert!(matches!(
            controller.start_stream(1280, 720),
            Err(Error::Precondition { state: ConnectionState::Idle, .. })
        ));
    }

    #[test]
    fn test_deferred_publish_after_connect() {
        let mut engine = setup_engine();
        engine.expect_connect().times(1).return_const(());
        engine
            .expect_publish()
            .withf(|key| key.as_str() == "key")
            .times(1)
            .return_const(());

        let (controller, mut rx) =
            SessionController::new(Arc::new(engine), PublisherConfig::default());
        controller.configure("rtmp://host/app/key").unwrap();
        controller.start_stream(1280, 720).unwrap();
        assert_eq!(controller.state(), ConnectionState::Connecting);

        event(&controller, EngineEvent::ConnectSuccess);

        assert_eq!(controller.state(), ConnectionState::Publishing);
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::RtmpStatusChange(RtmpStatus::Connected)
        );
        assert!(rx.try_recv().is_err());

        let video = controller.video_settings().unwrap();
        assert_eq!((video.width, video.height, video.bitrate), (1280, 720, 1_200_000));
        assert_eq!(video.profile, H264Profile::BaselineAutoLevel);
    }

    #[test]
    fn test_start_stream_when_connected_publishes_immediately() {
        let mut engine = setup_engine();
        engine.expect_connect().return_const(());
        engine.expect_publish().times(1).return_const(());

        let (controller, _rx) = SessionController::new(Arc::new(engine), PublisherConfig::default());
        controller.configure("rtmp://host/app/key").unwrap();
        event(&controller, EngineEvent::ConnectSuccess);
        assert_eq!(controller.state(), ConnectionState::Connected);

        controller.start_stream(480, 640).unwrap();
        assert_eq!(controller.state(), ConnectionState::Publishing);

        // Already publishing
        assert!(matches!(
            controller.start_stream(480, 640),
            Err(Error::Precondition { state: ConnectionState::Publishing, .. })
        ));
    }

    #[test]
    fn test_switch_camera_is_independent_of_connection() {
        let mut engine = MockMediaEngine::new();
        let mut seq = Sequence::new();
        engine.expect_configure_audio_session().returning(|| Ok(()));
        engine.expect_prepare_stream().returning(|_, _| Ok(()));
        engine.expect_subscribe().return_const(());
        engine.expect_attach_audio().returning(|| Ok(()));
        engine.expect_connect().return_const(());
        // Initial attach on configure (after one toggle before configure)
        engine
            .expect_attach_camera()
            .with(eq(CameraPosition::Back))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        engine
            .expect_attach_camera()
            .with(eq(CameraPosition::Front))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        engine
            .expect_attach_camera()
            .with(eq(CameraPosition::Back))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(EngineError::DeviceUnavailable("back camera".into())));

        let (controller, _rx) = SessionController::new(Arc::new(engine), PublisherConfig::default());
        assert_eq!(controller.camera(), CameraPosition::Front);

        // Before configure: selection only, no engine call
        assert_eq!(controller.switch_camera(), CameraPosition::Back);
        assert_eq!(controller.state(), ConnectionState::Idle);

        controller.configure("rtmp://host/app/key").unwrap();
        assert_eq!(controller.switch_camera(), CameraPosition::Front);
        assert_eq!(controller.state(), ConnectionState::Connecting);

        // Attach failure does not undo the toggle
        assert_eq!(controller.switch_camera(), CameraPosition::Back);
        assert_eq!(controller.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_end_stream_tears_down_and_drops_late_events() {
        let mut engine = setup_engine();
        engine.expect_connect().return_const(());
        engine.expect_publish().return_const(());
        engine.expect_close().times(1).return_const(());
        engine.expect_set_video_bitrate().never();

        let (controller, mut rx) =
            SessionController::new(Arc::new(engine), PublisherConfig::default());
        controller.configure("rtmp://host/app/key").unwrap();
        controller.start_stream(1280, 720).unwrap();
        event(&controller, EngineEvent::ConnectSuccess);
        assert_eq!(controller.state(), ConnectionState::Publishing);
        let _ = rx.try_recv();

        controller.end_stream();
        controller.end_stream();
        assert_eq!(controller.state(), ConnectionState::Closed);

        event(&controller, EngineEvent::ConnectClosed);
        event(&controller, EngineEvent::IoError("late".into()));
        event(&controller, EngineEvent::InsufficientBandwidth);
        event(&controller, EngineEvent::Statistics(BandwidthSample::new(10, 1)));

        assert!(rx.try_recv().is_err());
        assert_eq!(controller.state(), ConnectionState::Closed);
        assert!(controller.current_throughput().is_none());
    }

    #[test]
    fn test_end_stream_before_configure_is_harmless() {
        let (controller, _rx) =
            SessionController::new(Arc::new(MockMediaEngine::new()), PublisherConfig::default());
        controller.end_stream();
        assert_eq!(controller.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_configure_rejected_while_live() {
        let mut engine = setup_engine();
        engine.expect_connect().times(1).return_const(());

        let (controller, _rx) = SessionController::new(Arc::new(engine), PublisherConfig::default());
        controller.configure("rtmp://host/app/key").unwrap();

        assert!(matches!(
            controller.configure("rtmp://other/app/key"),
            Err(Error::Precondition { operation: "configure", .. })
        ));
        assert_eq!(controller.target_url().as_deref(), Some("rtmp://host/app/key"));
    }

    #[test]
    fn test_reconfigure_after_failure_drops_stale_events() {
        let mut engine = setup_engine();
        engine.expect_connect().times(2).return_const(());

        let (controller, mut rx) =
            SessionController::new(Arc::new(engine), PublisherConfig::default());
        controller.configure("rtmp://host/app/key").unwrap();
        let first_generation = controller.generation();

        event(&controller, EngineEvent::IoError("connection reset".into()));
        assert_eq!(
            controller.state(),
            ConnectionState::Failed("connection reset".to_string())
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::RtmpError("An error occurred: connection reset".into())
        );

        controller.configure("rtmp://host/app/key2").unwrap();
        assert_eq!(controller.state(), ConnectionState::Connecting);

        // A delayed success from the first session must not connect the new one
        controller.handle_engine_event(EngineEnvelope {
            generation: first_generation,
            event: EngineEvent::ConnectSuccess,
        });
        assert_eq!(controller.state(), ConnectionState::Connecting);
        assert!(rx.try_recv().is_err());

        event(&controller, EngineEvent::ConnectSuccess);
        assert_eq!(controller.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_connect_failure_clears_pending_publish() {
        let mut engine = setup_engine();
        engine.expect_connect().return_const(());
        engine.expect_publish().never();

        let (controller, mut rx) =
            SessionController::new(Arc::new(engine), PublisherConfig::default());
        controller.configure("rtmp://host/app/key").unwrap();
        controller.start_stream(1280, 720).unwrap();

        event(&controller, EngineEvent::ConnectFailed);
        assert!(matches!(controller.state(), ConnectionState::Failed(_)));
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::RtmpStatusChange(RtmpStatus::NotConnected)
        );

        // Late success after failure does nothing
        event(&controller, EngineEvent::ConnectSuccess);
        assert!(matches!(controller.state(), ConnectionState::Failed(_)));
    }

    #[test]
    fn test_backpressure_reduces_bitrate_without_transition() {
        let mut engine = setup_engine();
        engine.expect_connect().return_const(());
        engine.expect_publish().return_const(());
        engine
            .expect_set_video_bitrate()
            .with(eq(840_000))
            .times(1)
            .return_const(());

        let (controller, _rx) = SessionController::new(Arc::new(engine), PublisherConfig::default());
        controller.configure("rtmp://host/app/key").unwrap();
        controller.start_stream(1280, 720).unwrap();
        event(&controller, EngineEvent::ConnectSuccess);
        event(&controller, EngineEvent::Statistics(BandwidthSample::new(100_000, 30)));

        event(&controller, EngineEvent::InsufficientBandwidth);
        // Inside the cooldown window
        event(&controller, EngineEvent::InsufficientBandwidth);
        event(&controller, EngineEvent::SufficientBandwidth);

        assert_eq!(controller.current_bitrate(), 840_000);
        assert_eq!(controller.video_settings().unwrap().bitrate, 840_000);
        assert_eq!(controller.state(), ConnectionState::Publishing);
        assert_eq!(controller.current_throughput().unwrap().kbps(), 800);
    }

    #[test]
    fn test_backpressure_before_start_stream_is_ignored() {
        let mut engine = setup_engine();
        engine.expect_connect().return_const(());
        engine.expect_publish().times(1).return_const(());
        engine
            .expect_set_video_bitrate()
            .with(eq(840_000))
            .times(1)
            .return_const(());

        let (controller, _rx) = SessionController::new(Arc::new(engine), PublisherConfig::default());
        controller.configure("rtmp://host/app/key").unwrap();
        event(&controller, EngineEvent::InsufficientBandwidth);
        event(&controller, EngineEvent::ConnectSuccess);
        assert_eq!(controller.state(), ConnectionState::Connected);

        // Nothing is published yet, so the encoder keeps its bitrate
        event(&controller, EngineEvent::InsufficientBandwidth);
        assert_eq!(controller.current_bitrate(), 1_200_000);

        controller.start_stream(1280, 720).unwrap();
        assert_eq!(controller.state(), ConnectionState::Publishing);

        // First signal while publishing is not held back by a cooldown
        event(&controller, EngineEvent::InsufficientBandwidth);
        assert_eq!(controller.current_bitrate(), 840_000);
        assert_eq!(controller.video_settings().unwrap().bitrate, 840_000);
    }

    #[tokio::test]
    async fn test_event_loop_stops_when_controller_dropped() {
        let sink_slot = Arc::new(Mutex::new(None::<EventSink>));
        let slot = Arc::clone(&sink_slot);
        let mut engine = MockMediaEngine::new();
        engine.expect_configure_audio_session().returning(|| Ok(()));
        engine.expect_prepare_stream().returning(|_, _| Ok(()));
        engine
            .expect_subscribe()
            .returning(move |sink| *slot.lock() = Some(sink));
        engine.expect_attach_audio().returning(|| Ok(()));
        engine.expect_attach_camera().returning(|_| Ok(()));
        engine.expect_connect().return_const(());

        let (controller, _rx) = SessionController::new(Arc::new(engine), PublisherConfig::default());
        let handle = controller.spawn_event_loop().unwrap();
        controller.configure("rtmp://host/app/key").unwrap();

        // The sink outlives the controller and keeps the channel open
        let sink = sink_slot.lock().clone().unwrap();
        drop(controller);

        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!sink.emit(EngineEvent::ConnectClosed));
    }

    #[tokio::test]
    async fn test_event_loop_dispatches_queued_events() {
        let sink_slot = Arc::new(Mutex::new(None::<EventSink>));
        let slot = Arc::clone(&sink_slot);
        let mut engine = MockMediaEngine::new();
        engine.expect_configure_audio_session().returning(|| Ok(()));
        engine.expect_prepare_stream().returning(|_, _| Ok(()));
        engine
            .expect_subscribe()
            .returning(move |sink| *slot.lock() = Some(sink));
        engine.expect_attach_audio().returning(|| Ok(()));
        engine.expect_attach_camera().returning(|_| Ok(()));
        engine.expect_connect().return_const(());

        let (controller, mut rx) =
            SessionController::new(Arc::new(engine), PublisherConfig::default());
        let handle = controller.spawn_event_loop().unwrap();
        assert!(controller.spawn_event_loop().is_none());

        controller.configure("rtmp://host/app/key").unwrap();
        let sink = sink_slot.lock().clone().unwrap();
        assert!(sink.emit_status_code("NetConnection.Connect.Success"));

        assert_eq!(
            rx.recv().await.unwrap(),
            Notification::RtmpStatusChange(RtmpStatus::Connected)
        );
        assert_eq!(controller.state(), ConnectionState::Connected);

        handle.abort();
    }
}
