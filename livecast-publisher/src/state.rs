//! Transport connection lifecycle
//!
//! ```text
//! Idle ──connect──▶ Connecting ──ConnectSuccess──▶ Connected ──publish──▶ Publishing
//!                      │                               │                      │
//!                      └──── ConnectFailed / IoError ──┴──────────────────────┴──▶ Failed
//!                      └──── ConnectClosed / close() ─────────────────────────────▶ Closed
//! ```
//!
//! Events that arrive while `Idle` or `Closed` belong to a session that no
//! longer exists and are dropped.

use crate::engine::{EngineEvent, MediaEngine};
use crate::error::{Error, Result};
use crate::notification::{Notification, RtmpStatus};
use crate::types::StreamKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Publishing,
    Closed,
    Failed(String),
}

impl ConnectionState {
    /// `Closed` and `Failed` only leave through a fresh configure
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed(_))
    }

    /// A connection attempt or an established connection exists
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Publishing)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Publishing => write!(f, "publishing"),
            Self::Closed => write!(f, "closed"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl ConnectionStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Start connecting. Completion arrives later as an engine event.
    pub fn connect(&mut self, engine: &dyn MediaEngine, url: &str) -> Result<()> {
        if self.state != ConnectionState::Idle {
            return Err(Error::precondition("connect", self.state.clone()));
        }
        engine.connect(url);
        self.transition(ConnectionState::Connecting);
        Ok(())
    }

    pub fn publish(&mut self, engine: &dyn MediaEngine, stream_key: &StreamKey) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(Error::precondition("publish", self.state.clone()));
        }
        engine.publish(stream_key);
        self.transition(ConnectionState::Publishing);
        Ok(())
    }

    /// Tear the connection down. Closing twice is a no-op.
    pub fn close(&mut self, engine: &dyn MediaEngine) -> Result<()> {
        match self.state {
            ConnectionState::Idle => Err(Error::precondition("close", ConnectionState::Idle)),
            ConnectionState::Closed => Ok(()),
            _ => {
                engine.close();
                self.transition(ConnectionState::Closed);
                Ok(())
            }
        }
    }

    /// Apply a transport event, returning the notification the host should see
    pub fn on_engine_event(&mut self, event: &EngineEvent) -> Option<Notification> {
        if matches!(self.state, ConnectionState::Idle | ConnectionState::Closed) {
            debug!(state = %self.state, event = event.kind(), "Dropping event for torn-down session");
            return None;
        }

        match event {
            EngineEvent::ConnectSuccess => {
                if self.state != ConnectionState::Connecting {
                    debug!(state = %self.state, "Ignoring unexpected connect success");
                    return None;
                }
                info!("RTMP connected");
                self.transition(ConnectionState::Connected);
                Some(Notification::RtmpStatusChange(RtmpStatus::Connected))
            }
            EngineEvent::ConnectFailed | EngineEvent::ConnectClosed => {
                if self.state.is_terminal() {
                    return None;
                }
                warn!(event = event.kind(), "RTMP connection was not successful");
                let next = if *event == EngineEvent::ConnectClosed {
                    ConnectionState::Closed
                } else {
                    ConnectionState::Failed("connect failed".to_string())
                };
                self.transition(next);
                Some(Notification::RtmpStatusChange(RtmpStatus::NotConnected))
            }
            EngineEvent::IoError(reason) => {
                warn!(reason = %reason, "RTMP I/O error");
                self.transition(ConnectionState::Failed(reason.clone()));
                Some(Notification::RtmpError(describe_io_error(reason)))
            }
            EngineEvent::InsufficientBandwidth
            | EngineEvent::SufficientBandwidth
            | EngineEvent::Statistics(_) => None,
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(from = %self.state, to = %next, "Connection state changed");
        self.state = next;
    }
}

fn describe_io_error(reason: &str) -> String {
    if reason.is_empty() {
        "An error occurred.".to_string()
    } else {
        format!("An error occurred: {reason}")
    }
}
