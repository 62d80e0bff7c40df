//! Outward notifications sent to the host layer

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RTMP_STATUS_CHANGE: &str = "rtmpStatusChange";
pub const RTMP_ERROR: &str = "rtmpError";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RtmpStatus {
    Connected,
    NotConnected,
}

impl RtmpStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::NotConnected => "notConnected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    RtmpStatusChange(RtmpStatus),
    RtmpError(String),
}

impl Notification {
    /// Host method name the notification is delivered under
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::RtmpStatusChange(_) => RTMP_STATUS_CHANGE,
            Self::RtmpError(_) => RTMP_ERROR,
        }
    }

    #[must_use]
    pub fn arguments(&self) -> Value {
        match self {
            Self::RtmpStatusChange(status) => Value::from(status.as_str()),
            Self::RtmpError(message) => Value::from(message.as_str()),
        }
    }
}
