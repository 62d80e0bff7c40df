//! Common types used throughout the publisher

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Which camera feeds the capture input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    #[default]
    Front,
    Back,
}

impl CameraPosition {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }
}

impl fmt::Display for CameraPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Front => write!(f, "front"),
            Self::Back => write!(f, "back"),
        }
    }
}

/// Stream key published under an application URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamKey(String);

impl StreamKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StreamKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A broadcast URL split into the part the connection dials and the stream key.
///
/// `rtmp://host/app/key` connects to `rtmp://host/app` and publishes `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastUrl {
    raw: String,
    app_url: String,
    stream_key: StreamKey,
}

impl BroadcastUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::Configuration("no broadcast url supplied".to_string()));
        }

        let mut url = Url::parse(trimmed)
            .map_err(|e| Error::Configuration(format!("invalid broadcast url {trimmed:?}: {e}")))?;

        if url.host_str().map_or(true, str::is_empty) {
            return Err(Error::Configuration(format!(
                "broadcast url {trimmed:?} has no host"
            )));
        }

        let stream_key = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(StreamKey::from)
            .ok_or_else(|| {
                Error::Configuration(format!("broadcast url {trimmed:?} has no stream key"))
            })?;

        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|()| Error::Configuration(format!("broadcast url {trimmed:?} has no path")))?
            .pop();

        // `rtmp://host/key` dials `rtmp://host`, not `rtmp://host/`
        let app_url = url.as_str().trim_end_matches('/').to_string();

        Ok(Self {
            raw: trimmed.to_string(),
            app_url,
            stream_key,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// URL handed to the engine's `connect`
    #[must_use]
    pub fn app_url(&self) -> &str {
        &self.app_url
    }

    #[must_use]
    pub const fn stream_key(&self) -> &StreamKey {
        &self.stream_key
    }
}

impl fmt::Display for BroadcastUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// H.264 profile requested from the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum H264Profile {
    #[default]
    BaselineAutoLevel,
}

/// Encoder output settings applied when publishing starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    pub profile: H264Profile,
    pub max_key_frame_interval_secs: u32,
}

/// Capture session preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPreset {
    #[default]
    Medium,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSettings {
    pub fps: u32,
    pub preset: SessionPreset,
    pub continuous_exposure: bool,
    pub continuous_autofocus: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub muted: bool,
    /// AAC bitrate in bits per second
    pub bitrate: u32,
}
