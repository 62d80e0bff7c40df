//! Host command surface
//!
//! Routes method calls arriving from the host channel to the
//! [`SessionController`] and shapes the replies the host expects.

use crate::error::{Error, Result};
use crate::session::SessionController;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const CONFIGURE: &str = "configure";
pub const START_STREAM: &str = "startStream";
pub const END_STREAM: &str = "endStream";
pub const CHANGE_CAMERA: &str = "changeCamera";
pub const SWITCH_CAMERA: &str = "switchCamera";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigureArgs {
    #[serde(default)]
    broadcast_url: Option<String>,
}

pub struct CommandHandler {
    controller: Arc<SessionController>,
}

impl CommandHandler {
    #[must_use]
    pub const fn new(controller: Arc<SessionController>) -> Self {
        Self { controller }
    }

    #[must_use]
    pub const fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    /// Handle one host method call
    ///
    /// | method          | reply                              |
    /// |-----------------|------------------------------------|
    /// | `configure`     | `null`                             |
    /// | `startStream`   | `true` when publishing was started |
    /// | `endStream`     | always `false`                     |
    /// | `changeCamera`  | `null`                             |
    pub fn handle(&self, method: &str, arguments: Value) -> Result<Value> {
        debug!(method, %arguments, "Host method call");

        match method {
            CONFIGURE => {
                let args: ConfigureArgs = if arguments.is_null() {
                    ConfigureArgs::default()
                } else {
                    serde_json::from_value(arguments).map_err(|source| {
                        Error::InvalidArguments {
                            method: method.to_string(),
                            source,
                        }
                    })?
                };
                self.controller
                    .configure(args.broadcast_url.as_deref().unwrap_or_default())?;
                Ok(Value::Null)
            }
            START_STREAM => {
                let config = self.controller.config();
                let width = dimension(&arguments, "width").unwrap_or(config.default_width);
                let height = dimension(&arguments, "height").unwrap_or(config.default_height);

                match self.controller.start_stream(width, height) {
                    Ok(()) => Ok(Value::Bool(true)),
                    Err(e) => {
                        warn!(error = %e, "startStream failed");
                        Ok(Value::Bool(false))
                    }
                }
            }
            END_STREAM => {
                self.controller.end_stream();
                // Hosts rely on this reply being false
                Ok(Value::Bool(false))
            }
            CHANGE_CAMERA | SWITCH_CAMERA => {
                self.controller.switch_camera();
                Ok(Value::Null)
            }
            other => Err(Error::NotImplemented(other.to_string())),
        }
    }
}

/// Integer argument, or `None` when missing or not a positive integer
fn dimension(arguments: &Value, key: &str) -> Option<u32> {
    arguments
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|value| u32::try_from(value).ok())
        .filter(|value| *value > 0)
}
