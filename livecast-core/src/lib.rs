pub mod config;
pub mod logging;

pub use config::{Config, ConfigValidationError, LoggingConfig, PublisherConfig};
pub use logging::init_logging;
