//! Process runtime shared by HyperSpot binaries: layered configuration and logging.

pub mod config;
pub mod logging;

pub use config::{default_logging_config, AppConfig, AppSection, CliArgs, LoggingConfig, Section};
pub use logging::init_logging_from_config;
