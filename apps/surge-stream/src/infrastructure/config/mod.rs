//! Configuration Module
//!
//! Configuration loading for the streaming core.

mod settings;

pub use settings::{
    AuthToken, ConfigError, IngestConfig, LiveSettings, ReplySettings, parse_url,
};
