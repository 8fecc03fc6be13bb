//! Configuration management for LogLedger

pub mod settings;

pub use settings::{LoggerConfig, Output, Rotation, ServerConfig};
