//! Configuration management for peakbatch.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Serde defaults for every field, so partial files are valid
//!
//! # Example
//!
//! ```no_run
//! use peakbatch_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new("peakbatch.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Strategy: {}", config.settings().execution.strategy_kind());
//!
//! config.settings_mut().execution.max_concurrent = 8;
//! config.update_section(ConfigSection::Execution).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ConfigSection, ExecutionSettings, LoggingSettings, OutputSettings, PathSettings, Settings,
};
