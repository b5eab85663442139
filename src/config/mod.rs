// src/config/mod.rs

//! Configuration loading and validation for orchestrate.
//!
//! Responsibilities:
//! - Define the TOML-backed data model and the resolved [`TaskSpec`] (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Resolve defaults and validate (`validate.rs`).
//! - Provide the embedded sample configuration (`sample.rs`).

pub mod loader;
pub mod model;
pub mod sample;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{
    ConfigFile, DefaultsSection, DurationValue, RawConfigFile, RawTaskConfig, RunSettings,
    TaskSpec,
};
pub use sample::SAMPLE_CONFIG;
pub use validate::validate_config;
