//! Configuration module for recodarr
//!
//! Handles loading configuration from TOML files, environment variable overrides,
//! and the encoding profile policy language.

pub mod config;
pub mod profile;

pub use config::*;
pub use profile::*;
