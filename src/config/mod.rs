//! Configuration management for branchbook-updater
//!
//! One TOML file holds everything the updater needs: where the version
//! registry lives and how often to check it. See [`global`] for the format
//! and location rules.
//!
//! Persistent runtime state (the pending install choice) is not
//! configuration; it lives in the data directory resolved by
//! [`crate::utils::platform::get_data_dir`].

pub mod global;

pub use global::{CONFIG_PATH_ENV, GlobalConfig, RegistryConfig};
