//! Integration test suite for branchbook-updater
//!
//! End-to-end tests against a local HTTP fixture server: real downloads,
//! real registry queries and the CLI binary. They run in CI on every commit.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **download**: streaming, progress events, cancellation and cleanup
//! - **registry**: query shape, headers, timeouts and malformed responses
//! - **updater**: check, download and install flows through [`Updater`]
//! - **cli**: the `branchbook-updater` binary
//!
//! [`Updater`]: branchbook_updater::upgrade::Updater

// Shared test utilities (from parent tests/ directory)
#[path = "../common/mod.rs"]
mod common;

mod cli;
mod download;
mod registry;
mod updater;
