//! Shared test utilities for the ghi-nowcast workspace.
//!
//! This crate provides common testing infrastructure:
//! - Synthetic irradiance grid generators
//! - On-disk slot fixtures with production filenames
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
