//! GHI nowcast pipeline service.
//!
//! The binary in `main.rs` wires these modules to a timer; everything here
//! is cycle-local logic with no cross-cycle state beyond files on disk.

pub mod catalog;
pub mod config;
pub mod cycle;
pub mod fetch;
pub mod retention;
