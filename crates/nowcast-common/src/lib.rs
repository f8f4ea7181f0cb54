//! Common types and utilities shared across the ghi-nowcast workspace.

pub mod bbox;
pub mod slot;

pub use bbox::BoundingBox;
pub use slot::{slot_timestamp, sort_chronological, SLOT_INTERVAL_MINUTES};
