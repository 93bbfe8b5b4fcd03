//! pg-rotator library crate.
//!
//! Rotates a PostgreSQL credential held in a versioned secret store, one
//! scheduler-driven phase at a time. The binary and the integration tests in
//! `tests/` both build on these modules.

pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod rotation;
pub mod vault;

pub use errors::RotationError;
pub use rotation::{Outcome, RotationSettings, Rotator};
