//! Shared types and models for the GardenWatch environmental monitor
//!
//! Pure domain types, geospatial helpers and validation used by the backend
//! batch jobs. Nothing in this crate performs I/O.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
