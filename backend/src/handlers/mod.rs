//! HTTP request handlers

pub mod cron;
pub mod health;
pub mod insights;

pub use cron::*;
pub use health::*;
pub use insights::*;
