//! Middleware for the trigger surface

pub mod cron_auth;

pub use cron_auth::cron_auth;
