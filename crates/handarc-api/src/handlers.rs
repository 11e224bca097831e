//! API handlers.

pub mod analyze;
pub mod hands;
pub mod health;
pub mod jobs;
