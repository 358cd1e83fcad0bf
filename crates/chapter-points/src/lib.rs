//! Rules-driven points, achievements, and incentive engine for membership chapters.

pub mod activity;
pub mod config;
pub mod engine;
pub mod error;
pub mod gamification;
pub mod import;
pub mod incentives;
pub mod ledger;
pub mod members;
pub mod notify;
pub mod router;
pub mod rules;
pub mod store;
pub mod sync;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use error::AppError;
pub use router::{points_router, ChapterServices};
