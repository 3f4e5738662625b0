//! # Attendance Ledger Library
//!
//! Append-only attendance ledger with per-day sequence validation, a UTC to local
//! business-date resolver, a derived daily status projection and an idempotent, retrying
//! delivery pipeline towards the external HR system.

pub mod auth;
pub mod business_date;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod hierarchy;
pub mod ledger;
pub mod models;
pub mod projection;
pub mod reporting;
pub mod server;
pub mod sync;
pub mod telemetry;
pub use migration;
