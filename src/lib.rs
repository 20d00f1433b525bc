#![forbid(unsafe_code)]

//! Telemetry Hub: tolerant sensor telemetry ingestion.
//!
//! Two input paths feed one dashboard:
//! 1. **Sensor logs**: newline-delimited `<prefix>{json}` files, parsed line by
//!    line; malformed lines are skipped and reported, never fatal
//! 2. **HTTP ingestion**: JSON payloads posted by devices, appended to a
//!    [`store::TelemetryStore`]
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use telemetry_hub::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use telemetry_hub::core::config::Config;
//! use telemetry_hub::parser::log_parser::{LogParser, TimestampMerge};
//! ```

pub mod prelude;

pub mod core;
pub mod dashboard;
pub mod parser;
pub mod server;
pub mod store;
