//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use telemetry_hub::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, SensorSource};
pub use crate::core::errors::{Result, ThError};

// Parser
pub use crate::parser::extractor::{LineRecordExtractor, LineSplit};
pub use crate::parser::log_parser::{
    DiagnosticKind, LineDiagnostic, LogParser, SensorLogResult, SensorRecord, TimestampMerge,
};

// Store
pub use crate::store::{InMemoryTelemetryStore, TelemetryEntry, TelemetryStore, open_store};
#[cfg(feature = "sqlite")]
pub use crate::store::SqliteTelemetryStore;

// Dashboard and HTTP service
pub use crate::dashboard::{DashboardAssembler, DashboardData, SensorPanel};
pub use crate::server::{AppState, build_router, serve};
