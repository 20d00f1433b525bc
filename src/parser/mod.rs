//! Two-stage log parsing: locate the trailing `{...}` block, then strict-decode it.

pub mod extractor;
pub mod log_parser;
