//! TH-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, ThError>;

/// Top-level error type for Telemetry Hub.
#[derive(Debug, Error)]
pub enum ThError {
    #[error("[TH-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[TH-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[TH-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[TH-2001] log source unavailable at {path}: {details}")]
    SourceUnavailable { path: PathBuf, details: String },

    #[error("[TH-2002] malformed or no-JSON line: {line}")]
    MalformedLine { line: String },

    #[error("[TH-2003] JSON decode failure in {context}: {details}")]
    PayloadDecode {
        context: &'static str,
        details: String,
    },

    #[error("[TH-2004] read failure in log source {path}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[TH-3001] invalid payload: {details}")]
    InvalidPayload { details: String },

    #[error("[TH-3002] not found: {what}")]
    NotFound { what: &'static str },

    #[error("[TH-3003] storage failure in {context}: {details}")]
    Storage {
        context: &'static str,
        details: String,
    },

    #[error("[TH-3101] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[TH-3102] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[TH-3103] template failure: {details}")]
    Template { details: String },

    #[error("[TH-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl ThError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "TH-1001",
            Self::MissingConfig { .. } => "TH-1002",
            Self::ConfigParse { .. } => "TH-1003",
            Self::SourceUnavailable { .. } => "TH-2001",
            Self::MalformedLine { .. } => "TH-2002",
            Self::PayloadDecode { .. } => "TH-2003",
            Self::SourceRead { .. } => "TH-2004",
            Self::InvalidPayload { .. } => "TH-3001",
            Self::NotFound { .. } => "TH-3002",
            Self::Storage { .. } => "TH-3003",
            Self::Io { .. } => "TH-3101",
            Self::Serialization { .. } => "TH-3102",
            Self::Template { .. } => "TH-3103",
            Self::Runtime { .. } => "TH-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::SourceRead { .. }
                | Self::SourceUnavailable { .. }
                | Self::Storage { .. }
                | Self::Runtime { .. }
        )
    }

    /// Whether the failure is the caller's fault (maps to a 4xx response).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidPayload { .. } | Self::NotFound { .. })
    }

    /// The error message without its `[TH-NNNN]` prefix.
    #[must_use]
    pub fn detail(&self) -> String {
        let rendered = self.to_string();
        match rendered.split_once("] ") {
            Some((code, rest)) if code.starts_with("[TH-") => rest.to_string(),
            _ => rendered,
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for ThError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for ThError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for ThError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<tera::Error> for ThError {
    fn from(value: tera::Error) -> Self {
        // tera nests the useful part of the message in its source chain.
        let mut details = value.to_string();
        let mut source = std::error::Error::source(&value);
        while let Some(inner) = source {
            details.push_str(": ");
            details.push_str(&inner.to_string());
            source = inner.source();
        }
        Self::Template { details }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<ThError> {
        vec![
            ThError::InvalidConfig {
                details: String::new(),
            },
            ThError::MissingConfig {
                path: PathBuf::new(),
            },
            ThError::ConfigParse {
                context: "",
                details: String::new(),
            },
            ThError::SourceUnavailable {
                path: PathBuf::new(),
                details: String::new(),
            },
            ThError::MalformedLine {
                line: String::new(),
            },
            ThError::PayloadDecode {
                context: "",
                details: String::new(),
            },
            ThError::SourceRead {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            ThError::InvalidPayload {
                details: String::new(),
            },
            ThError::NotFound { what: "" },
            ThError::Storage {
                context: "",
                details: String::new(),
            },
            ThError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            ThError::Serialization {
                context: "",
                details: String::new(),
            },
            ThError::Template {
                details: String::new(),
            },
            ThError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = all_variants();
        let codes: Vec<&str> = errors.iter().map(ThError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn display_carries_code_prefix() {
        for err in all_variants() {
            let rendered = err.to_string();
            assert!(
                rendered.starts_with(&format!("[{}]", err.code())),
                "{rendered} should start with its code"
            );
        }
    }

    #[test]
    fn detail_strips_code_prefix() {
        let err = ThError::Storage {
            context: "rusqlite",
            details: "database is locked".to_string(),
        };
        assert_eq!(
            err.detail(),
            "storage failure in rusqlite: database is locked"
        );
    }

    #[test]
    fn only_payload_and_not_found_are_client_errors() {
        for err in all_variants() {
            let expected = matches!(
                err,
                ThError::InvalidPayload { .. } | ThError::NotFound { .. }
            );
            assert_eq!(err.is_client_error(), expected, "{err}");
        }
    }

    #[test]
    fn serde_json_errors_map_to_serialization() {
        let err: ThError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "TH-3102");
    }

    #[test]
    fn toml_errors_map_to_config_parse() {
        let err: ThError = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
        assert_eq!(err.code(), "TH-1003");
    }
}
