//! Error taxonomy for the persona engine.
//!
//! Import-time failures (`Storage`, `Schema`, `UntrustedSource`, `Fetch`) are
//! caught at the importer boundary and surfaced as notices; they never crash
//! message processing. `Config` degrades the dispatcher to no-ops instead of
//! raising on the hot path.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O failure reading or writing the catalog or its backups. Prior state
    /// is preserved by the caller.
    #[error("storage error at {path:?}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed persona document. Carries every validation failure found.
    #[error("schema validation failed: {}", .0.join("; "))]
    Schema(Vec<String>),

    /// Import source refused before any network access.
    #[error("untrusted source: {0}")]
    UntrustedSource(String),

    /// Timeout, oversize response, or network failure during an import fetch.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Invalid prefix or pattern configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failure_class() {
        let untrusted = EngineError::UntrustedSource("host 'evil.example'".to_string());
        assert!(untrusted.to_string().contains("untrusted"));

        let schema = EngineError::Schema(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(schema.to_string(), "schema validation failed: a; b");

        let storage = EngineError::storage(
            "/tmp/personas.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(storage.to_string().contains("/tmp/personas.json"));
    }
}
