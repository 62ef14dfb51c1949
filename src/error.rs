//! Errors raised while loading descriptions and building the route table.
//!
//! Every variant here is fatal at startup. Per-request problems are never
//! surfaced as errors; they degrade to the default response instead.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a description source into a servable route table.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid description pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("could not run description parser `{program}`; install drafter from https://github.com/apiaryio/drafter")]
    ParserNotFound { program: String },

    #[error("description parser failed on {path} ({status}): {stderr}")]
    ParserFailed {
        path: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("{path} is not a valid description tree: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{uri_template}: invalid HTTP method `{method}`")]
    InvalidMethod { uri_template: String, method: String },

    #[error("{uri_template} {method}: response name `{name}` is not an HTTP status code")]
    InvalidStatus {
        uri_template: String,
        method: String,
        name: String,
    },
}
