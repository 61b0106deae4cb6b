use std::io;

use firewatch_core::config::ConfigError;
use firewatch_core::dispatch::DispatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] firewatch_core::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("Failed to build connectivity probe: {0}")]
    Probe(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No report description provided")]
    EmptyDescription,
    #[error("{0}")]
    InvalidCoordinates(String),
    #[error("Report update needs at least one of --status, --description or --severity")]
    EmptyUpdate,
    #[error("Report ID cannot be empty")]
    EmptyReportId,
    #[error("Sync scope cannot be empty")]
    EmptyScope,
    #[error("Cannot infer an image content type for {0}; pass --content-type")]
    UnknownContentType(String),
    #[error("Content type must be an image/* MIME type, got `{0}`")]
    NotAnImage(String),
    #[error("Queue item not found: {0}")]
    ItemNotFound(String),
    #[error("Could not resolve a data directory; pass --data-dir or set FIREWATCH_DATA_DIR")]
    DataDirUnavailable,
    #[error("Delivery is not configured. Set FIREWATCH_API_BASE_URL to drain the queue.")]
    ApiNotConfigured,
}
