//! Delivery of queued operations to the backend.

mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::QueueOperation;

pub use http::HttpDispatcher;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid dispatcher configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Backend HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Backend API error: {0}")]
    Api(String),
    #[error("Local file error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Performs the backend call behind a queued operation.
///
/// Any error counts as one failed delivery attempt for the item.
#[async_trait]
pub trait OperationDispatcher: Send + Sync {
    async fn dispatch(&self, operation: &QueueOperation) -> DispatchResult<()>;
}
