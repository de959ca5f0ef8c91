//! Ingestion error types

use papertrail_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Document table error for {path}: {message}")]
    DocumentTable { path: String, message: String },

    #[error("Index build error: {0}")]
    IndexBuild(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    App(#[from] AppError),
}

pub type IngestionResult<T> = std::result::Result<T, IngestionError>;
