//! Context engine error types

use papertrail_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Question must not be empty")]
    EmptyQuestion,

    #[error("Retrieval failed: {0}")]
    Retrieval(#[source] AppError),

    #[error("Answer generation failed: {0}")]
    Synthesis(#[source] AppError),
}

impl From<ContextError> for AppError {
    fn from(e: ContextError) -> Self {
        match e {
            ContextError::EmptyQuestion => AppError::Validation {
                message: "question must not be empty".to_string(),
                field: Some("question".to_string()),
            },
            ContextError::Retrieval(inner) | ContextError::Synthesis(inner) => inner,
        }
    }
}

pub type ContextResult<T> = std::result::Result<T, ContextError>;
