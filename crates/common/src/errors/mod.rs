//! Error types for PaperTrail components
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - Machine-readable error codes
//! - Recoverability classification for batch pipelines

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Input errors (1xxx)
    ValidationError,
    InvalidDocument,
    DimensionMismatch,

    // Resource errors (4xxx)
    NotFound,
    IndexNotFound,
    IndexCorrupt,

    // External collaborator errors (8xxx)
    UpstreamError,
    EmbeddingError,
    GenerationError,

    // Internal errors (9xxx)
    InternalError,
    ClusteringError,
    ArtifactError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Input (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidDocument => 1003,
            ErrorCode::DimensionMismatch => 1004,

            // Resources (4xxx)
            ErrorCode::NotFound => 4001,
            ErrorCode::IndexNotFound => 4002,
            ErrorCode::IndexCorrupt => 4004,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::GenerationError => 8003,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ClusteringError => 9002,
            ErrorCode::ArtifactError => 9003,
            ErrorCode::ConfigurationError => 9004,
            ErrorCode::SerializationError => 9005,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Input errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid document {key}: {message}")]
    InvalidDocument { key: String, message: String },

    #[error("Vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Index not found: {path}")]
    IndexNotFound { path: String },

    #[error("Index corrupt: {message}")]
    IndexCorrupt { message: String },

    // External collaborator errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Generation service error: {message}")]
    GenerationError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Clustering failed: {message}")]
    Clustering { message: String },

    #[error("Artifact error for {path}: {message}")]
    Artifact { path: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Index serialization error: {0}")]
    IndexSerialization(#[from] bincode::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidDocument { .. } => ErrorCode::InvalidDocument,
            AppError::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::IndexNotFound { .. } => ErrorCode::IndexNotFound,
            AppError::IndexCorrupt { .. } => ErrorCode::IndexCorrupt,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::GenerationError { .. } => ErrorCode::GenerationError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Clustering { .. } => ErrorCode::ClusteringError,
            AppError::Artifact { .. } => ErrorCode::ArtifactError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::IndexSerialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether a batch pipeline may absorb this error and continue with the next item.
    ///
    /// Per-document failures (bad input, a failed embedding call, a clustering blow-up) are
    /// recoverable. Missing or corrupt artifacts and configuration problems are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Validation { .. }
                | AppError::InvalidDocument { .. }
                | AppError::DimensionMismatch { .. }
                | AppError::EmbeddingError { .. }
                | AppError::GenerationError { .. }
                | AppError::HttpClient(_)
                | AppError::Clustering { .. }
        )
    }

    /// Build an artifact error tagged with the offending path
    pub fn artifact(path: impl AsRef<std::path::Path>, message: impl std::fmt::Display) -> Self {
        AppError::Artifact {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation {
            message: err.to_string(),
            field: err.field_errors().keys().next().map(|k| k.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::IndexCorrupt {
            message: "length mismatch".into(),
        };
        assert_eq!(err.code(), ErrorCode::IndexCorrupt);
        assert_eq!(err.code().as_code(), 4004);
    }

    #[test]
    fn test_recoverable_errors() {
        let err = AppError::Clustering {
            message: "non-finite distance".into(),
        };
        assert!(err.is_recoverable());

        let err = AppError::EmbeddingError {
            message: "timeout".into(),
        };
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_invalid_document_is_recoverable() {
        let err = AppError::InvalidDocument {
            key: "10.1/a".into(),
            message: "row 3: invalid type".into(),
        };
        assert!(err.is_recoverable());
        assert_eq!(err.code().as_code(), 1003);
        assert_eq!(err.to_string(), "Invalid document 10.1/a: row 3: invalid type");
    }

    #[test]
    fn test_hard_errors() {
        let err = AppError::IndexNotFound {
            path: "/tmp/missing.hnsw".into(),
        };
        assert!(!err.is_recoverable());
        assert_eq!(err.code(), ErrorCode::IndexNotFound);
    }

    #[test]
    fn test_artifact_helper_keeps_path() {
        let err = AppError::artifact("/data/set_metadata.json", "truncated");
        assert_eq!(
            err.to_string(),
            "Artifact error for /data/set_metadata.json: truncated"
        );
    }
}
