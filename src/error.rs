//! Error types for query compilation, reconciliation and storage

use thiserror::Error;

/// Errors that can occur while compiling table requests or synchronizing entity graphs
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Unknown path '{path}': {reason}")]
    UnknownPath { path: String, reason: String },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Model comparison error: {0}")]
    ModelComparison(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Unsupported relation: {0}")]
    UnsupportedRelation(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn entity_not_found(msg: impl Into<String>) -> Self {
        Self::EntityNotFound(msg.into())
    }

    pub fn unknown_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnknownPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Self::InvalidFilter(msg.into())
    }

    pub fn model_comparison(msg: impl Into<String>) -> Self {
        Self::ModelComparison(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    pub fn unsupported_relation(msg: impl Into<String>) -> Self {
        Self::UnsupportedRelation(msg.into())
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
