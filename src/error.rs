use thiserror::Error;

use crate::db::models::DeletionStatus;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Deletion request not found: {0}")]
    RequestNotFound(String),

    #[error("Vehicle not found: {0}")]
    VehicleNotFound(String),

    #[error("Actor '{actor}' is not allowed to {action} this vehicle's data")]
    Forbidden { actor: String, action: &'static str },

    #[error("Deletion request {0} has already been processed")]
    AlreadyDeleted(String),

    #[error("Illegal status change: {from} -> {to}")]
    InvalidTransition {
        from: DeletionStatus,
        to: DeletionStatus,
    },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
