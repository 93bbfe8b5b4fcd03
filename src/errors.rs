use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::{RecordError, Stage};

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("secret {secret_id} rotation disabled")]
    RotationDisabled { secret_id: String },

    #[error("secret {secret_id} has no version {version}")]
    UnknownVersion { secret_id: String, version: String },

    #[error("secret {secret_id} version {version} is not pending rotation")]
    NotPending { secret_id: String, version: String },

    #[error("secret {secret_id} step {step} invalid")]
    InvalidStep { secret_id: String, step: String },

    #[error("secret {secret_id} has no {stage} value")]
    MissingRecord { secret_id: String, stage: Stage },

    #[error("secret {secret_id} {stage} value invalid: {source}")]
    InvalidRecord {
        secret_id: String,
        stage: Stage,
        #[source]
        source: RecordError,
    },

    #[error("secret {secret_id}: no pending, current or previous credential can log in")]
    NoValidCredential { secret_id: String },

    #[error("secret {secret_id}: pending credential failed to log in")]
    PendingUnverified { secret_id: String },

    #[error("secret store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[source] anyhow::Error),
}

impl RotationError {
    /// True for errors raised by the rotator's own checks, as opposed to a
    /// collaborator failing underneath it.
    pub fn is_validation(&self) -> bool {
        !matches!(self, RotationError::Store(_) | RotationError::Database(_))
    }
}

impl IntoResponse for RotationError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = match &self {
            RotationError::RotationDisabled { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_request_error",
                "rotation_disabled",
            ),
            RotationError::UnknownVersion { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_request_error",
                "unknown_version",
            ),
            RotationError::NotPending { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_request_error",
                "version_not_pending",
            ),
            RotationError::InvalidStep { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_request_error",
                "invalid_step",
            ),
            RotationError::MissingRecord { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_secret_error",
                "missing_secret_value",
            ),
            RotationError::InvalidRecord { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_secret_error",
                "invalid_secret_value",
            ),
            RotationError::NoValidCredential { .. } => (
                StatusCode::CONFLICT,
                "rotation_error",
                "no_valid_credential",
            ),
            RotationError::PendingUnverified { .. } => (
                StatusCode::CONFLICT,
                "rotation_error",
                "pending_unverified",
            ),
            RotationError::Store(e) => {
                tracing::error!("Secret store error: {:#}", e);
                (StatusCode::BAD_GATEWAY, "upstream_error", "secret_store_failed")
            }
            RotationError::Database(e) => {
                tracing::error!("Database error: {:#}", e);
                (StatusCode::BAD_GATEWAY, "upstream_error", "database_failed")
            }
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
