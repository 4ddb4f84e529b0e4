use axum::http::StatusCode;
use pulsemon_common::signer::SignError;
use pulsemon_storage::error::StorageError;

/// Application-level error with a distinct status signal per failure
/// class, so client tooling can tell "not yet reported" from
/// "misconfigured client" from "malformed request".
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Structurally invalid input: missing value, malformed payload,
    /// unknown kind, or signature mismatch.
    #[error("validation error: {0}")]
    Validation(String),

    /// Signature computation was impossible on the server side.
    #[error(transparent)]
    Signing(#[from] SignError),

    /// Propagated storage failure; never converted into a success.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Storage(err) => match err {
                StorageError::NotFound { .. } => StatusCode::NOT_FOUND,
                StorageError::TypeConflict { .. } => StatusCode::CONFLICT,
                StorageError::InvalidOperation { .. } => StatusCode::NOT_IMPLEMENTED,
                StorageError::MissingValue { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn grpc_status(&self) -> tonic::Status {
        let message = self.to_string();
        match self {
            ServiceError::Validation(_) => tonic::Status::invalid_argument(message),
            ServiceError::Signing(_) => tonic::Status::internal(message),
            ServiceError::Storage(err) => match err {
                StorageError::NotFound { .. } => tonic::Status::not_found(message),
                StorageError::TypeConflict { .. } => tonic::Status::failed_precondition(message),
                StorageError::InvalidOperation { .. } => tonic::Status::unimplemented(message),
                StorageError::MissingValue { .. } => tonic::Status::invalid_argument(message),
                _ => tonic::Status::internal(message),
            },
        }
    }
}
