use pulsemon_common::metric::MetricKind;

/// Errors that can occur within the storage layer.
///
/// Validation-class failures (`NotFound`, `TypeConflict`,
/// `InvalidOperation`) carry enough structure for callers to render a
/// precise message and to map each onto a distinct transport status.
///
/// # Examples
///
/// ```rust
/// use pulsemon_storage::error::StorageError;
///
/// let err = StorageError::NotFound { id: "requests".to_string() };
/// assert!(err.to_string().contains("requests"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No metric with the requested id exists in the store.
    #[error("metric with id '{id}' not found in the storage")]
    NotFound { id: String },

    /// The stored metric has a different kind than the request declared.
    /// A metric's kind never changes after creation.
    #[error("requested operation on metric '{id}' with kind {requested}, but stored kind is {stored}")]
    TypeConflict {
        id: String,
        requested: MetricKind,
        stored: MetricKind,
    },

    /// The operation is incompatible with the declared kind, e.g. an
    /// increment addressed at a gauge.
    #[error("could not increment metric '{id}' of kind {kind}")]
    InvalidOperation { id: String, kind: MetricKind },

    /// The metric carries no value for its declared kind. Callers are
    /// expected to validate before writing; this guards the store itself.
    #[error("metric '{id}' carries no value for its declared kind")]
    MissingValue { id: String },

    /// An underlying SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Snapshot serialization or deserialization failure.
    #[error("snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot sink unreadable or unwritable.
    #[error("snapshot i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
