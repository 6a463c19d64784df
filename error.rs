//! Single error kind carrying a message prefix and an optional cause (spec §7).

/// The one error type returned by every public operation.
///
/// Each variant corresponds to one of the failure categories in `spec.md` §7. Downstream code
/// matches on the variant rather than parsing `message`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Write for an unregistered type under strict mode, or a registered type missing an id
    /// mapping it requires.
    #[error("registration required: {0}")]
    RegistrationRequired(String),

    /// `read_object(filter)` matched zero rows.
    #[error("not found")]
    NotFound,

    /// `read_object(filter)` matched more than one row.
    #[error("too many rows matched, expected exactly one")]
    TooMany,

    /// The serializer plug-in failed to encode or decode a value.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The underlying SQL engine returned an error.
    #[error("engine error: {0}")]
    EngineError(#[source] sqlx::Error),

    /// A cancellation token fired before or during the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Misuse of the API: nested transactions, bad arguments, conflicting registrations, etc.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl StoreError {
    pub(crate) fn registration_required(msg: impl Into<String>) -> Self {
        StoreError::RegistrationRequired(msg.into())
    }

    pub(crate) fn invalid_operation(msg: impl Into<String>) -> Self {
        StoreError::InvalidOperation(msg.into())
    }

    pub(crate) fn serialization_failed<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::SerializationFailed(Box::new(err))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::EngineError(err)
    }
}
