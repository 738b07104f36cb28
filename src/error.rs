use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BookingError>;

/// Every failure the booking core can report.
///
/// Variants map one-to-one to what a caller is told; `InternalError` and
/// `Storage` carry detail that is logged but never shown.
#[derive(Error, Debug, Diagnostic)]
pub enum BookingError {
    #[error("{0} not found")]
    #[diagnostic(code(booking::not_found))]
    NotFound(String),

    #[error("Forbidden: {0}")]
    #[diagnostic(code(booking::forbidden))]
    Forbidden(String),

    #[error("Invalid state: {0}")]
    #[diagnostic(code(booking::invalid_state))]
    InvalidState(String),

    #[error("Transaction {0} has already been processed")]
    #[diagnostic(code(booking::already_processed))]
    AlreadyProcessed(u64),

    #[error("Insufficient funds")]
    #[diagnostic(code(booking::insufficient_funds))]
    InsufficientFunds,

    #[error("Schedule conflicts with order {0}")]
    #[diagnostic(code(booking::schedule_conflict))]
    ScheduleConflict(String),

    #[error("External service failure: {0}")]
    #[diagnostic(code(booking::external_service))]
    ExternalServiceFailure(String),

    #[error("Validation error: {0}")]
    #[diagnostic(code(booking::validation))]
    ValidationError(String),

    #[error("Internal error: {0}")]
    #[diagnostic(code(booking::internal))]
    InternalError(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    #[diagnostic(code(booking::storage))]
    Storage(#[from] rocksdb::Error),
}

impl BookingError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(Box::new(std::io::Error::other(message.into())))
    }

    /// `AlreadyProcessed` belongs to the invalid-state family.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_) | Self::AlreadyProcessed(_))
    }

    /// Whether the message is safe to hand back to a caller verbatim.
    pub fn is_internal(&self) -> bool {
        #[cfg(feature = "storage-rocksdb")]
        if matches!(self, Self::Storage(_)) {
            return true;
        }
        matches!(self, Self::InternalError(_))
    }
}

impl From<std::io::Error> for BookingError {
    fn from(err: std::io::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

impl From<serde_json::Error> for BookingError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

impl From<csv::Error> for BookingError {
    fn from(err: csv::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}
