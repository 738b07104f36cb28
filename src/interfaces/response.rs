use crate::error::BookingError;
use serde::Serialize;
use tracing::error;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// The envelope every operation answers with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    /// Stable error kind, absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            data: Some(data),
        }
    }

    /// Internal failures are logged here and reported without detail.
    pub fn failure(err: &BookingError) -> Self {
        let message = if err.is_internal() {
            error!(error = %err, "request failed");
            INTERNAL_MESSAGE.to_string()
        } else {
            err.to_string()
        };
        Self {
            success: false,
            message,
            error: Some(error_kind(err)),
            data: None,
        }
    }
}

pub fn error_kind(err: &BookingError) -> &'static str {
    match err {
        BookingError::NotFound(_) => "not_found",
        BookingError::Forbidden(_) => "forbidden",
        BookingError::InvalidState(_) => "invalid_state",
        BookingError::AlreadyProcessed(_) => "already_processed",
        BookingError::InsufficientFunds => "insufficient_funds",
        BookingError::ScheduleConflict(_) => "schedule_conflict",
        BookingError::ExternalServiceFailure(_) => "external_service_failure",
        BookingError::ValidationError(_) => "validation_error",
        BookingError::InternalError(_) => "internal_error",
        #[cfg(feature = "storage-rocksdb")]
        BookingError::Storage(_) => "internal_error",
    }
}
