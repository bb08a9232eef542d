//! Request error taxonomy. Every failure is converted into one of these
//! at the engine boundary and answered to the requester only; no error
//! aborts the engine or touches other sessions.

use thiserror::Error;

use session::registry::AuthError;
use signal::store::{AdmitError, CancelError};
use signal::validate::ValidationError;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("authentication failed, check your credentials")]
    AuthFailed,

    #[error("rate limit exceeded, try again shortly")]
    RateLimited,

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("invalid request: {0}")]
    Malformed(String),

    #[error("maximum number of active signals reached ({max})")]
    CapacityExceeded { max: usize },

    #[error("signal not found")]
    NotFound,

    #[error("signal is no longer active")]
    SignalTerminal,

    #[error("action not permitted for this client type")]
    UnauthorizedAction,

    #[error("signal admission is temporarily halted")]
    AdmissionsHalted,

    #[error("internal server error")]
    Internal,
}

impl RequestError {
    /// Wire-level `error_code` for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::AuthFailed => "AUTH_FAILED",
            RequestError::RateLimited => "RATE_LIMITED",
            RequestError::Validation(_) | RequestError::Malformed(_) => "VALIDATION_FAILED",
            RequestError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            RequestError::NotFound | RequestError::SignalTerminal => "NOT_FOUND",
            RequestError::UnauthorizedAction => "UNAUTHORIZED_ACTION",
            RequestError::AdmissionsHalted | RequestError::Internal => "INTERNAL",
        }
    }

    /// Whether the connection is closed after this error is answered.
    pub fn closes_connection(&self) -> bool {
        matches!(self, RequestError::AuthFailed)
    }
}

impl From<AuthError> for RequestError {
    fn from(_: AuthError) -> Self {
        RequestError::AuthFailed
    }
}

impl From<AdmitError> for RequestError {
    fn from(e: AdmitError) -> Self {
        match e {
            AdmitError::Capacity { max } => RequestError::CapacityExceeded { max },
            AdmitError::Invalid(v) => RequestError::Validation(v),
        }
    }
}

impl From<CancelError> for RequestError {
    fn from(e: CancelError) -> Self {
        match e {
            CancelError::NotFound => RequestError::NotFound,
            CancelError::AlreadyTerminal => RequestError::SignalTerminal,
        }
    }
}
