//! Error taxonomy for the board engine and its HTTP gateway.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::model::{MAX_VOTES_PER_PARTICIPANT, Phase};
use crate::store::StoreError;

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by board engine operations.
///
/// Every failure is reported synchronously to the caller; the engine never
/// retries. The only deliberate silent path is trimmed-empty card content,
/// which is a no-op rather than an error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input failed shape or length validation.
    #[error("invalid input: {0}")]
    Validation(String),
    /// The caller lacks the role required for the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The operation is not allowed in the current phase.
    #[error("not allowed in the {phase} phase: {message}")]
    PhaseViolation {
        /// Phase the session was in when the operation was attempted.
        phase: Phase,
        /// What was attempted.
        message: String,
    },
    /// The participant has spent their whole vote budget.
    #[error("vote budget exhausted ({MAX_VOTES_PER_PARTICIPANT} votes per session)")]
    BudgetExceeded,
    /// The session (or the active-session requirement) could not be satisfied.
    #[error("not found: {0}")]
    NotFound(String),
    /// The display name is already bound to another participant.
    #[error("display name `{0}` is already taken in this session")]
    NameConflict(String),
    /// The backing store rejected the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Shorthand for the "no active session" precondition failure.
    pub fn no_session() -> Self {
        EngineError::NotFound("no active session".into())
    }
}

/// Gateway-level errors converted into HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable { .. } => AppError::ServiceUnavailable(err.to_string()),
            StoreError::Malformed { .. } => AppError::Internal(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
