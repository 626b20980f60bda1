//! Request handlers.

pub mod classes;
pub mod health;
pub mod predict;

use axum::http::StatusCode;

use crate::error::Error;

/// Map a service error to an HTTP response pair.
///
/// Client faults (bad uploads) get 400, everything else 500; timeouts
/// are mapped separately by the handlers that enforce them.
pub(crate) fn error_response(err: Error) -> (StatusCode, String) {
    if err.is_client_fault() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}
