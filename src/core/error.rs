//! Unified error handling for statsgate request processing.
//!
//! Startup paths use `pingora_error::Result` directly; once a request is in
//! flight every failure is folded into a [`GatewayError`], which knows how to
//! render itself as a downstream response.

use std::fmt;

use http::{header, Response, StatusCode};
use pingora_error::ErrorType;

use crate::utils::response::ResponseBuilder;

/// Failures a route handler can surface to the client.
#[derive(Debug)]
pub enum GatewayError {
    /// No session, or a session without a user api key
    Unauthenticated,

    /// The session provider itself failed
    Session(String),

    /// The forwarder could not obtain any upstream response
    Upstream(Box<pingora_error::Error>),

    /// Internal system errors
    Internal(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Unauthenticated => write!(f, "Unauthenticated"),
            GatewayError::Session(msg) => write!(f, "Session lookup failed: {msg}"),
            GatewayError::Upstream(err) => write!(f, "Upstream request failed: {err}"),
            GatewayError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GatewayError::Upstream(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<Box<pingora_error::Error>> for GatewayError {
    fn from(err: Box<pingora_error::Error>) -> Self {
        GatewayError::Upstream(err)
    }
}

impl GatewayError {
    /// Status code presented to the downstream client.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::Upstream(err) => match err.etype() {
                ErrorType::ConnectTimedout
                | ErrorType::ReadTimedout
                | ErrorType::WriteTimedout => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            },
            GatewayError::Session(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Render the error as a plain-text response.
    ///
    /// Internal details are logged by the caller, never echoed to the client.
    pub fn into_response(self) -> Response<Vec<u8>> {
        let status = self.status();
        let mut resp = ResponseBuilder::error_http(
            status,
            status.canonical_reason().unwrap_or("Error"),
        );

        if matches!(self, GatewayError::Unauthenticated) {
            resp.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                http::HeaderValue::from_static("Bearer"),
            );
        }

        resp
    }
}

/// Result type alias for request handling
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
