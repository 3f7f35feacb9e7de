//! Response building helpers shared by the route handlers and the auxiliary apps.

use http::{header, HeaderName, HeaderValue, Response, StatusCode};
use serde::Serialize;

/// Standard content types
pub mod content_type {
    pub const TEXT_PLAIN: &str = "text/plain";
    pub const APPLICATION_JSON: &str = "application/json";
}

/// Connection-scoped headers that must not be relayed between hops.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub struct ResponseBuilder;

impl ResponseBuilder {
    /// Build an error response with a plain-text body.
    pub fn error_http(status: StatusCode, message: &str) -> Response<Vec<u8>> {
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, content_type::TEXT_PLAIN)
            .header(header::CONTENT_LENGTH, message.len())
            .body(message.as_bytes().to_vec())
            .unwrap_or_else(|e| {
                log::error!("Failed to build error response: {e}");
                Self::fallback()
            })
    }

    /// Build a JSON response.
    pub fn json<T: Serialize>(status: StatusCode, data: &T) -> Response<Vec<u8>> {
        match serde_json::to_vec(data) {
            Ok(body) => Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, content_type::APPLICATION_JSON)
                .header(header::CONTENT_LENGTH, body.len())
                .body(body)
                .unwrap_or_else(|e| {
                    log::error!("Failed to build JSON response: {e}");
                    Self::fallback()
                }),
            Err(e) => {
                log::error!("Failed to serialize JSON response: {e}");
                Self::error_http(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }

    /// `405` for a known path hit with the wrong method.
    pub fn method_not_allowed(allow: &str) -> Response<Vec<u8>> {
        let mut resp = Self::error_http(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        match HeaderValue::from_str(allow) {
            Ok(value) => {
                resp.headers_mut().insert(header::ALLOW, value);
            }
            Err(e) => log::error!("Invalid Allow header '{allow}': {e}"),
        }
        resp
    }

    pub fn not_found() -> Response<Vec<u8>> {
        Self::error_http(StatusCode::NOT_FOUND, "Not Found")
    }

    fn fallback() -> Response<Vec<u8>> {
        let mut resp = Response::new(b"Internal Server Error".to_vec());
        *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        resp
    }
}

/// Drop hop-by-hop headers, including any named by the `Connection` header.
pub fn strip_hop_by_hop(headers: &mut http::HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}
