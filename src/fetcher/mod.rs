//! The shared forwarding utility used by route handlers.
//!
//! Handlers describe *what* to send (path, method, headers); a [`Forwarder`]
//! decides *where* it goes and how failures are shaped.

pub mod upstream;

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Response};
use pingora_error::Result;

pub use upstream::HttpFetcher;

/// Options for a single forwarded call.
#[derive(Clone, Debug)]
pub struct FetchOptions {
    pub method: Method,
    pub headers: HeaderMap,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
        }
    }
}

impl FetchOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Sends a request to the upstream API and hands back its response.
///
/// Upstream error statuses are ordinary responses. `Err` means no response
/// could be obtained at all.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, path: &str, options: FetchOptions) -> Result<Response<Vec<u8>>>;
}
