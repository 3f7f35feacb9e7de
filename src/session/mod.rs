//! Session resolution for inbound requests.
//!
//! The route handlers never look at cookies or tokens themselves; they ask a
//! [`SessionProvider`] for the current [`Session`] and act on the result.

pub mod jwt;

use async_trait::async_trait;
use pingora_error::Result;
use pingora_http::RequestHeader;
use serde::{Deserialize, Serialize};

pub use jwt::JwtSessionProvider;

/// The authenticated user attached to a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Credential forwarded upstream as a bearer token.
    pub api_key: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Request-scoped record of an authenticated user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    /// Expiry as a unix timestamp, when the provider knows it.
    #[serde(default)]
    pub expires: Option<i64>,
}

impl Session {
    pub fn new(user: User) -> Self {
        Self {
            user,
            expires: None,
        }
    }

    /// Value for the upstream `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.user.api_key)
    }
}

/// Resolves the current session for a request.
///
/// `Ok(None)` means the request is unauthenticated; `Err` is reserved for the
/// provider itself being unable to answer.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn current_session(&self, req_header: &RequestHeader) -> Result<Option<Session>>;
}
