//! statsgate: a small backend-for-frontend gateway built on pingora.
//!
//! Browser requests under `/api` carry a session cookie; statsgate resolves
//! the session, swaps it for the user's api key and relays the call to the
//! upstream API, returning the upstream answer as-is.

pub mod config;
pub mod core;
pub mod fetcher;
pub mod handler;
pub mod logging;
pub mod metrics;
pub mod service;
pub mod session;
pub(crate) mod utils;
