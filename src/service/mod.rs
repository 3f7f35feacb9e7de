//! Pingora services exposed by statsgate.

pub mod http;
pub mod status;

pub use self::http::BffHttpApp;
pub use status::StatusHttpApp;
