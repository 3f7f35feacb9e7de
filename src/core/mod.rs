//! Request-time error type and readiness state shared by the services.

pub mod error;
pub mod status;

pub use error::{GatewayError, GatewayResult};
pub use status::Readiness;
