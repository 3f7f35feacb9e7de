//! Route handlers served by the BFF HTTP app.

pub mod score_stats;

use std::collections::BTreeMap;

use async_trait::async_trait;
use http::Response;
use pingora_http::RequestHeader;

use crate::core::GatewayResult;

pub use score_stats::EvaluationScoreStats;

/// Per-request data resolved by the app before a handler runs.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    /// Path parameters captured by the route pattern, undecoded.
    pub params: BTreeMap<String, String>,
    pub request_id: String,
}

impl RequestContext {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(
        &self,
        req_header: &RequestHeader,
        ctx: &RequestContext,
    ) -> GatewayResult<Response<Vec<u8>>>;
}
