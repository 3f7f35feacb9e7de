use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use http::{header, HeaderValue, Method, Response};
use pingora_http::RequestHeader;

use crate::{
    core::{GatewayError, GatewayResult},
    fetcher::{FetchOptions, Forwarder},
    metrics,
    session::SessionProvider,
    utils::request::{self, HTTP_HEADER_X_REQUEST_ID},
};

use super::{RequestContext, RouteHandler};

pub const ROUTE_PATH: &str = "/api/projects/{projectId}/evaluation-score-stats";
const PROJECT_ID_PARAM: &str = "projectId";

/// Upstream path for a project's evaluation score statistics.
///
/// The query string is appended untouched, so parameter order and encoding
/// survive the hop. An empty query adds no `?`.
pub fn upstream_path(project_id: &str, query: &str) -> String {
    if query.is_empty() {
        format!("/projects/{project_id}/evaluation-score-stats")
    } else {
        format!("/projects/{project_id}/evaluation-score-stats?{query}")
    }
}

/// Proxies `GET /api/projects/{projectId}/evaluation-score-stats` to the
/// upstream API on behalf of the signed-in user.
pub struct EvaluationScoreStats {
    sessions: Arc<dyn SessionProvider>,
    forwarder: Arc<dyn Forwarder>,
}

impl EvaluationScoreStats {
    pub fn new(sessions: Arc<dyn SessionProvider>, forwarder: Arc<dyn Forwarder>) -> Self {
        Self {
            sessions,
            forwarder,
        }
    }
}

#[async_trait]
impl RouteHandler for EvaluationScoreStats {
    async fn handle(
        &self,
        req_header: &RequestHeader,
        ctx: &RequestContext,
    ) -> GatewayResult<Response<Vec<u8>>> {
        let session = self
            .sessions
            .current_session(req_header)
            .await
            .map_err(|e| GatewayError::Session(e.to_string()))?
            .ok_or(GatewayError::Unauthenticated)?;

        let project_id = ctx
            .param(PROJECT_ID_PARAM)
            .ok_or_else(|| GatewayError::Internal("Missing projectId path parameter".to_string()))?;
        let path = upstream_path(project_id, request::get_query_string(req_header));

        let authorization = HeaderValue::from_str(&session.bearer())
            .map_err(|_| GatewayError::Internal("Session api key is not a valid header value".to_string()))?;
        let request_id = HeaderValue::from_str(&ctx.request_id)
            .map_err(|_| GatewayError::Internal("Invalid request id".to_string()))?;

        let options = FetchOptions::new(Method::GET)
            .with_header(header::AUTHORIZATION, authorization)
            .with_header(HTTP_HEADER_X_REQUEST_ID.clone(), request_id);

        let start = Instant::now();
        let result = self.forwarder.forward(&path, options).await;
        metrics::observe_upstream_latency(ROUTE_PATH, start.elapsed());

        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::StatusCode;
    use pingora_error::{Error, ErrorType, Result};

    use super::*;
    use crate::session::{Session, User};

    struct StaticSessions(Option<Session>);

    #[async_trait]
    impl SessionProvider for StaticSessions {
        async fn current_session(&self, _req_header: &RequestHeader) -> Result<Option<Session>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenSessions;

    #[async_trait]
    impl SessionProvider for BrokenSessions {
        async fn current_session(&self, _req_header: &RequestHeader) -> Result<Option<Session>> {
            Error::e_explain(ErrorType::InternalError, "session store offline")
        }
    }

    /// Records every call and replies with a canned upstream result.
    struct RecordingForwarder {
        calls: Mutex<Vec<(String, FetchOptions)>>,
        reply: fn() -> Result<Response<Vec<u8>>>,
    }

    impl RecordingForwarder {
        fn new(reply: fn() -> Result<Response<Vec<u8>>>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reply,
            })
        }

        fn calls(&self) -> Vec<(String, FetchOptions)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Forwarder for RecordingForwarder {
        async fn forward(&self, path: &str, options: FetchOptions) -> Result<Response<Vec<u8>>> {
            self.calls
                .lock()
                .unwrap()
                .push((path.to_string(), options));
            (self.reply)()
        }
    }

    fn ok_reply() -> Result<Response<Vec<u8>>> {
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-upstream", "scores")
            .body(br#"{"avg":0.5}"#.to_vec())
            .unwrap())
    }

    fn not_found_reply() -> Result<Response<Vec<u8>>> {
        Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(br#"{"error":"project not found"}"#.to_vec())
            .unwrap())
    }

    fn refused_reply() -> Result<Response<Vec<u8>>> {
        Err(Error::new(ErrorType::ConnectRefused))
    }

    fn session(api_key: &str) -> Option<Session> {
        Some(Session::new(User {
            api_key: api_key.to_string(),
            id: Some("u1".to_string()),
            name: None,
            email: None,
        }))
    }

    fn request(path: &str, project_id: &str) -> (RequestHeader, RequestContext) {
        let req = RequestHeader::build("GET", path.as_bytes(), None).unwrap();
        let ctx = RequestContext {
            params: [(PROJECT_ID_PARAM.to_string(), project_id.to_string())].into(),
            request_id: "req-1".to_string(),
        };
        (req, ctx)
    }

    #[test]
    fn test_upstream_path() {
        assert_eq!(
            upstream_path("42", "from=2024-01-01"),
            "/projects/42/evaluation-score-stats?from=2024-01-01"
        );
        assert_eq!(upstream_path("42", ""), "/projects/42/evaluation-score-stats");
        assert_eq!(
            upstream_path("p%2Fx", "z=1&a=%20b&a=2"),
            "/projects/p%2Fx/evaluation-score-stats?z=1&a=%20b&a=2"
        );
    }

    #[tokio::test]
    async fn test_authenticated_request_is_forwarded() {
        let forwarder = RecordingForwarder::new(ok_reply);
        let handler = EvaluationScoreStats::new(
            Arc::new(StaticSessions(session("abc123"))),
            forwarder.clone(),
        );
        let (req, ctx) = request("/api/projects/42/evaluation-score-stats?from=2024-01-01", "42");

        let response = handler.handle(&req, &ctx).await.unwrap();

        let calls = forwarder.calls();
        assert_eq!(calls.len(), 1);
        let (path, options) = &calls[0];
        assert_eq!(path, "/projects/42/evaluation-score-stats?from=2024-01-01");
        assert_eq!(options.method, Method::GET);
        assert_eq!(options.headers[header::AUTHORIZATION], "Bearer abc123");
        assert_eq!(options.headers["x-request-id"], "req-1");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()["x-upstream"], "scores");
        assert_eq!(response.body(), br#"{"avg":0.5}"#);
    }

    #[tokio::test]
    async fn test_query_order_and_encoding_preserved() {
        let forwarder = RecordingForwarder::new(ok_reply);
        let handler =
            EvaluationScoreStats::new(Arc::new(StaticSessions(session("k"))), forwarder.clone());
        let (req, ctx) = request(
            "/api/projects/7/evaluation-score-stats?to=2024-02-01&from=2024-01-01&q=a%20b%26c",
            "7",
        );

        handler.handle(&req, &ctx).await.unwrap();

        assert_eq!(
            forwarder.calls()[0].0,
            "/projects/7/evaluation-score-stats?to=2024-02-01&from=2024-01-01&q=a%20b%26c"
        );
    }

    #[tokio::test]
    async fn test_missing_session_is_unauthenticated_without_forwarding() {
        let forwarder = RecordingForwarder::new(ok_reply);
        let handler = EvaluationScoreStats::new(Arc::new(StaticSessions(None)), forwarder.clone());
        let (req, ctx) = request("/api/projects/42/evaluation-score-stats", "42");

        let err = handler.handle(&req, &ctx).await.unwrap_err();

        assert!(matches!(err, GatewayError::Unauthenticated));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert!(forwarder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_session_provider_failure() {
        let forwarder = RecordingForwarder::new(ok_reply);
        let handler = EvaluationScoreStats::new(Arc::new(BrokenSessions), forwarder.clone());
        let (req, ctx) = request("/api/projects/42/evaluation-score-stats", "42");

        let err = handler.handle(&req, &ctx).await.unwrap_err();

        assert!(matches!(err, GatewayError::Session(_)));
        assert!(forwarder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_error_status_passes_through() {
        let forwarder = RecordingForwarder::new(not_found_reply);
        let handler =
            EvaluationScoreStats::new(Arc::new(StaticSessions(session("k"))), forwarder.clone());
        let (req, ctx) = request("/api/projects/404/evaluation-score-stats", "404");

        let response = handler.handle(&req, &ctx).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body(), br#"{"error":"project not found"}"#);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_bad_gateway() {
        let forwarder = RecordingForwarder::new(refused_reply);
        let handler =
            EvaluationScoreStats::new(Arc::new(StaticSessions(session("k"))), forwarder.clone());
        let (req, ctx) = request("/api/projects/1/evaluation-score-stats", "1");

        let err = handler.handle(&req, &ctx).await.unwrap_err();

        assert!(matches!(err, GatewayError::Upstream(_)));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(forwarder.calls().len(), 1);
    }
}
