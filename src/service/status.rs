use std::sync::Arc;

use async_trait::async_trait;
use http::{Response, StatusCode};
use pingora::{
    apps::http_app::ServeHttp, protocols::http::ServerSession, services::listening::Service,
};
use serde::Serialize;

use crate::{config::Status, core::Readiness, fetcher::HttpFetcher, utils::response::ResponseBuilder};

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// HTTP application for the readiness probe.
///
/// `/status/ready` answers 200 `{"status":"ok"}` once startup has finished
/// and the upstream has at least one node, 503 with the reason otherwise.
/// Kept apart from the BFF listeners so probes never need a session.
pub struct StatusHttpApp {
    readiness: Readiness,
    fetcher: Arc<HttpFetcher>,
}

impl StatusHttpApp {
    pub fn new(readiness: Readiness, fetcher: Arc<HttpFetcher>) -> Self {
        Self { readiness, fetcher }
    }

    pub fn status_http_service(self, cfg: &Status) -> Service<Self> {
        let addr = cfg.address.to_string();
        let mut service = Service::new("Status HTTP".to_string(), self);
        service.add_tcp(&addr);
        service
    }

    fn ready(&self) -> Response<Vec<u8>> {
        let error = if !self.readiness.is_ready() {
            Some("Service is still starting")
        } else if !self.fetcher.has_backends() {
            Some("No upstream node available")
        } else {
            None
        };

        match error {
            None => ResponseBuilder::json(
                StatusCode::OK,
                &StatusResponse {
                    status: "ok".to_string(),
                    error: None,
                },
            ),
            Some(reason) => ResponseBuilder::json(
                StatusCode::SERVICE_UNAVAILABLE,
                &StatusResponse {
                    status: "error".to_string(),
                    error: Some(reason.to_string()),
                },
            ),
        }
    }

    fn route(&self, path: &str) -> Response<Vec<u8>> {
        match path {
            "/status/ready" => self.ready(),
            _ => ResponseBuilder::not_found(),
        }
    }
}

#[async_trait]
impl ServeHttp for StatusHttpApp {
    async fn response(&self, http_session: &mut ServerSession) -> Response<Vec<u8>> {
        http_session.set_keepalive(None);
        let path = http_session.req_header().uri.path().to_string();
        self.route(&path)
    }
}
