use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Instant,
};

use async_trait::async_trait;
use http::{Method, Response, StatusCode};
use matchit::{Match, Router};
use pingora::{
    apps::http_app::ServeHttp, protocols::http::ServerSession, services::listening::Service,
};
use pingora_core::listeners::tls::TlsSettings;
use pingora_error::{ErrorType::InternalError, OrErr, Result};
use pingora_http::RequestHeader;

use crate::{
    config::{Listener, Tls},
    core::GatewayError,
    fetcher::Forwarder,
    handler::{score_stats, EvaluationScoreStats, RequestContext, RouteHandler},
    metrics,
    session::SessionProvider,
    utils::{request, response::ResponseBuilder},
};

/// Handlers registered under one route pattern.
struct RouteEntry {
    pattern: &'static str,
    handlers: HashMap<Method, Arc<dyn RouteHandler>>,
}

impl RouteEntry {
    fn allow(&self) -> String {
        let mut methods: Vec<&str> = self.handlers.keys().map(Method::as_str).collect();
        methods.sort_unstable();
        methods.join(", ")
    }
}

/// The BFF application: routes `/api/...` requests to their handlers.
pub struct BffHttpApp {
    router: Router<RouteEntry>,
}

impl BffHttpApp {
    pub fn new(sessions: Arc<dyn SessionProvider>, forwarder: Arc<dyn Forwarder>) -> Result<Self> {
        let mut this = Self {
            router: Router::new(),
        };

        this.route(
            score_stats::ROUTE_PATH,
            Method::GET,
            Arc::new(EvaluationScoreStats::new(sessions, forwarder)),
        )?;

        Ok(this)
    }

    /// Registers a handler for `method` on `pattern`.
    fn route(
        &mut self,
        pattern: &'static str,
        method: Method,
        handler: Arc<dyn RouteHandler>,
    ) -> Result<&mut Self> {
        let registered = matches!(self.router.at(pattern), Ok(m) if m.value.pattern == pattern);

        if registered {
            if let Ok(entry) = self.router.at_mut(pattern) {
                entry.value.handlers.insert(method, handler);
            }
        } else {
            let mut handlers = HashMap::new();
            handlers.insert(method, handler);
            self.router
                .insert(pattern, RouteEntry { pattern, handlers })
                .or_err_with(InternalError, || format!("Failed to register route {pattern}"))?;
        }
        Ok(self)
    }

    /// Resolves and runs the handler for one request.
    ///
    /// Never fails: handler errors are logged and turned into responses here.
    pub async fn dispatch(&self, req_header: &RequestHeader) -> Response<Vec<u8>> {
        let start = Instant::now();
        let request_id = request::request_id(req_header);
        let path = req_header.uri.path();

        let (route, response) = match self.router.at(path) {
            Ok(Match { value, params }) => {
                let response = match value.handlers.get(&req_header.method) {
                    Some(handler) => {
                        let ctx = RequestContext {
                            params: params
                                .iter()
                                .map(|(k, v)| (k.to_string(), v.to_string()))
                                .collect::<BTreeMap<_, _>>(),
                            request_id: request_id.clone(),
                        };
                        match handler.handle(req_header, &ctx).await {
                            Ok(resp) => resp,
                            Err(e) => {
                                log_handler_error(&e, &request_id);
                                e.into_response()
                            }
                        }
                    }
                    None => ResponseBuilder::method_not_allowed(&value.allow()),
                };
                (value.pattern, response)
            }
            Err(_) => (metrics::UNMATCHED_ROUTE, ResponseBuilder::not_found()),
        };

        metrics::record_request(route, response.status());
        log::info!(
            "{} {} {} request_id={} {}ms",
            req_header.method,
            path,
            response.status().as_u16(),
            request_id,
            start.elapsed().as_millis()
        );

        response
    }

    /// Builds the listening service with every configured listener attached.
    pub fn bff_http_service(self, listeners: &[Listener]) -> Result<Service<Self>> {
        let mut service = Service::new("BFF HTTP".to_string(), self);

        for list_cfg in listeners {
            let addr = list_cfg.address.to_string();
            match &list_cfg.tls {
                Some(Tls {
                    cert_path,
                    key_path,
                }) => {
                    let mut settings = TlsSettings::intermediate(cert_path, key_path)?;
                    if list_cfg.offer_h2 {
                        settings.enable_h2();
                    }
                    service.add_tls_with_settings(&addr, None, settings);
                }
                None => service.add_tcp(&addr),
            }
            log::info!("Listening on {addr}");
        }

        Ok(service)
    }
}

fn log_handler_error(e: &GatewayError, request_id: &str) {
    match e {
        GatewayError::Unauthenticated => log::debug!("request_id={request_id}: {e}"),
        _ => log::error!("request_id={request_id}: {e}"),
    }
}

#[async_trait]
impl ServeHttp for BffHttpApp {
    async fn response(&self, http_session: &mut ServerSession) -> Response<Vec<u8>> {
        self.dispatch(http_session.req_header()).await
    }
}
