use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::{header, HeaderValue, Response};
use pingora_core::{connectors::http::Connector, upstreams::peer::HttpPeer};
use pingora_error::{
    ErrorType::{ConnectNoRoute, InvalidHTTPHeader, ReadError},
    OkOrErr, OrErr, Result,
};
use pingora_http::{RequestHeader, ResponseHeader};
use pingora_load_balancing::{selection::RoundRobin, LoadBalancer};

use crate::{
    config::{self, UpstreamScheme},
    utils::response::strip_hop_by_hop,
};

use super::{FetchOptions, Forwarder};

/// Idle time a pooled upstream connection is kept around for reuse.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Forwarder backed by pingora's HTTP connector.
///
/// Nodes are picked round-robin; the full upstream body is buffered before the
/// response is handed back, so the downstream side can send it in one piece.
pub struct HttpFetcher {
    inner: config::Upstream,
    lb: Arc<LoadBalancer<RoundRobin>>,
    connector: Connector,
}

impl TryFrom<config::Upstream> for HttpFetcher {
    type Error = Box<pingora_error::Error>;

    fn try_from(value: config::Upstream) -> Result<Self> {
        let lb = LoadBalancer::<RoundRobin>::try_from_iter(value.nodes.iter().map(String::as_str))
            .or_err_with(ReadError, || {
                format!("Unable to resolve upstream nodes {:?}", value.nodes)
            })?;

        Ok(Self {
            inner: value,
            lb: Arc::new(lb),
            connector: Connector::new(None),
        })
    }
}

impl HttpFetcher {
    /// True once at least one upstream node is known.
    pub fn has_backends(&self) -> bool {
        self.lb.select(b"", 1).is_some()
    }

    /// Picks the next node and builds a peer for it.
    fn select_peer(&self) -> Result<HttpPeer> {
        let backend = self
            .lb
            .select(b"", 256)
            .or_err(ConnectNoRoute, "No upstream node available")?;

        let tls = self.inner.scheme == UpstreamScheme::HTTPS;
        let sni = self.inner.host.clone().unwrap_or_default();
        let mut peer = HttpPeer::new(backend, tls, sni);
        peer.options.verify_cert = self.inner.verify_cert;

        if let Some(timeout) = self.inner.timeout {
            peer.options.connection_timeout = Some(timeout.connect());
            peer.options.read_timeout = Some(timeout.read());
            peer.options.write_timeout = Some(timeout.send());
        }

        Ok(peer)
    }

    /// Builds the upstream request header for `path`.
    fn build_request(
        &self,
        path: &str,
        options: &FetchOptions,
        peer: &HttpPeer,
    ) -> Result<RequestHeader> {
        let target = match &self.inner.base_path {
            Some(base) => format!("{base}{path}"),
            None => path.to_string(),
        };

        let mut req = RequestHeader::build(
            options.method.clone(),
            target.as_bytes(),
            Some(options.headers.len() + 1),
        )?;

        for (name, value) in options.headers.iter() {
            req.append_header(name.clone(), value.clone())?;
        }

        let host = match &self.inner.host {
            Some(host) => host.clone(),
            None => peer._address.to_string(),
        };
        req.insert_header(header::HOST, host)?;

        Ok(req)
    }
}

#[async_trait]
impl Forwarder for HttpFetcher {
    async fn forward(&self, path: &str, options: FetchOptions) -> Result<Response<Vec<u8>>> {
        let peer = self.select_peer()?;
        let req = self.build_request(path, &options, &peer)?;
        log::debug!("Forwarding {} {} to {}", req.method, req.uri, peer._address);

        let (mut session, reused) = self.connector.get_http_session(&peer).await?;
        log::trace!("Upstream connection reused: {reused}");

        session.write_request_header(Box::new(req)).await?;
        session.finish_request_body().await?;
        session.read_response_header().await?;

        let resp_header = session
            .response_header()
            .or_err(InvalidHTTPHeader, "Upstream sent no response header")?
            .clone();

        let mut body = Vec::new();
        while let Some(chunk) = session.read_response_body().await? {
            body.extend_from_slice(&chunk);
        }

        self.connector
            .release_http_session(session, &peer, Some(IDLE_TIMEOUT))
            .await;

        Ok(into_response(&resp_header, body))
    }
}

/// Converts the upstream header and buffered body into a downstream response.
///
/// Status and end-to-end headers are kept as received. The body is no longer
/// chunked, so framing headers are replaced by an exact `Content-Length`.
pub fn into_response(resp_header: &ResponseHeader, body: Vec<u8>) -> Response<Vec<u8>> {
    let mut response = Response::new(body);
    *response.status_mut() = resp_header.status;
    *response.headers_mut() = resp_header.headers.clone();

    strip_hop_by_hop(response.headers_mut());
    let len = response.body().len();
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(len));

    response
}
