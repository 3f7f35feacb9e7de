use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use log::{debug, trace};
use once_cell::sync::Lazy;
use pingora::server::configuration::{Opt, ServerConf};
use pingora_error::{Error, ErrorType::*, OrErr, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

static NODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:\d{1,3}\.){3}\d{1,3}|\[[0-9a-f:]+\]|[a-z0-9.-]+):\d{1,5}$").unwrap()
});

#[derive(Default, Debug, Serialize, Deserialize, Validate)]
pub struct Config {
    #[serde(default)]
    pub pingora: ServerConf,

    #[validate(nested)]
    pub statsgate: Statsgate,
}

// Config file load and validation
impl Config {
    pub fn load_from_yaml<P>(path: P) -> Result<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path).or_err_with(ReadError, || {
            format!("Unable to read conf file from {path}")
        })?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    // config file load entry point
    pub fn load_yaml_with_opt_override(opt: &Opt) -> Result<Self> {
        if let Some(path) = &opt.conf {
            let mut conf = Self::load_from_yaml(path)?;
            conf.merge_with_opt(opt);
            Ok(conf)
        } else {
            Error::e_explain(ReadError, "No path specified")
        }
    }

    pub fn from_yaml(conf_str: &str) -> Result<Self> {
        let conf: Config = serde_yaml::from_str(conf_str)
            .or_err_with(ReadError, || "Unable to parse yaml conf")?;

        // secrets live in the session section, keep them out of trace logs
        trace!("Loaded conf for listeners: {:?}", conf.statsgate.listeners);

        conf.validate()
            .or_err_with(FileReadError, || "Conf file valid failed")?;

        Ok(conf)
    }

    #[allow(dead_code)]
    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap_or_default()
    }

    pub fn merge_with_opt(&mut self, opt: &Opt) {
        if opt.daemon {
            self.pingora.daemon = true;
        }
    }
}

#[derive(Default, Debug, Serialize, Deserialize, Validate)]
pub struct Statsgate {
    #[validate(length(min = 1))]
    #[validate(nested)]
    pub listeners: Vec<Listener>,

    #[validate(nested)]
    pub upstream: Upstream,

    #[validate(nested)]
    pub session: Auth,

    pub log: Option<Log>,
    pub prometheus: Option<Prometheus>,
    pub status: Option<Status>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Listener::validate_tls_for_offer_h2"))]
pub struct Listener {
    pub address: SocketAddr,
    pub tls: Option<Tls>,
    #[serde(default)]
    pub offer_h2: bool,
}

impl Listener {
    fn validate_tls_for_offer_h2(&self) -> Result<(), ValidationError> {
        if self.offer_h2 && self.tls.is_none() {
            Err(ValidationError::new("tls_required_for_h2"))
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tls {
    pub cert_path: String,
    pub key_path: String,
}

/// Upstream timeouts, in seconds.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Validate)]
pub struct Timeout {
    pub connect: u64,
    pub send: u64,
    pub read: u64,
}

impl Timeout {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect)
    }

    pub fn send(&self) -> Duration {
        Duration::from_secs(self.send)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read)
    }
}

/// The API service the gateway forwards to.
#[derive(Clone, Default, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Upstream::validate_host_for_https"))]
pub struct Upstream {
    #[validate(length(min = 1), custom(function = "Upstream::validate_nodes"))]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub scheme: UpstreamScheme,
    /// Sent as `Host` and used as TLS SNI; defaults to the selected node address.
    /// Required for https.
    pub host: Option<String>,
    /// Prefix prepended to every forwarded path, e.g. `/v1`.
    #[validate(custom(function = "Upstream::validate_base_path"))]
    pub base_path: Option<String>,
    #[serde(default = "Upstream::default_verify_cert")]
    pub verify_cert: bool,
    #[validate(nested)]
    pub timeout: Option<Timeout>,
}

impl Upstream {
    fn default_verify_cert() -> bool {
        true
    }

    fn validate_host_for_https(&self) -> Result<(), ValidationError> {
        if self.scheme == UpstreamScheme::HTTPS && self.host.is_none() {
            Err(ValidationError::new("host_required_for_https"))
        } else {
            Ok(())
        }
    }

    fn validate_nodes(nodes: &[String]) -> Result<(), ValidationError> {
        for node in nodes {
            if !NODE_RE.is_match(node) {
                let mut err = ValidationError::new("invalid_node");
                err.add_param("node".into(), node);
                return Err(err);
            }
        }
        Ok(())
    }

    fn validate_base_path(base_path: &str) -> Result<(), ValidationError> {
        if !base_path.starts_with('/') || base_path.ends_with('/') {
            return Err(ValidationError::new("base_path_format"));
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamScheme {
    #[default]
    HTTP,
    HTTPS,
}

/// Session token verification settings.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Auth::validate_key_material"))]
pub struct Auth {
    /// Cookies searched for the session token, in order.
    #[serde(default = "Auth::default_cookie_names")]
    #[validate(length(min = 1))]
    pub cookie_names: Vec<String>,

    #[serde(default = "Auth::default_algorithm")]
    pub algorithm: Algorithm,

    /// Shared secret for HMAC algorithms.
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,

    #[serde(default)]
    pub base64_secret: bool,

    /// PEM public key for RSA and EC algorithms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Clock skew tolerance in seconds.
    #[serde(default)]
    pub leeway: u64,
}

impl Default for Auth {
    fn default() -> Self {
        Self {
            cookie_names: Self::default_cookie_names(),
            algorithm: Self::default_algorithm(),
            secret: None,
            base64_secret: false,
            public_key: None,
            leeway: 0,
        }
    }
}

impl Auth {
    fn default_cookie_names() -> Vec<String> {
        vec![
            "next-auth.session-token".to_string(),
            "__Secure-next-auth.session-token".to_string(),
        ]
    }

    fn default_algorithm() -> Algorithm {
        Algorithm::HS256
    }

    fn validate_key_material(&self) -> Result<(), ValidationError> {
        match self.algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                if self.secret.as_deref().map_or(true, str::is_empty) {
                    return Err(ValidationError::new("secret_required"));
                }
            }
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::ES256
            | Algorithm::ES384 => {
                if self.public_key.is_none() {
                    return Err(ValidationError::new("public_key_required"));
                }
            }
            _ => return Err(ValidationError::new("unsupported_algorithm")),
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Log {
    pub path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prometheus {
    pub address: SocketAddr,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Status {
    pub address: SocketAddr,
}
