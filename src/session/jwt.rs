use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use pingora_error::{ErrorType::ReadError, OrErr, Result};
use pingora_http::RequestHeader;
use serde::Deserialize;

use crate::{config, utils::request};

use super::{Session, SessionProvider, User};

/// Claims of a session token. Everything except the user record is optional.
#[derive(Debug, Deserialize)]
struct Claims {
    user: Option<ClaimsUser>,
    exp: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimsUser {
    api_key: Option<String>,
    id: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

/// Session provider backed by a signed JWT session cookie.
///
/// Tokens are looked up in the configured cookies in order; the first cookie
/// present wins. Any token that fails verification resolves to no session.
pub struct JwtSessionProvider {
    cookie_names: Vec<String>,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtSessionProvider {
    pub fn from_config(cfg: &config::Auth) -> Result<Self> {
        let decoding_key = decoding_key(cfg).or_err_with(ReadError, || {
            format!("Invalid session key for algorithm {:?}", cfg.algorithm)
        })?;

        // Pre-create validation object, it is the same for every request
        let mut validation = Validation::new(cfg.algorithm);
        validation.leeway = cfg.leeway;

        Ok(Self {
            cookie_names: cfg.cookie_names.clone(),
            decoding_key,
            validation,
        })
    }

    fn extract_token<'a>(&self, req_header: &'a RequestHeader) -> Option<&'a str> {
        self.cookie_names
            .iter()
            .find_map(|name| request::get_cookie_value(req_header, name))
            .filter(|token| !token.is_empty())
    }

    fn verify(&self, token: &str) -> Option<Session> {
        let token_data = match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => data,
            Err(e) => {
                let reason = match e.kind() {
                    ErrorKind::InvalidToken => "invalid token format",
                    ErrorKind::InvalidSignature => "invalid signature",
                    ErrorKind::ExpiredSignature => "token expired",
                    ErrorKind::ImmatureSignature => "token not yet valid",
                    ErrorKind::InvalidAlgorithm => "algorithm mismatch",
                    ErrorKind::MissingRequiredClaim(_) => "missing required claim",
                    _ => "invalid token",
                };
                log::debug!("Rejecting session token: {reason}");
                return None;
            }
        };

        let claims = token_data.claims;
        let Some(user) = claims.user else {
            log::warn!("Session token has no user record");
            return None;
        };
        let Some(api_key) = user.api_key.filter(|key| !key.is_empty()) else {
            log::warn!("Session user has no api key");
            return None;
        };

        Some(Session {
            user: User {
                api_key,
                id: user.id,
                name: user.name,
                email: user.email,
            },
            expires: claims.exp,
        })
    }
}

#[async_trait]
impl SessionProvider for JwtSessionProvider {
    async fn current_session(&self, req_header: &RequestHeader) -> Result<Option<Session>> {
        match self.extract_token(req_header) {
            Some(token) => Ok(self.verify(token)),
            None => {
                log::debug!("No session cookie present");
                Ok(None)
            }
        }
    }
}

fn decoding_key(cfg: &config::Auth) -> std::result::Result<DecodingKey, &'static str> {
    match cfg.algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            let secret = cfg.secret.as_ref().ok_or("missing secret")?;
            let key: Vec<u8> = if cfg.base64_secret {
                general_purpose::STANDARD
                    .decode(secret)
                    .map_err(|_| "invalid base64")?
            } else {
                secret.as_bytes().to_vec()
            };
            Ok(DecodingKey::from_secret(&key))
        }
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
            let public_key = cfg.public_key.as_ref().ok_or("missing public_key")?;
            DecodingKey::from_rsa_pem(public_key.as_bytes()).map_err(|_| "bad pem")
        }
        Algorithm::ES256 | Algorithm::ES384 => {
            let public_key = cfg.public_key.as_ref().ok_or("missing public_key")?;
            DecodingKey::from_ec_pem(public_key.as_bytes()).map_err(|_| "bad pem")
        }
        _ => Err("unsupported algorithm"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};

    use super::*;

    const SECRET: &str = "test-session-secret";

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn auth_config() -> config::Auth {
        serde_yaml::from_str(&format!("secret: {SECRET}")).unwrap()
    }

    fn sign(claims: &Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn request_with_cookie(cookie: &str) -> RequestHeader {
        let mut req = RequestHeader::build("GET", b"/", None).unwrap();
        req.insert_header("Cookie", cookie).unwrap();
        req
    }

    #[tokio::test]
    async fn test_valid_session() {
        let provider = JwtSessionProvider::from_config(&auth_config()).unwrap();
        let exp = now() + 3600;
        let token = sign(
            &json!({"user": {"apiKey": "abc123", "email": "ada@example.com"}, "exp": exp}),
            SECRET,
        );
        let req = request_with_cookie(&format!("next-auth.session-token={token}"));

        let session = provider.current_session(&req).await.unwrap().unwrap();
        assert_eq!(session.user.api_key, "abc123");
        assert_eq!(session.user.email.as_deref(), Some("ada@example.com"));
        assert_eq!(session.expires, Some(exp));
    }

    #[tokio::test]
    async fn test_secure_cookie_name() {
        let provider = JwtSessionProvider::from_config(&auth_config()).unwrap();
        let token = sign(&json!({"user": {"apiKey": "k"}, "exp": now() + 60}), SECRET);
        let req = request_with_cookie(&format!("__Secure-next-auth.session-token={token}"));

        let session = provider.current_session(&req).await.unwrap();
        assert_eq!(session.map(|s| s.user.api_key), Some("k".to_string()));
    }

    #[tokio::test]
    async fn test_missing_cookie() {
        let provider = JwtSessionProvider::from_config(&auth_config()).unwrap();
        let req = RequestHeader::build("GET", b"/", None).unwrap();
        assert!(provider.current_session(&req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_tokens() {
        let provider = JwtSessionProvider::from_config(&auth_config()).unwrap();

        let forged = sign(&json!({"user": {"apiKey": "k"}, "exp": now() + 60}), "other");
        let expired = sign(&json!({"user": {"apiKey": "k"}, "exp": now() - 3600}), SECRET);
        let no_user = sign(&json!({"exp": now() + 60}), SECRET);
        let no_key = sign(&json!({"user": {"name": "ada"}, "exp": now() + 60}), SECRET);
        let no_exp = sign(&json!({"user": {"apiKey": "k"}}), SECRET);

        for token in [forged, expired, no_user, no_key, no_exp, "garbage".to_string()] {
            let req = request_with_cookie(&format!("next-auth.session-token={token}"));
            assert!(
                provider.current_session(&req).await.unwrap().is_none(),
                "token should be rejected: {token}"
            );
        }
    }

    #[test]
    fn test_base64_secret() {
        let mut cfg = auth_config();
        cfg.secret = Some(general_purpose::STANDARD.encode(SECRET));
        cfg.base64_secret = true;
        let provider = JwtSessionProvider::from_config(&cfg).unwrap();

        let token = sign(&json!({"user": {"apiKey": "k"}, "exp": now() + 60}), SECRET);
        assert!(provider.verify(&token).is_some());
    }

    #[test]
    fn test_invalid_key_config() {
        let mut cfg = auth_config();
        cfg.base64_secret = true;
        cfg.secret = Some("***not base64***".to_string());
        assert!(JwtSessionProvider::from_config(&cfg).is_err());

        let mut cfg = auth_config();
        cfg.algorithm = Algorithm::RS256;
        assert!(JwtSessionProvider::from_config(&cfg).is_err());
    }
}
