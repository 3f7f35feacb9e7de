use http::HeaderName;
use once_cell::sync::Lazy;
use pingora_http::RequestHeader;
use uuid::Uuid;

pub static HTTP_HEADER_X_REQUEST_ID: Lazy<HeaderName> =
    Lazy::new(|| HeaderName::from_static("x-request-id"));

/// Retrieves the value of a specific header from the request.
///
/// Returns `None` if the header is not present or its value is not valid UTF-8.
pub fn get_req_header_value<'a>(req_header: &'a RequestHeader, key: &str) -> Option<&'a str> {
    req_header
        .headers
        .get(key)
        .and_then(|value| value.to_str().ok())
}

/// Retrieves the value of a specific cookie from the `Cookie` header(s).
///
/// Browsers send a single `Cookie` header, but HTTP/2 clients may split it,
/// so every `Cookie` header is searched. Returns the first occurrence.
pub fn get_cookie_value<'a>(req_header: &'a RequestHeader, cookie_name: &str) -> Option<&'a str> {
    let found = req_header
        .headers
        .get_all(http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|item| {
            let (k, v) = item.trim().split_once('=')?;
            (k.trim() == cookie_name).then(|| v.trim())
        });

    if found.is_none() {
        log::debug!("Cookie '{cookie_name}' not found");
    }

    found
}

/// Raw query string of the request, exactly as received.
pub fn get_query_string(req_header: &RequestHeader) -> &str {
    req_header.uri.query().unwrap_or_default()
}

/// Request id carried by the client, or a fresh UUID v4.
pub fn request_id(req_header: &RequestHeader) -> String {
    get_req_header_value(req_header, HTTP_HEADER_X_REQUEST_ID.as_str())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_request(path: &str, headers: &[(&str, &str)]) -> RequestHeader {
        let mut req = RequestHeader::build("GET", path.as_bytes(), None).unwrap();
        for (name, value) in headers {
            req.append_header(name.to_string(), *value).unwrap();
        }
        req
    }

    #[test]
    fn test_get_cookie_value() {
        let req = build_request(
            "/",
            &[("Cookie", "theme=dark; next-auth.session-token=abc.def.ghi ;other=1")],
        );
        assert_eq!(
            get_cookie_value(&req, "next-auth.session-token"),
            Some("abc.def.ghi")
        );
        assert_eq!(get_cookie_value(&req, "theme"), Some("dark"));
        assert_eq!(get_cookie_value(&req, "missing"), None);
    }

    #[test]
    fn test_get_cookie_value_split_headers() {
        let req = build_request("/", &[("Cookie", "a=1"), ("Cookie", "b=2")]);
        assert_eq!(get_cookie_value(&req, "b"), Some("2"));
    }

    #[test]
    fn test_get_query_string_preserved() {
        let req = build_request("/x?b=2&a=1&name=J%C3%BCrgen&flag", &[]);
        assert_eq!(get_query_string(&req), "b=2&a=1&name=J%C3%BCrgen&flag");

        let req = build_request("/x", &[]);
        assert_eq!(get_query_string(&req), "");
    }

    #[test]
    fn test_request_id() {
        let req = build_request("/", &[("X-Request-Id", "req-1")]);
        assert_eq!(request_id(&req), "req-1");

        let generated = request_id(&build_request("/", &[]));
        assert!(Uuid::parse_str(&generated).is_ok());
    }
}
