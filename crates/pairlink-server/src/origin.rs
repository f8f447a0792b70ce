//! Base URL inference for pairing links.

use axum::http::header::{HOST, ORIGIN};
use axum::http::HeaderMap;

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORWARDED_HOST: &str = "x-forwarded-host";

fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Origin of an HTTP request: scheme from `X-Forwarded-Proto` (default
/// `http`), host from `X-Forwarded-Host` or `Host`. Falls back to the
/// `Origin` header, then to an empty origin (relative URL).
pub fn request_origin(headers: &HeaderMap) -> String {
    let host = first_value(headers, FORWARDED_HOST).or_else(|| first_value(headers, HOST.as_str()));
    match host {
        Some(host) => {
            let scheme = first_value(headers, FORWARDED_PROTO).unwrap_or("http");
            format!("{scheme}://{host}")
        }
        None => header_origin(headers).unwrap_or_default(),
    }
}

/// Origin of a realtime handshake: the `Origin` header the browser sent,
/// else the same inference as an HTTP request.
pub fn handshake_origin(headers: &HeaderMap) -> String {
    header_origin(headers).unwrap_or_else(|| request_origin(headers))
}

fn header_origin(headers: &HeaderMap) -> Option<String> {
    first_value(headers, ORIGIN.as_str())
        .filter(|o| *o != "null")
        .map(|o| o.trim_end_matches('/').to_owned())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            let _ = map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn host_defaults_to_http() {
        let h = headers(&[("host", "localhost:3000")]);
        assert_eq!(request_origin(&h), "http://localhost:3000");
    }

    #[test]
    fn forwarded_headers_win() {
        let h = headers(&[
            ("host", "10.0.0.5:3000"),
            ("x-forwarded-proto", "https, http"),
            ("x-forwarded-host", "a.example"),
        ]);
        assert_eq!(request_origin(&h), "https://a.example");
    }

    #[test]
    fn no_host_uses_origin_then_empty() {
        let h = headers(&[("origin", "https://b.example/")]);
        assert_eq!(request_origin(&h), "https://b.example");
        assert_eq!(request_origin(&HeaderMap::new()), "");
    }

    #[test]
    fn handshake_prefers_origin_header() {
        let h = headers(&[("host", "internal:3000"), ("origin", "https://c.example")]);
        assert_eq!(handshake_origin(&h), "https://c.example");
    }

    #[test]
    fn handshake_ignores_null_origin() {
        let h = headers(&[("host", "internal:3000"), ("origin", "null")]);
        assert_eq!(handshake_origin(&h), "http://internal:3000");
    }
}
