//! Request identification and routing inputs.
//!
//! # Responsibilities
//! - Generate a request ID (UUID v4) for every inbound request
//! - Extract the target domain used for the routing lookup
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - `Host` header wins over the URI authority; HTTP/2 requests only carry
//!   the latter
//! - Domains are compared in canonical form (lower-case, no port, no
//!   trailing dot)

use axum::http::{header, uri::Authority, HeaderMap, HeaderValue, Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::routing::validation::canonical_domain;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Stamps requests that arrive without an `x-request-id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// The request ID for log fields, `"unknown"` if the layer was bypassed.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Canonical domain the request is addressed to, if any.
pub fn target_domain(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let from_header = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .and_then(host_without_port);
    let host = from_header.or_else(|| uri.host().map(str::to_string))?;

    let domain = canonical_domain(&host);
    (!domain.is_empty()).then_some(domain)
}

fn host_without_port(raw: &str) -> Option<String> {
    let authority: Authority = raw.trim().parse().ok()?;
    Some(authority.host().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_host(host: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_str(host).unwrap());
        headers
    }

    #[test]
    fn test_host_header_is_canonicalised() {
        let uri: Uri = "/path?q=1".parse().unwrap();
        for (host, expected) in [
            ("a.test", "a.test"),
            ("A.Test:8080", "a.test"),
            ("a.test.", "a.test"),
            ("a.test.:443", "a.test"),
            ("127.0.0.1:3000", "127.0.0.1"),
            ("[::1]:8080", "[::1]"),
        ] {
            assert_eq!(
                target_domain(&headers_with_host(host), &uri).as_deref(),
                Some(expected),
                "host {host}"
            );
        }
    }

    #[test]
    fn test_uri_authority_used_without_host_header() {
        let uri: Uri = "http://B.test:9000/x".parse().unwrap();
        assert_eq!(target_domain(&HeaderMap::new(), &uri).as_deref(), Some("b.test"));
    }

    #[test]
    fn test_host_header_preferred_over_uri() {
        let uri: Uri = "http://other.test/x".parse().unwrap();
        assert_eq!(
            target_domain(&headers_with_host("a.test"), &uri).as_deref(),
            Some("a.test")
        );
    }

    #[test]
    fn test_missing_host() {
        let uri: Uri = "/only/a/path".parse().unwrap();
        assert_eq!(target_domain(&HeaderMap::new(), &uri), None);
        assert_eq!(target_domain(&headers_with_host(""), &uri), None);
    }

    #[test]
    fn test_request_id_fallback() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), "unknown");
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc"));
        assert_eq!(request_id(&headers), "abc");
    }

    #[test]
    fn test_generated_ids_are_uuids() {
        let request = Request::new(());
        let id = MakeRequestUuidV4.make_request_id(&request).unwrap();
        let text = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(text).is_ok());
    }
}
