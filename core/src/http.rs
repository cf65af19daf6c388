//! HTTP exchange types.
//!
//! # Design
//! Requests and responses are plain data so the interpretation logic can be
//! exercised without a socket. `Transport` implementations turn an
//! `HttpRequest` into an `HttpResponse`; the dispatcher only ever sees these
//! values. Bodies are `Vec<u8>` because the decision service may answer with
//! arbitrary binary payloads that must reach the packet untouched.

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// An outbound POST described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A received response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// True when the content type names `application/octet-stream`, ignoring
/// parameters and case.
pub fn is_octet_stream(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case(CONTENT_TYPE_OCTET_STREAM))
        .unwrap_or(false)
}
