//! HTTP request head handling.
//!
//! [`RequestHeader`] wraps `http::Request<()>` so the normalized header map
//! (names lower-cased by construction, duplicates appended in arrival order)
//! lives next to the raw wire pairs, which keep original casing and
//! duplication for callers that need exact fidelity.

use bytes::Bytes;
use http::header::{HeaderName, PROXY_AUTHENTICATE, SET_COOKIE, WWW_AUTHENTICATE};
use http::{HeaderMap, Method, Request, Uri, Version};

/// One header pair exactly as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    name: String,
    value: Bytes,
}

impl RawHeader {
    pub fn new(name: String, value: Bytes) -> Self {
        Self { name, value }
    }

    /// Header name with its original casing.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// The ordered raw header list of a request, kept in the request extensions so
/// it travels with the `http::Request` handed to the handler.
#[derive(Debug, Clone, Default)]
pub struct RawHeaders(Vec<RawHeader>);

impl RawHeaders {
    pub fn new(pairs: Vec<RawHeader>) -> Self {
        Self(pairs)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawHeader> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A parsed request head: method, target, version and headers, without a body.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
    raw: RawHeaders,
}

impl RequestHeader {
    pub fn new(inner: Request<()>, raw: RawHeaders) -> Self {
        Self { inner, raw }
    }

    /// Attaches a body, converting into a full `Request<T>`. The raw header
    /// list is moved into the request extensions.
    pub fn body<T>(self, body: T) -> Request<T> {
        let mut request = self.inner.map(|_| body);
        request.extensions_mut().insert(self.raw);
        request
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn raw_headers(&self) -> &RawHeaders {
        &self.raw
    }

    /// Merged view of a possibly repeated header, per the field merge policy.
    ///
    /// See [`merged_header_value`].
    pub fn merged_header(&self, name: &HeaderName) -> Option<String> {
        merged_header_value(self.headers(), name)
    }

    /// Whether this request is expected to carry a body at all.
    ///
    /// GET, HEAD, DELETE, OPTIONS and CONNECT are bodyless unless framing
    /// headers say otherwise.
    pub fn need_body(&self) -> bool {
        !matches!(self.method(), &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT)
    }

    /// Keep-alive determination per HTTP/1.x defaults and the Connection header.
    pub fn is_keep_alive(&self) -> bool {
        let connection = self.headers().get(http::header::CONNECTION).and_then(|v| v.to_str().ok());
        match self.version() {
            Version::HTTP_11 => !matches!(connection, Some(v) if v.eq_ignore_ascii_case("close")),
            Version::HTTP_10 => matches!(connection, Some(v) if v.eq_ignore_ascii_case("keep-alive")),
            _ => false,
        }
    }
}

/// Fields whose repeated values must never be comma-joined: joining would
/// change their meaning. They stay list-valued, reachable through
/// `HeaderMap::get_all` or the raw pairs.
fn is_list_only(name: &HeaderName) -> bool {
    name == SET_COOKIE || name == WWW_AUTHENTICATE || name == PROXY_AUTHENTICATE
}

/// Merges repeated values of `name` into one comma-separated string, in
/// arrival order. List-only fields are not joined: the first value is
/// returned as-is. Values that are not valid UTF-8 are skipped.
pub fn merged_header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    if is_list_only(name) {
        return headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);
    }

    let mut merged: Option<String> = None;
    for value in headers.get_all(name) {
        let Ok(value) = value.to_str() else { continue };
        match &mut merged {
            Some(joined) => {
                joined.push_str(", ");
                joined.push_str(value);
            }
            None => merged = Some(value.to_owned()),
        }
    }
    merged
}
