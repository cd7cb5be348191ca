//! The response container handed to handlers, and its HTTP/1.1 wire form.
//!
//! Handlers mutate a [`Response`] freely; the transport serializes it with
//! [`Response::serialize`] once the handler has returned.

use bytes::{BufMut, BytesMut};
use indexmap::IndexMap;

use super::{Method, StatusCode, reason_phrase};
use crate::config::Defaults;
use crate::encoding::{EncodingError, TextEncoding};

/// Response payload. Text is encoded with the handler's response encoding
/// before the response leaves the handler lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Bytes(Vec<u8>),
    Text(String),
}

impl Body {
    pub fn len(&self) -> usize {
        match self {
            Self::Bytes(b) => b.len(),
            Self::Text(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Bytes(b) => b,
            Self::Text(t) => t.as_bytes(),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::Bytes(Vec::new())
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Body {
    fn from(bytes: &[u8; N]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<bytes::Bytes> for Body {
    fn from(bytes: bytes::Bytes) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

/// A mutable HTTP response: status code, ordered headers, body.
///
/// Header names are case-sensitive keys; setting an existing key replaces its
/// value in place. `Clone` is a deep copy, which is how every dispatch gets
/// its own starting response.
///
/// # Examples
///
/// ```
/// use pathserve::config::Defaults;
/// use pathserve::http::{Method, Response, StatusCode};
///
/// let defaults = Defaults::new().without_banner();
/// let mut response = Response::from_defaults(StatusCode::Ok, &defaults);
/// response.set_header("Content-Type", "text/plain");
/// response.set_body("Hello");
///
/// let bytes = response.serialize(&Method::Get, defaults.banner());
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 5\r\n"));
/// assert!(text.ends_with("\r\n\r\nHello"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    headers: IndexMap<String, String>,
    body: Body,
}

impl Default for Response {
    /// A `404` with no headers and an empty body.
    fn default() -> Self {
        Self {
            status: StatusCode::NotFound.as_u16(),
            headers: IndexMap::new(),
            body: Body::default(),
        }
    }
}

impl Response {
    /// Creates a response with the given status, no headers and an empty body.
    pub fn new(status: impl Into<u16>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    /// Creates a response pre-populated with a copy of the default headers.
    pub fn from_defaults(status: impl Into<u16>, defaults: &Defaults) -> Self {
        Self {
            status: status.into(),
            headers: defaults.headers().clone(),
            body: Body::default(),
        }
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: impl Into<u16>) {
        self.status = status.into();
    }

    pub fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut IndexMap<String, String> {
        &mut self.headers
    }

    /// Returns the value stored under exactly `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Sets a header, replacing any value stored under the same name.
    ///
    /// CR and LF in the value are replaced with spaces.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        let value = if value.contains(['\r', '\n']) {
            value.replace(['\r', '\n'], " ")
        } else {
            value
        };
        self.headers.insert(name.into(), value);
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    /// Converts a text body to bytes using `encoding`. Byte bodies are untouched.
    pub fn encode_body(&mut self, encoding: TextEncoding) -> Result<(), EncodingError> {
        if let Body::Text(text) = &self.body {
            self.body = Body::Bytes(encoding.encode(text)?);
        }
        Ok(())
    }

    /// Returns `true` if a `Connection: close` header is set (any case).
    pub fn closes_connection(&self) -> bool {
        self.headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("connection") && v.eq_ignore_ascii_case("close"))
    }

    /// Returns `true` when a client can only find the end of this response
    /// by the connection closing.
    ///
    /// That is the case for an empty body, which goes out without
    /// `Content-Length`, unless the status or the `HEAD` method already rules
    /// out a body.
    pub fn delimited_by_close(&self, method: &Method) -> bool {
        let bodiless_status = (100..200).contains(&self.status) || matches!(self.status, 204 | 304);
        self.body.is_empty() && !bodiless_status && *method != Method::Head
    }

    /// Serializes the response using HTTP/1.1 wire format.
    ///
    /// Order: status line, `Server` (only when `banner` is set), `Date`, the
    /// response headers, the blank line, then the body. `Content-Length` is
    /// set only for a non-empty body. The body itself is never written for
    /// `HEAD` or `OPTIONS` requests.
    pub fn serialize(mut self, method: &Method, banner: Option<&str>) -> BytesMut {
        let content_length = self.body.len();
        if content_length > 0 {
            self.headers
                .insert("Content-Length".to_owned(), content_length.to_string());
        }

        let estimated_size = 128 + self.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        // Status line
        buf.put(format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status)).as_bytes());

        if let Some(banner) = banner {
            buf.put(format!("Server: {banner}\r\n").as_bytes());
        }
        buf.put(format!("Date: {}\r\n", http_date()).as_bytes());

        for (name, value) in &self.headers {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Header/body separator
        buf.put(&b"\r\n"[..]);

        if content_length > 0 && !matches!(method, Method::Head | Method::Options) {
            buf.put(self.body.as_bytes());
        }

        buf
    }
}

/// The current time as an RFC 7231 IMF-fixdate.
fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn default_is_empty_404() {
        let r = Response::default();
        assert_eq!(r.status(), 404);
        assert!(r.headers().is_empty());
        assert!(r.body().is_empty());
    }

    #[test]
    fn simple_ok_response() {
        let mut r = Response::new(StatusCode::Ok);
        r.set_body("Hello");
        let s = to_string(r.serialize(&Method::Get, None));
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn empty_body_has_no_content_length() {
        let r = Response::new(StatusCode::NoContent);
        let s = to_string(r.serialize(&Method::Get, None));
        assert!(!s.contains("Content-Length"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn head_and_options_omit_body() {
        for method in [Method::Head, Method::Options] {
            let mut r = Response::new(StatusCode::Ok);
            r.set_body("payload");
            let s = to_string(r.serialize(&method, None));
            assert!(s.contains("Content-Length: 7\r\n"));
            assert!(s.ends_with("\r\n\r\n"));
            assert!(!s.contains("payload"));
        }
    }

    #[test]
    fn banner_controls_server_header() {
        let s = to_string(Response::new(StatusCode::Ok).serialize(&Method::Get, Some("Test/1.0")));
        let mut lines = s.lines();
        assert_eq!(lines.next(), Some("HTTP/1.1 200 OK"));
        assert_eq!(lines.next(), Some("Server: Test/1.0"));
        assert!(lines.next().unwrap().starts_with("Date: "));

        let s = to_string(Response::new(StatusCode::Ok).serialize(&Method::Get, None));
        assert!(!s.contains("Server:"));
    }

    #[test]
    fn unknown_status_has_empty_reason() {
        let s = to_string(Response::new(299u16).serialize(&Method::Get, None));
        assert!(s.starts_with("HTTP/1.1 299 \r\n"));
    }

    #[test]
    fn defaults_are_copied_and_overridable() {
        let defaults = Defaults::new()
            .with_headers([("Connection", "close"), ("X-Default", "yes")])
            .unwrap();
        let base = Response::from_defaults(StatusCode::Ok, &defaults);
        let mut r = base.clone();
        r.set_header("X-Default", "overridden");
        r.set_header("Content-Type", "text/plain");

        assert_eq!(base.header("X-Default"), Some("yes"));
        assert_eq!(r.header("X-Default"), Some("overridden"));
        let names: Vec<_> = r.headers().keys().map(String::as_str).collect();
        assert_eq!(names, ["Connection", "X-Default", "Content-Type"]);
        assert!(r.closes_connection());
    }

    #[test]
    fn handler_content_length_is_replaced() {
        let mut r = Response::new(StatusCode::Ok);
        r.set_header("Content-Length", "999");
        r.set_body(b"abc");
        let s = to_string(r.serialize(&Method::Get, None));
        assert!(s.contains("Content-Length: 3\r\n"));
        assert!(!s.contains("999"));
    }

    #[test]
    fn empty_bodies_need_close_delimiting() {
        assert!(Response::new(StatusCode::Ok).delimited_by_close(&Method::Get));
        assert!(Response::new(StatusCode::NotFound).delimited_by_close(&Method::Post));
        assert!(Response::new(StatusCode::MethodNotAllowed).delimited_by_close(&Method::Options));

        assert!(!Response::new(StatusCode::Ok).delimited_by_close(&Method::Head));
        assert!(!Response::new(StatusCode::NoContent).delimited_by_close(&Method::Options));
        assert!(!Response::new(304u16).delimited_by_close(&Method::Get));
        assert!(!Response::new(101u16).delimited_by_close(&Method::Get));

        let mut r = Response::new(StatusCode::Ok);
        r.set_body("x");
        assert!(!r.delimited_by_close(&Method::Get));
    }

    #[test]
    fn header_values_cannot_break_lines() {
        let mut r = Response::new(StatusCode::Ok);
        r.set_header("X-Name", "a\r\nSet-Cookie: b");
        assert_eq!(r.header("X-Name"), Some("a  Set-Cookie: b"));
        let s = to_string(r.serialize(&Method::Get, None));
        assert!(!s.contains("\r\nSet-Cookie"));
    }

    #[test]
    fn text_body_encoding() {
        let mut r = Response::new(StatusCode::Ok);
        r.set_body("é");
        r.encode_body(TextEncoding::Latin1).unwrap();
        assert_eq!(r.body(), &Body::Bytes(vec![0xe9]));

        let mut r = Response::new(StatusCode::Ok);
        r.set_body("é");
        assert!(r.encode_body(TextEncoding::Ascii).is_err());
    }
}
