//! HTTP/1.1 request head parsing using the [`httparse`] crate.
//!
//! Only the request line and headers are parsed here; the body is read off
//! the connection separately by [`super::body::read_body`] and attached with
//! [`Request::set_body`].

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request head.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// Query parameters: each key maps to every value it was given, in order.
pub type QueryParams = HashMap<String, Vec<String>>;

/// A parsed HTTP/1.1 request.
///
/// Created by [`Request::parse`] from the raw head bytes. The body starts
/// empty and is filled in once the transport has read it.
///
/// # Examples
///
/// ```
/// use pathserve::http::request::Request;
///
/// let raw = b"GET /hello?name=world&name=rust HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.target(), "/hello?name=world&name=rust");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_values("name"), Some(&["world".to_owned(), "rust".to_owned()][..]));
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    target: String,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    params: QueryParams,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 100;

    /// Parse an HTTP/1.1 request head from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the body begins
    /// in `buf` (i.e. immediately after the `\r\n\r\n` header terminator).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`]: more data is needed to complete the request headers.
    /// - [`RequestError::Parse`]: the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`]: a required field (method, path, version) is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = match raw_req.method {
            Some(m) => m.parse().unwrap_or_else(|never| match never {}),
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?
            .to_owned();

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (target.clone(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let params = query.as_deref().map(parse_query_string).unwrap_or_default();

        Ok((
            Self {
                method,
                target,
                path,
                version,
                headers: header_map,
                query,
                params,
                body: Bytes::new(),
            },
            body_offset,
        ))
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the raw request target exactly as sent, query string included.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the protocol version as it appears on the request line.
    pub fn version_str(&self) -> &'static str {
        match self.version {
            0 => "HTTP/1.0",
            _ => "HTTP/1.1",
        }
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns every decoded query parameter.
    pub fn query_params(&self) -> &QueryParams {
        &self.params
    }

    /// Returns all values given for `key` (case-sensitive), if any.
    pub fn query_values(&self, key: &str) -> Option<&[String]> {
        self.params.get(key).map(Vec::as_slice)
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Attaches the decoded request body.
    pub fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }
}

/// Decodes a URL query string (`key=value&key=other`) with form semantics.
///
/// `+` decodes to a space, percent escapes are decoded, repeated keys keep
/// every value in order and pairs with an empty value are dropped.
fn parse_query_string(query: &str) -> QueryParams {
    let mut params = QueryParams::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        params
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    params
}
