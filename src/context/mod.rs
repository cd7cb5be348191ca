//! Per-request context: the parsed request plus what the connection knows
//! about the client.
//!
//! A [`RequestContext`] is built fresh for every request and dropped once
//! the response has been written.

use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;

use crate::http::request::QueryParams;
use crate::http::{Headers, Method, Request};

/// Whether query keys are compared exactly or ignoring ASCII case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMatch {
    #[default]
    CaseSensitive,
    CaseInsensitive,
}

/// Everything a handler may read about the request being served.
///
/// # Examples
///
/// ```
/// use pathserve::context::{KeyMatch, RequestContext};
/// use pathserve::http::Request;
///
/// let raw = b"GET /info?Lang=en&Lang=fr HTTP/1.1\r\nX-Example: hi\r\n\r\n";
/// let (request, _) = Request::parse(raw).unwrap();
/// let ctx = RequestContext::new(request, "10.0.0.7:51000".parse().unwrap(), false);
///
/// assert_eq!(ctx.client_ip().to_string(), "10.0.0.7");
/// assert_eq!(ctx.header("x-example", ""), "hi");
/// assert_eq!(ctx.query_param("Lang", "", KeyMatch::CaseSensitive), "en");
/// assert_eq!(ctx.query_param("lang", "", KeyMatch::CaseSensitive), "");
/// assert_eq!(ctx.query_param("LANG", "", KeyMatch::CaseInsensitive), "en");
/// assert_eq!(ctx.query_param("missing", "none", KeyMatch::CaseSensitive), "none");
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    request: Request,
    client: SocketAddr,
    tls: bool,
}

impl RequestContext {
    /// Wraps a parsed request with its connection details.
    pub fn new(request: Request, client: SocketAddr, tls: bool) -> Self {
        Self {
            request,
            client,
            tls,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// `true` when the server is speaking HTTPS.
    pub fn tls(&self) -> bool {
        self.tls
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client
    }

    pub fn client_ip(&self) -> IpAddr {
        self.client.ip()
    }

    pub fn client_port(&self) -> u16 {
        self.client.port()
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Protocol version from the request line, e.g. `"HTTP/1.1"`.
    pub fn http_version(&self) -> &'static str {
        self.request.version_str()
    }

    /// The request target as sent, including any query string.
    pub fn raw_path(&self) -> &str {
        self.request.target()
    }

    /// The path used for routing (no query string).
    pub fn path(&self) -> &str {
        self.request.path()
    }

    pub fn headers(&self) -> &Headers {
        self.request.headers()
    }

    /// Case-insensitive header lookup with a fallback.
    pub fn header<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.request.headers().get_or(name, default)
    }

    pub fn query(&self) -> &QueryParams {
        self.request.query_params()
    }

    /// All values given for a query key.
    ///
    /// With [`KeyMatch::CaseInsensitive`] the first key that matches ignoring
    /// ASCII case is used; which one is first is unspecified when several
    /// differently-cased keys are present.
    pub fn query_values(&self, key: &str, matching: KeyMatch) -> Option<&[String]> {
        match matching {
            KeyMatch::CaseSensitive => self.request.query_values(key),
            KeyMatch::CaseInsensitive => {
                let params = self.request.query_params();
                params.get(key).or_else(|| {
                    params
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(key))
                        .map(|(_, v)| v)
                })
                .map(Vec::as_slice)
            }
        }
    }

    /// First value given for a query key, or `default`.
    pub fn query_param<'a>(&'a self, key: &str, default: &'a str, matching: KeyMatch) -> &'a str {
        self.query_values(key, matching)
            .and_then(<[String]>::first)
            .map(String::as_str)
            .unwrap_or(default)
    }

    /// The decoded request body.
    pub fn body(&self) -> &Bytes {
        self.request.body()
    }

    /// The body parsed as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}
