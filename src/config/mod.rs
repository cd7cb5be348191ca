//! Process-wide configuration: default response headers, the server banner,
//! and the listener settings derived from the command line.
//!
//! Both values are built once at startup and handed to the dispatcher and
//! server; nothing here is mutated while requests are being served.

use std::path::PathBuf;

use indexmap::IndexMap;
use thiserror::Error;

/// Banner sent in the `Server` header unless replaced or disabled.
pub const DEFAULT_BANNER: &str = concat!("pathserve/", env!("CARGO_PKG_VERSION"));

/// Characters a default header name may not contain.
const FORBIDDEN_NAME_CHARS: [char; 7] = [' ', ':', '\r', '\n', '\t', '\x08', '\0'];

/// Errors raised while building configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("header name {name:?} contains invalid character {ch:?}")]
    InvalidHeaderName { name: String, ch: char },
}

/// Default response headers and the server banner.
///
/// Every response starts from a copy of these headers. The banner drives
/// the `Server` header; `None` omits that header entirely.
///
/// # Examples
///
/// ```
/// use pathserve::config::Defaults;
///
/// let defaults = Defaults::new()
///     .with_headers([("Connection", "close"), ("X-Note", "line\r\nbreak")])
///     .unwrap();
/// assert_eq!(defaults.headers()["X-Note"], "line  break");
/// assert!(Defaults::new().with_headers([("Bad Name", "x")]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    headers: IndexMap<String, String>,
    banner: Option<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self::new()
    }
}

impl Defaults {
    /// No default headers, the stock banner.
    pub fn new() -> Self {
        Self {
            headers: IndexMap::new(),
            banner: Some(DEFAULT_BANNER.to_owned()),
        }
    }

    /// Replaces the default header set.
    ///
    /// Names containing a space, `:`, tab, backspace, NUL, CR or LF are
    /// rejected; CR and LF inside values are replaced with spaces.
    pub fn set_headers<I, K, V>(&mut self, headers: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut validated = IndexMap::new();
        for (name, value) in headers {
            let name = name.into();
            if let Some(ch) = name.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
                return Err(ConfigError::InvalidHeaderName { name, ch });
            }
            let value = value.into().replace(['\r', '\n'], " ");
            validated.insert(name, value);
        }
        self.headers = validated;
        Ok(())
    }

    /// Builder form of [`set_headers`](Self::set_headers).
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.set_headers(headers)?;
        Ok(self)
    }

    /// Sets the `Server` banner.
    #[must_use]
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into().replace(['\r', '\n'], " "));
        self
    }

    /// Disables the `Server` header.
    #[must_use]
    pub fn without_banner(mut self) -> Self {
        self.banner = None;
        self
    }

    pub fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }
}

/// Certificate chain and private key, both PEM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Serve HTTPS when set, plaintext otherwise.
    pub tls: Option<TlsFiles>,
}

impl ServerConfig {
    /// Plaintext on all interfaces.
    pub fn new(port: u16) -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port,
            tls: None,
        }
    }

    #[must_use]
    pub fn with_tls(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.tls = Some(TlsFiles {
            cert: cert.into(),
            key: key.into(),
        });
        self
    }

    /// `host:port`, resolved by the listener when binding.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_forbidden_name_char_rejected() {
        for ch in FORBIDDEN_NAME_CHARS {
            let name = format!("X{ch}Header");
            let err = Defaults::new().with_headers([(name.clone(), "v")]).unwrap_err();
            assert_eq!(err, ConfigError::InvalidHeaderName { name, ch });
        }
    }

    #[test]
    fn rejected_set_keeps_previous_headers() {
        let mut defaults = Defaults::new().with_headers([("X-One", "1")]).unwrap();
        assert!(defaults.set_headers([("X Two", "2")]).is_err());
        assert_eq!(defaults.headers().len(), 1);
        assert_eq!(defaults.headers()["X-One"], "1");
    }

    #[test]
    fn header_order_preserved() {
        let defaults = Defaults::new()
            .with_headers([("B", "2"), ("A", "1"), ("C", "3")])
            .unwrap();
        let names: Vec<_> = defaults.headers().keys().map(String::as_str).collect();
        assert_eq!(names, ["B", "A", "C"]);
    }

    #[test]
    fn banner_can_be_disabled() {
        assert_eq!(Defaults::new().banner(), Some(DEFAULT_BANNER));
        assert_eq!(Defaults::new().with_banner("Example").banner(), Some("Example"));
        assert_eq!(Defaults::new().without_banner().banner(), None);
    }

    #[test]
    fn listen_address() {
        let config = ServerConfig::new(8443).with_tls("cert.pem", "key.pem");
        assert_eq!(config.address(), "0.0.0.0:8443");
        assert_eq!(config.tls.unwrap().key, PathBuf::from("key.pem"));
    }
}
