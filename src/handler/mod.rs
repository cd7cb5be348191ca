//! Path handlers: the unit of business logic bound to (method, path) pairs.
//!
//! A handler declares its routes and lifecycle options through a
//! [`HandlerConfig`], validated once when it is registered in a
//! [`RouteTable`](crate::router::RouteTable). For each matching request the
//! dispatcher builds a fresh [`Exchange`], loads the handler's template (if
//! any), calls [`PathHandler::handle`], and encodes a text body with the
//! handler's response encoding.
//!
//! ```
//! use pathserve::handler::{Exchange, HandlerConfig, HandlerError, PathHandler};
//! use pathserve::http::Method;
//!
//! struct Hello;
//!
//! impl PathHandler for Hello {
//!     fn config(&self) -> HandlerConfig {
//!         HandlerConfig::new().method(Method::Get).path("/hello")
//!     }
//!
//!     fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
//!         let response = exchange.response_mut();
//!         response.set_header("Content-Type", "text/plain");
//!         response.set_body("Hello world!");
//!         Ok(())
//!     }
//! }
//! ```

use std::path::PathBuf;

use regex::Regex;
use thiserror::Error;

use crate::context::RequestContext;
use crate::encoding::{EncodingError, TextEncoding};
use crate::http::{Method, Response};
use crate::template::{Template, TemplateDecoders, TemplateError};

/// Errors that make a handler impossible to register.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("{handler}: at least one method must be defined")]
    NoMethods { handler: &'static str },

    #[error("{handler}: at least one path must be defined")]
    NoPaths { handler: &'static str },

    #[error("{handler}: unsupported HTTP method {method}")]
    UnsupportedMethod { handler: &'static str, method: Method },

    #[error("{handler}: path {path:?} must begin with '/'")]
    InvalidPath { handler: &'static str, path: String },

    #[error("{handler}: invalid path pattern {pattern:?}: {source}")]
    InvalidRegex {
        handler: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{handler}: {source}")]
    Encoding {
        handler: &'static str,
        #[source]
        source: EncodingError,
    },
}

/// Errors a handler invocation can fail with.
///
/// These are faults, not client errors: the request is abandoned and the
/// connection closed without a response.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("response body: {0}")]
    Encoding(#[from] EncodingError),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

impl HandlerError {
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// A handler's routes and lifecycle options.
///
/// Defaults: HEAD and OPTIONS enabled, `utf8` response encoding, no
/// template, templates unparsed, template encoding equal to the response
/// encoding.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    methods: Vec<Method>,
    paths: Vec<String>,
    regex_paths: Vec<String>,
    disable_head_requests: bool,
    disable_options_requests: bool,
    response_encoding: String,
    template: Option<PathBuf>,
    parse_template: bool,
    template_encoding: Option<String>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            methods: Vec::new(),
            paths: Vec::new(),
            regex_paths: Vec::new(),
            disable_head_requests: false,
            disable_options_requests: false,
            response_encoding: TextEncoding::Utf8.as_str().to_owned(),
            template: None,
            parse_template: false,
            template_encoding: None,
        }
    }
}

impl HandlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    #[must_use]
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods.extend(methods);
        self
    }

    /// Adds an exact path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    #[must_use]
    pub fn paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Adds a regular expression that must match the whole request path.
    #[must_use]
    pub fn regex_path(mut self, pattern: impl Into<String>) -> Self {
        self.regex_paths.push(pattern.into());
        self
    }

    #[must_use]
    pub fn disable_head_requests(mut self) -> Self {
        self.disable_head_requests = true;
        self
    }

    #[must_use]
    pub fn disable_options_requests(mut self) -> Self {
        self.disable_options_requests = true;
        self
    }

    #[must_use]
    pub fn response_encoding(mut self, label: impl Into<String>) -> Self {
        self.response_encoding = label.into();
        self
    }

    /// Loads the file at `path` before every invocation.
    #[must_use]
    pub fn template(mut self, path: impl Into<PathBuf>) -> Self {
        self.template = Some(path.into());
        self
    }

    /// Decode the template by file extension instead of handing over raw bytes.
    #[must_use]
    pub fn parse_template(mut self, parse: bool) -> Self {
        self.parse_template = parse;
        self
    }

    #[must_use]
    pub fn template_encoding(mut self, label: impl Into<String>) -> Self {
        self.template_encoding = Some(label.into());
        self
    }

    /// Checks the configuration and resolves encodings and patterns.
    pub fn validate(self, handler: &'static str) -> Result<HandlerSettings, RegistrationError> {
        if self.methods.is_empty() {
            return Err(RegistrationError::NoMethods { handler });
        }
        if self.paths.is_empty() && self.regex_paths.is_empty() {
            return Err(RegistrationError::NoPaths { handler });
        }
        if let Some(method) = self.methods.iter().find(|m| !m.is_routable()) {
            return Err(RegistrationError::UnsupportedMethod {
                handler,
                method: method.clone(),
            });
        }
        if let Some(path) = self.paths.iter().find(|p| !p.starts_with('/')) {
            return Err(RegistrationError::InvalidPath {
                handler,
                path: path.clone(),
            });
        }

        let regex_paths = unique(self.regex_paths)
            .into_iter()
            .map(|pattern| match Regex::new(&format!("^(?:{pattern})$")) {
                Ok(regex) => Ok((pattern, regex)),
                Err(source) => Err(RegistrationError::InvalidRegex {
                    handler,
                    pattern,
                    source,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let encoding = |label: &str| {
            label
                .parse::<TextEncoding>()
                .map_err(|source| RegistrationError::Encoding { handler, source })
        };
        let response_encoding = encoding(&self.response_encoding)?;
        let template_encoding = match &self.template_encoding {
            Some(label) => encoding(label)?,
            None => response_encoding,
        };

        Ok(HandlerSettings {
            methods: unique(self.methods),
            paths: unique(self.paths),
            regex_paths,
            disable_head_requests: self.disable_head_requests,
            disable_options_requests: self.disable_options_requests,
            response_encoding,
            template: self.template.map(|path| TemplateSource {
                path,
                parse: self.parse_template,
                encoding: template_encoding,
            }),
        })
    }
}

/// Drops repeated entries, keeping the first occurrence of each.
fn unique<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        if !kept.contains(&item) {
            kept.push(item);
        }
    }
    kept
}

/// Where a handler's template comes from and how to read it.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    pub path: PathBuf,
    pub parse: bool,
    pub encoding: TextEncoding,
}

/// A validated [`HandlerConfig`].
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub methods: Vec<Method>,
    pub paths: Vec<String>,
    /// Original pattern text alongside its anchored compiled form.
    pub regex_paths: Vec<(String, Regex)>,
    pub disable_head_requests: bool,
    pub disable_options_requests: bool,
    pub response_encoding: TextEncoding,
    pub template: Option<TemplateSource>,
}

/// Business logic for one or more routes.
///
/// Implementations are shared by every worker, so they hold no per-request
/// state; everything that belongs to one request lives in the [`Exchange`].
pub trait PathHandler: Send + Sync + 'static {
    /// Routes and lifecycle options. Read once, at registration.
    fn config(&self) -> HandlerConfig;

    /// Fills in `exchange.response_mut()` for the current request.
    fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError>;
}

/// Per-dispatch handler state: the request, the response being built, and
/// the pre-loaded template.
pub struct Exchange<'a> {
    request: &'a RequestContext,
    response: Response,
    template: Option<Template>,
}

impl<'a> Exchange<'a> {
    pub fn new(request: &'a RequestContext, response: Response, template: Option<Template>) -> Self {
        Self {
            request,
            response,
            template,
        }
    }

    pub fn request(&self) -> &'a RequestContext {
        self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub fn template(&self) -> Option<&Template> {
        self.template.as_ref()
    }

    pub fn template_mut(&mut self) -> Option<&mut Template> {
        self.template.as_mut()
    }

    pub fn take_template(&mut self) -> Option<Template> {
        self.template.take()
    }

    pub fn into_response(self) -> Response {
        self.response
    }
}

/// A registered handler together with its validated settings.
pub struct BoundHandler {
    name: &'static str,
    settings: HandlerSettings,
    handler: Box<dyn PathHandler>,
}

impl std::fmt::Debug for BoundHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundHandler")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl BoundHandler {
    /// Validates `handler`'s configuration and binds it.
    pub fn new<H: PathHandler>(handler: H) -> Result<Self, RegistrationError> {
        let name = std::any::type_name::<H>();
        let settings = handler.config().validate(name)?;
        Ok(Self {
            name,
            settings,
            handler: Box::new(handler),
        })
    }

    /// Type name of the handler, for logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    /// Runs one request through the handler lifecycle.
    ///
    /// Loads the template, lets the handler work on its own copy of `base`,
    /// then encodes a text body with the response encoding.
    pub fn invoke(
        &self,
        request: &RequestContext,
        base: &Response,
        decoders: &TemplateDecoders,
    ) -> Result<Response, HandlerError> {
        let template = match &self.settings.template {
            Some(source) => Some(decoders.load(&source.path, source.parse, source.encoding)?),
            None => None,
        };

        let mut exchange = Exchange::new(request, base.clone(), template);
        self.handler.handle(&mut exchange)?;

        let mut response = exchange.into_response();
        response.encode_body(self.settings.response_encoding)?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::http::{Body, Request, StatusCode};

    struct Configured(HandlerConfig);

    impl PathHandler for Configured {
        fn config(&self) -> HandlerConfig {
            self.0.clone()
        }

        fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
            let body = match exchange.take_template() {
                Some(Template::Json(mut value)) => {
                    value["seen"] = serde_json::Value::Bool(true);
                    value.to_string()
                }
                Some(Template::Bytes(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                Some(_) => return Err(HandlerError::custom("unexpected template")),
                None => "naïve".to_owned(),
            };
            exchange.response_mut().set_body(body);
            Ok(())
        }
    }

    fn ctx() -> RequestContext {
        let (request, _) = Request::parse(b"GET /t HTTP/1.1\r\n\r\n").unwrap();
        RequestContext::new(request, "127.0.0.1:1".parse().unwrap(), false)
    }

    fn bind(config: HandlerConfig) -> Result<BoundHandler, RegistrationError> {
        BoundHandler::new(Configured(config))
    }

    #[test]
    fn requires_method_and_path() {
        assert!(matches!(
            bind(HandlerConfig::new().path("/a")),
            Err(RegistrationError::NoMethods { .. })
        ));
        assert!(matches!(
            bind(HandlerConfig::new().method(Method::Get)),
            Err(RegistrationError::NoPaths { .. })
        ));
        assert!(bind(HandlerConfig::new().method(Method::Get).regex_path("/a.*")).is_ok());
    }

    #[test]
    fn repeated_methods_and_paths_bind_once() {
        let bound = bind(
            HandlerConfig::new()
                .methods([Method::Get, Method::Post, Method::Get])
                .paths(["/a", "/b", "/a"])
                .regex_path("/c.*")
                .regex_path("/c.*"),
        )
        .unwrap();
        let settings = bound.settings();
        assert_eq!(settings.methods, [Method::Get, Method::Post]);
        assert_eq!(settings.paths, ["/a", "/b"]);
        assert_eq!(settings.regex_paths.len(), 1);
    }

    #[test]
    fn rejects_unroutable_methods() {
        for method in [Method::Head, Method::Options, Method::Trace, Method::Custom("BREW".into())] {
            let err = bind(HandlerConfig::new().method(method).path("/a")).unwrap_err();
            assert!(matches!(err, RegistrationError::UnsupportedMethod { .. }));
        }
    }

    #[test]
    fn rejects_bad_paths_and_patterns() {
        assert!(matches!(
            bind(HandlerConfig::new().method(Method::Get).path("relative")),
            Err(RegistrationError::InvalidPath { .. })
        ));
        assert!(matches!(
            bind(HandlerConfig::new().method(Method::Get).regex_path("/(unclosed")),
            Err(RegistrationError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn rejects_unknown_encodings() {
        let config = HandlerConfig::new().method(Method::Get).path("/a");
        assert!(matches!(
            bind(config.clone().response_encoding("utf-9")),
            Err(RegistrationError::Encoding { .. })
        ));
        assert!(matches!(
            bind(config.template_encoding("utf-9")),
            Err(RegistrationError::Encoding { .. })
        ));
    }

    #[test]
    fn template_encoding_defaults_to_response_encoding() {
        let bound = bind(
            HandlerConfig::new()
                .method(Method::Get)
                .path("/a")
                .response_encoding("latin1")
                .template("t.json"),
        )
        .unwrap();
        let source = bound.settings().template.as_ref().unwrap();
        assert_eq!(source.encoding, TextEncoding::Latin1);
        assert!(!source.parse);
    }

    #[test]
    fn regex_paths_are_anchored() {
        let bound = bind(HandlerConfig::new().method(Method::Get).regex_path(r"/items/\d+")).unwrap();
        let (_, regex) = &bound.settings().regex_paths[0];
        assert!(regex.is_match("/items/42"));
        assert!(!regex.is_match("/items/42/extra"));
        assert!(!regex.is_match("/v1/items/42"));
    }

    #[test]
    fn invoke_clones_base_and_encodes_text() {
        let bound = bind(HandlerConfig::new().method(Method::Get).path("/t").response_encoding("latin1")).unwrap();
        let mut base = Response::new(StatusCode::Ok);
        base.set_header("X-Base", "1");

        let response = bound.invoke(&ctx(), &base, &TemplateDecoders::default()).unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.header("X-Base"), Some("1"));
        assert_eq!(response.body(), &Body::Bytes(b"na\xefve".to_vec()));
        assert!(base.body().is_empty());
    }

    #[test]
    fn unencodable_text_is_a_fault() {
        let bound = bind(HandlerConfig::new().method(Method::Get).path("/t").response_encoding("ascii")).unwrap();
        let err = bound
            .invoke(&ctx(), &Response::new(StatusCode::Ok), &TemplateDecoders::default())
            .unwrap_err();
        assert!(matches!(err, HandlerError::Encoding(_)));
    }

    #[test]
    fn parsed_template_reaches_handler() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.json");
        std::fs::write(&path, br#"{"a": 1}"#).unwrap();

        let bound = bind(
            HandlerConfig::new()
                .method(Method::Get)
                .path("/t")
                .template(&path)
                .parse_template(true),
        )
        .unwrap();
        let response = bound
            .invoke(&ctx(), &Response::new(StatusCode::Ok), &TemplateDecoders::default())
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(response.body().as_bytes()).unwrap();
        assert_eq!(body["a"], 1);
        assert_eq!(body["seen"], true);
    }

    #[test]
    fn raw_template_reaches_handler() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.json");
        std::fs::write(&path, b"raw {").unwrap();

        let bound = bind(HandlerConfig::new().method(Method::Get).path("/t").template(&path)).unwrap();
        let response = bound
            .invoke(&ctx(), &Response::new(StatusCode::Ok), &TemplateDecoders::default())
            .unwrap();
        assert_eq!(response.body().as_bytes(), b"raw {");
    }

    #[test]
    fn missing_template_is_a_fault() {
        let bound = bind(
            HandlerConfig::new()
                .method(Method::Get)
                .path("/t")
                .template("/nonexistent/template.bin"),
        )
        .unwrap();
        let err = bound
            .invoke(&ctx(), &Response::new(StatusCode::Ok), &TemplateDecoders::default())
            .unwrap_err();
        assert!(matches!(err, HandlerError::Template(TemplateError::Read { .. })));
    }
}
