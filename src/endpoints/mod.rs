//! Example endpoints served by the `pathserve` binary.
//!
//! Each one shows a different part of the handler API:
//!
//! | Handler          | Route                              | Shows                              |
//! |------------------|------------------------------------|------------------------------------|
//! | [`HelloWorld`]   | `GET /example01`                   | headers and a static body          |
//! | [`Echo`]         | `POST`/`PUT /example2`, `/example02` | reading the request body         |
//! | [`RequestInfo`]  | `GET /example03`                   | request context, custom status     |
//! | [`LogoImage`]    | `GET /example04`                   | raw file template                  |
//! | [`TimestampedJson`] | `GET /example05`                | parsed template                    |
//! | [`HelloHeadOptionsDisabled`] | `GET /example06`                   | disabling HEAD and OPTIONS         |

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{ConfigError, Defaults};
use crate::context::KeyMatch;
use crate::handler::{Exchange, HandlerConfig, HandlerError, PathHandler, RegistrationError};
use crate::http::{Method, StatusCode};
use crate::router::RouteTable;
use crate::template::Template;

/// Banner sent by the example server in place of the library default.
pub const BANNER: &str = concat!("pathserve-examples/", env!("CARGO_PKG_VERSION"));

/// Header added to every response by [`defaults`].
pub const DEFAULT_HEADER: &str = "X-Example-Default-Header";

/// Request header echoed back by [`RequestInfo`].
pub const INFO_HEADER: &str = "X-Example";

/// Query parameter echoed back by [`RequestInfo`].
pub const INFO_QUERY_KEY: &str = "example";

/// Default response headers and banner used by the binary.
pub fn defaults() -> Result<Defaults, ConfigError> {
    Defaults::new()
        .with_banner(BANNER)
        .with_headers([(DEFAULT_HEADER, "pathserve"), ("Connection", "close")])
}

/// Registers every example endpoint. Template files are looked up in `assets`.
pub fn register_all(routes: &mut RouteTable, assets: &Path) -> Result<(), RegistrationError> {
    routes.register(HelloWorld)?;
    routes.register(Echo)?;
    routes.register(RequestInfo)?;
    routes.register(LogoImage::new(assets.join("logo.png")))?;
    routes.register(TimestampedJson::new(assets.join("template.json")))?;
    routes.register(HelloHeadOptionsDisabled)?;
    Ok(())
}

/// `GET /example01`: plain-text greeting.
pub struct HelloWorld;

impl PathHandler for HelloWorld {
    fn config(&self) -> HandlerConfig {
        HandlerConfig::new().method(Method::Get).path("/example01")
    }

    fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
        hello(exchange);
        Ok(())
    }
}

/// Echoes the request body back as `application/octet-stream`.
pub struct Echo;

impl PathHandler for Echo {
    fn config(&self) -> HandlerConfig {
        HandlerConfig::new()
            .methods([Method::Post, Method::Put])
            .paths(["/example2", "/example02"])
    }

    fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
        let body = exchange.request().body().clone();
        let response = exchange.response_mut();
        response.set_header("Content-Type", "application/octet-stream");
        response.set_body(body);
        Ok(())
    }
}

/// Reports what the server knows about the request, as JSON with status `202`.
pub struct RequestInfo;

#[derive(Debug, Serialize)]
struct RequestSummary<'a> {
    tls: bool,
    client_ip_addr: String,
    client_port: u16,
    http_method: &'a str,
    http_ver: &'a str,
    path: &'a str,
    custom_header: &'a str,
    custom_query_param: &'a str,
}

impl PathHandler for RequestInfo {
    fn config(&self) -> HandlerConfig {
        HandlerConfig::new().method(Method::Get).path("/example03")
    }

    fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
        let request = exchange.request();
        let summary = RequestSummary {
            tls: request.tls(),
            client_ip_addr: request.client_ip().to_string(),
            client_port: request.client_port(),
            http_method: request.method().as_str(),
            http_ver: request.http_version(),
            path: request.raw_path(),
            custom_header: request.header(INFO_HEADER, ""),
            custom_query_param: request.query_param(INFO_QUERY_KEY, "", KeyMatch::CaseSensitive),
        };
        let body = serde_json::to_string(&summary)?;

        let response = exchange.response_mut();
        response.set_header("Content-Type", "application/json");
        response.set_status(StatusCode::Accepted);
        response.set_body(body);
        Ok(())
    }
}

/// Serves a PNG file loaded as a raw template.
pub struct LogoImage {
    template: PathBuf,
}

impl LogoImage {
    pub fn new(template: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl PathHandler for LogoImage {
    fn config(&self) -> HandlerConfig {
        HandlerConfig::new()
            .method(Method::Get)
            .path("/example04")
            .template(&self.template)
    }

    fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
        let image = exchange
            .take_template()
            .and_then(Template::into_bytes)
            .ok_or_else(|| HandlerError::custom("image template not loaded"))?;
        let response = exchange.response_mut();
        response.set_header("Content-Type", "image/png");
        response.set_body(image);
        Ok(())
    }
}

/// Serves a parsed JSON template with a `timestamp` field (Unix milliseconds) added.
pub struct TimestampedJson {
    template: PathBuf,
}

impl TimestampedJson {
    pub fn new(template: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl PathHandler for TimestampedJson {
    fn config(&self) -> HandlerConfig {
        HandlerConfig::new()
            .method(Method::Get)
            .path("/example05")
            .template(&self.template)
            .parse_template(true)
            .template_encoding("utf8")
    }

    fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
        let Some(Template::Json(serde_json::Value::Object(mut fields))) = exchange.take_template() else {
            return Err(HandlerError::custom("template is not a JSON object"));
        };
        fields.insert(
            "timestamp".to_owned(),
            chrono::Utc::now().timestamp_millis().into(),
        );
        let body = serde_json::to_string(&fields)?;

        let response = exchange.response_mut();
        response.set_header("Content-Type", "application/json");
        response.set_body(body);
        Ok(())
    }
}

/// Same as [`HelloWorld`] on `/example06`, with HEAD and OPTIONS refused.
pub struct HelloHeadOptionsDisabled;

impl PathHandler for HelloHeadOptionsDisabled {
    fn config(&self) -> HandlerConfig {
        HandlerConfig::new()
            .method(Method::Get)
            .path("/example06")
            .disable_head_requests()
            .disable_options_requests()
    }

    fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
        hello(exchange);
        Ok(())
    }
}

fn hello(exchange: &mut Exchange<'_>) {
    let response = exchange.response_mut();
    response.set_header("Content-Type", "text/plain");
    response.set_body(b"Hello world!");
}
