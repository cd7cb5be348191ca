//! Turns a [`RequestContext`] into the [`Response`] that goes on the wire.
//!
//! Routing rules, checked against the request path (query string excluded):
//!
//! - A routable method with a bound handler runs the handler lifecycle.
//! - A routable method bound to the default marker gets an empty `200`.
//! - `HEAD` follows the `GET` binding unless that handler disables `HEAD`.
//! - `OPTIONS` answers `204` with an `Allow` header listing every method the
//!   path is bound under, unless a handler for the path disables `OPTIONS`.
//! - Anything else is `405` if the path is bound under some other method and
//!   `404` if it is not bound at all.
//!
//! Every synthesized response starts from the process-wide default headers.

use thiserror::Error;
use tracing::debug;

use crate::config::Defaults;
use crate::context::RequestContext;
use crate::handler::{BoundHandler, HandlerError};
use crate::http::{Method, Response, StatusCode};
use crate::router::{Lookup, RouteTable, RouteTarget};
use crate::template::TemplateDecoders;

/// A request the dispatcher could not produce a response for.
#[derive(Debug, Error)]
#[error("handler {handler} failed: {source}")]
pub struct DispatchError {
    pub handler: &'static str,
    #[source]
    pub source: HandlerError,
}

/// Read-only routing state shared by every connection.
#[derive(Debug)]
pub struct Dispatcher {
    routes: RouteTable,
    defaults: Defaults,
    decoders: TemplateDecoders,
}

impl Dispatcher {
    pub fn new(routes: RouteTable, defaults: Defaults) -> Self {
        Self {
            routes,
            defaults,
            decoders: TemplateDecoders::default(),
        }
    }

    /// Replaces the template decoder table.
    #[must_use]
    pub fn with_decoders(mut self, decoders: TemplateDecoders) -> Self {
        self.decoders = decoders;
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Server identification string, if enabled.
    pub fn banner(&self) -> Option<&str> {
        self.defaults.banner()
    }

    /// Picks and builds the response for `ctx`.
    ///
    /// # Errors
    ///
    /// Fails only when a handler (or its template) fails. No response should
    /// be sent in that case.
    pub fn dispatch(&self, ctx: &RequestContext) -> Result<Response, DispatchError> {
        let path = ctx.path();
        match ctx.method() {
            Method::Head => self.head(ctx),
            Method::Options => Ok(self.options(path)),
            method => match self.routes.lookup(method, path) {
                Lookup::Handler(handler) => self.invoke(handler, ctx),
                Lookup::Default => Ok(self.status(StatusCode::Ok)),
                Lookup::NotFound => Ok(self.unmatched(path)),
            },
        }
    }

    fn head(&self, ctx: &RequestContext) -> Result<Response, DispatchError> {
        let path = ctx.path();
        match self.routes.lookup(&Method::Get, path) {
            Lookup::Handler(handler) if handler.settings().disable_head_requests => {
                debug!(handler = handler.name(), path, "HEAD disabled");
                Ok(self.status(StatusCode::MethodNotAllowed))
            }
            Lookup::Handler(handler) => self.invoke(handler, ctx),
            Lookup::Default => Ok(self.status(StatusCode::Ok)),
            Lookup::NotFound => Ok(self.unmatched(path)),
        }
    }

    fn options(&self, path: &str) -> Response {
        let allowed = self.routes.allowed_methods(path);
        if allowed.is_empty() {
            return self.status(StatusCode::NotFound);
        }

        let disabled = self.routes.targets(path).any(|target| {
            matches!(target, RouteTarget::Handler(h) if h.settings().disable_options_requests)
        });
        if disabled {
            debug!(path, "OPTIONS disabled");
            return self.status(StatusCode::MethodNotAllowed);
        }

        let allow = allowed
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let mut response = self.status(StatusCode::NoContent);
        response.set_header("Allow", allow);
        response
    }

    fn unmatched(&self, path: &str) -> Response {
        if self.routes.contains_path(path) {
            self.status(StatusCode::MethodNotAllowed)
        } else {
            self.status(StatusCode::NotFound)
        }
    }

    fn invoke(&self, handler: &BoundHandler, ctx: &RequestContext) -> Result<Response, DispatchError> {
        let base = self.status(StatusCode::Ok);
        handler
            .invoke(ctx, &base, &self.decoders)
            .map_err(|source| DispatchError {
                handler: handler.name(),
                source,
            })
    }

    fn status(&self, status: StatusCode) -> Response {
        Response::from_defaults(status, &self.defaults)
    }
}
