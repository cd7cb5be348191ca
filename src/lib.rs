//! # pathserve
//!
//! A small HTTP/1.1 server framework (plaintext or TLS) that dispatches
//! requests to path handlers bound to exact paths or regular expressions.
//!
//! Handlers declare their methods, paths and options through a
//! [`HandlerConfig`]; the dispatcher derives `HEAD` and `OPTIONS` answers and
//! picks between `404` and `405` for unmatched requests.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pathserve::config::Defaults;
//! use pathserve::dispatch::Dispatcher;
//! use pathserve::handler::{Exchange, HandlerConfig, HandlerError, PathHandler};
//! use pathserve::http::Method;
//! use pathserve::router::RouteTable;
//! use pathserve::server::Server;
//!
//! struct Hello;
//!
//! impl PathHandler for Hello {
//!     fn config(&self) -> HandlerConfig {
//!         HandlerConfig::new().method(Method::Get).path("/hello")
//!     }
//!
//!     fn handle(&self, exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
//!         exchange.response_mut().set_body("Hello, World!");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut routes = RouteTable::with_default_paths();
//!     routes.register(Hello)?;
//!
//!     let dispatcher = Dispatcher::new(routes, Defaults::new());
//!     Server::bind("127.0.0.1:8080", dispatcher).await?.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod dispatch;
pub mod encoding;
pub mod endpoints;
pub mod handler;
pub mod http;
pub mod router;
pub mod server;
pub mod template;

pub use config::{Defaults, ServerConfig};
pub use context::{KeyMatch, RequestContext};
pub use dispatch::{DispatchError, Dispatcher};
pub use handler::{Exchange, HandlerConfig, HandlerError, PathHandler, RegistrationError};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::{Lookup, RouteTable};
pub use server::{Server, ServerError};
