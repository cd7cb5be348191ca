//! Route table: map (method, path) pairs to path handlers.
//!
//! Each routable method ([`Method::ROUTABLE`]) owns two lookup structures:
//!
//! | Kind   | Example           | Matches                         |
//! |--------|-------------------|---------------------------------|
//! | exact  | `/example01`      | `/example01` only               |
//! | regex  | `/items/\d+`      | the whole path, e.g. `/items/7` |
//!
//! Exact paths are consulted first. Regex patterns are tried afterwards in
//! registration order. An entry is either a bound handler or the default
//! marker, which the dispatcher answers with a bare `200`.
//!
//! Registering a (method, path) pair that is already bound replaces the
//! earlier binding and logs a warning. Nothing is ever removed.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use crate::handler::{BoundHandler, PathHandler, RegistrationError};
use crate::http::Method;

/// What a route table entry points at.
#[derive(Debug, Clone)]
pub enum RouteTarget {
    /// No handler; answered with the default headers and an empty `200`.
    Default,
    Handler(Arc<BoundHandler>),
}

/// Outcome of [`RouteTable::lookup`].
#[derive(Debug, Clone, Copy)]
pub enum Lookup<'a> {
    Handler(&'a Arc<BoundHandler>),
    Default,
    NotFound,
}

#[derive(Debug)]
struct RegexRoute {
    pattern: String,
    regex: Regex,
    target: RouteTarget,
}

#[derive(Debug, Default)]
struct MethodRoutes {
    exact: HashMap<String, RouteTarget>,
    regex: Vec<RegexRoute>,
}

impl MethodRoutes {
    fn find(&self, path: &str) -> Option<&RouteTarget> {
        self.exact.get(path).or_else(|| {
            self.regex
                .iter()
                .find(|route| route.regex.is_match(path))
                .map(|route| &route.target)
        })
    }

    fn bind_exact(&mut self, method: &Method, path: &str, target: RouteTarget) {
        if self.exact.insert(path.to_owned(), target).is_some() {
            warn!(%method, path, "overwriting existing route");
        }
    }

    fn bind_regex(&mut self, method: &Method, pattern: &str, regex: &Regex, target: RouteTarget) {
        match self.regex.iter_mut().find(|route| route.pattern == pattern) {
            Some(existing) => {
                warn!(%method, pattern, "overwriting existing regex route");
                existing.regex = regex.clone();
                existing.target = target;
            }
            None => self.regex.push(RegexRoute {
                pattern: pattern.to_owned(),
                regex: regex.clone(),
                target,
            }),
        }
    }
}

/// Routes for every routable method.
///
/// Built once at startup, then shared read-only between connections.
///
/// # Examples
///
/// ```
/// use pathserve::handler::{Exchange, HandlerConfig, HandlerError, PathHandler};
/// use pathserve::http::Method;
/// use pathserve::router::{Lookup, RouteTable};
///
/// struct Ping;
///
/// impl PathHandler for Ping {
///     fn config(&self) -> HandlerConfig {
///         HandlerConfig::new().method(Method::Get).path("/ping")
///     }
///
///     fn handle(&self, _exchange: &mut Exchange<'_>) -> Result<(), HandlerError> {
///         Ok(())
///     }
/// }
///
/// let mut routes = RouteTable::with_default_paths();
/// routes.register(Ping).unwrap();
///
/// assert!(matches!(routes.lookup(&Method::Get, "/ping"), Lookup::Handler(_)));
/// assert!(matches!(routes.lookup(&Method::Post, "/"), Lookup::Default));
/// assert!(matches!(routes.lookup(&Method::Post, "/ping"), Lookup::NotFound));
/// assert_eq!(routes.allowed_methods("/ping"), [Method::Get]);
/// ```
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: [MethodRoutes; 6],
}

impl RouteTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table where `/` is bound to [`RouteTarget::Default`] for
    /// every routable method.
    pub fn with_default_paths() -> Self {
        let mut table = Self::new();
        for slot in &mut table.routes {
            slot.exact.insert("/".to_owned(), RouteTarget::Default);
        }
        table
    }

    /// Validates `handler`'s configuration and binds every (method, path)
    /// pair it declares.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistrationError`] when the configuration is invalid. The
    /// table is left untouched in that case.
    pub fn register<H: PathHandler>(&mut self, handler: H) -> Result<(), RegistrationError> {
        let bound = Arc::new(BoundHandler::new(handler)?);
        let settings = bound.settings();

        for method in &settings.methods {
            let Some(slot) = Self::slot(method) else {
                continue;
            };
            let routes = &mut self.routes[slot];
            for path in &settings.paths {
                routes.bind_exact(method, path, RouteTarget::Handler(Arc::clone(&bound)));
            }
            for (pattern, regex) in &settings.regex_paths {
                routes.bind_regex(method, pattern, regex, RouteTarget::Handler(Arc::clone(&bound)));
            }
        }
        Ok(())
    }

    /// Binds an exact path to [`RouteTarget::Default`].
    ///
    /// Non-routable methods are ignored.
    pub fn register_default(&mut self, method: &Method, path: &str) {
        if let Some(slot) = Self::slot(method) {
            self.routes[slot].bind_exact(method, path, RouteTarget::Default);
        }
    }

    /// Finds the entry for `path` under `method`: exact match first, then
    /// regex patterns in registration order.
    pub fn lookup(&self, method: &Method, path: &str) -> Lookup<'_> {
        match Self::slot(method).and_then(|slot| self.routes[slot].find(path)) {
            Some(RouteTarget::Handler(handler)) => Lookup::Handler(handler),
            Some(RouteTarget::Default) => Lookup::Default,
            None => Lookup::NotFound,
        }
    }

    /// Every routable method `path` is bound under, in [`Method::ROUTABLE`] order.
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        Method::ROUTABLE
            .into_iter()
            .zip(&self.routes)
            .filter(|(_, routes)| routes.find(path).is_some())
            .map(|(method, _)| method)
            .collect()
    }

    /// Entries bound to `path` under any method.
    pub fn targets(&self, path: &str) -> impl Iterator<Item = &RouteTarget> {
        self.routes.iter().filter_map(move |routes| routes.find(path))
    }

    /// Returns `true` if `path` is bound under at least one method.
    pub fn contains_path(&self, path: &str) -> bool {
        self.targets(path).next().is_some()
    }

    fn slot(method: &Method) -> Option<usize> {
        method.routable_index()
    }
}
