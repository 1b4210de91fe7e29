//! Method + path routing to operation ids.
//!
//! Path templates use `{name}` segments. A request resolves to one of three
//! outcomes: a matched operation, a known path with a different method
//! (405), or nothing (404).
//!
//! ```rust
//! use emporio_server::{Resolution, Router};
//! use http::Method;
//!
//! let mut router = Router::new();
//! router.add_route(Method::GET, "/items/{item_id}", "getItem");
//! router.add_route(Method::POST, "/auth/signup", "signup");
//!
//! match router.resolve(&Method::GET, "/items/7") {
//!     Resolution::Matched(m) => assert_eq!(m.param("item_id"), Some("7")),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! assert!(matches!(
//!     router.resolve(&Method::GET, "/auth/signup"),
//!     Resolution::MethodNotAllowed(_)
//! ));
//! assert!(matches!(router.resolve(&Method::GET, "/nope"), Resolution::NotFound));
//! ```

use std::collections::HashMap;

use http::Method;

/// A matched route with its path parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    operation_id: String,
    params: HashMap<String, String>,
}

impl RouteMatch {
    /// Operation id of the matched route.
    #[must_use]
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// All extracted path parameters.
    #[must_use]
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// A single path parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Splits the match into operation id and parameters.
    #[must_use]
    pub fn into_parts(self) -> (String, HashMap<String, String>) {
        (self.operation_id, self.params)
    }
}

/// Outcome of [`Router::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Method and path matched a route.
    Matched(RouteMatch),
    /// The path exists but not for this method; carries the allowed methods.
    MethodNotAllowed(Vec<Method>),
    /// No route has this path.
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct Route {
    method: Method,
    pattern: String,
    segments: Vec<Segment>,
    operation_id: String,
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn parse_pattern(pattern: &str) -> Vec<Segment> {
    path_segments(pattern)
        .map(|raw| match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => Segment::Param(name.to_owned()),
            None => Segment::Literal(raw.to_owned()),
        })
        .collect()
}

impl Route {
    fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let actual: Vec<&str> = path_segments(path).collect();
        if actual.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, value) in self.segments.iter().zip(actual) {
            match segment {
                Segment::Literal(expected) if expected == value => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), value.to_owned());
                }
            }
        }
        Some(params)
    }
}

/// Routing table.
///
/// Routes are tried in registration order, so literal routes that overlap a
/// parameterized one (`/items/featured` vs `/items/{item_id}`) must be
/// registered first.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route.
    pub fn add_route(&mut self, method: Method, pattern: &str, operation_id: impl Into<String>) {
        self.routes.push(Route {
            method,
            pattern: pattern.to_owned(),
            segments: parse_pattern(pattern),
            operation_id: operation_id.into(),
        });
    }

    /// Finds the route for `method` and `path`, if any.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                route.captures(path).map(|params| RouteMatch {
                    operation_id: route.operation_id.clone(),
                    params,
                })
            })
    }

    /// Methods registered for `path`, in registration order.
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = Vec::new();
        for route in &self.routes {
            if route.captures(path).is_some() && !methods.contains(&route.method) {
                methods.push(route.method.clone());
            }
        }
        methods
    }

    /// Resolves a request to a match, a 405 or a 404.
    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution {
        if let Some(found) = self.match_route(method, path) {
            return Resolution::Matched(found);
        }
        let allowed = self.allowed_methods(path);
        if allowed.is_empty() {
            Resolution::NotFound
        } else {
            Resolution::MethodNotAllowed(allowed)
        }
    }

    /// Registered `(method, pattern, operation_id)` triples.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str, &str)> {
        self.routes
            .iter()
            .map(|r| (&r.method, r.pattern.as_str(), r.operation_id.as_str()))
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
