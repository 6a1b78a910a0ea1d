//! Radix tree routing (matchit) from path and method to a [`Route`].
//!
//! Paths use `{param}` segments, e.g. `/status/{id}`.

use http::Method;
use matchit::{InsertError, Router as MatchitRouter};
use std::collections::HashMap;

/// Endpoints served by Courier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SubmitEmail,
    SubmitLongTask,
    Status,
    Health,
}

/// Result of matching a request against the router
#[derive(Debug, PartialEq)]
pub enum RouteMatch {
    Found {
        route: Route,
        params: HashMap<String, String>,
    },
    NotFound,
    MethodNotAllowed {
        allowed: Vec<Method>,
    },
}

#[derive(Debug, Default)]
struct MethodRoutes {
    routes: Vec<(Method, Route)>,
}

impl MethodRoutes {
    fn get(&self, method: &Method) -> Option<Route> {
        self.routes
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, route)| *route)
    }

    fn allowed(&self) -> Vec<Method> {
        self.routes.iter().map(|(m, _)| m.clone()).collect()
    }
}

pub struct Router {
    inner: MatchitRouter<usize>,
    paths: HashMap<String, usize>,
    methods: Vec<MethodRoutes>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            inner: MatchitRouter::new(),
            paths: HashMap::new(),
            methods: Vec::new(),
        }
    }

    /// Courier's HTTP surface
    pub fn api() -> Result<Self, InsertError> {
        Self::new()
            .route("/email", Method::POST, Route::SubmitEmail)?
            .route("/longtask", Method::POST, Route::SubmitLongTask)?
            .route("/status/{id}", Method::GET, Route::Status)?
            .route("/health", Method::GET, Route::Health)
    }

    /// Register `route` for `method` on `path`
    pub fn route(mut self, path: &str, method: Method, route: Route) -> Result<Self, InsertError> {
        let index = match self.paths.get(path) {
            Some(index) => *index,
            None => {
                let index = self.methods.len();
                self.inner.insert(convert_path_params(path), index)?;
                self.paths.insert(path.to_string(), index);
                self.methods.push(MethodRoutes::default());
                index
            }
        };
        self.methods[index].routes.push((method, route));
        Ok(self)
    }

    pub fn match_route(&self, path: &str, method: &Method) -> RouteMatch {
        let Ok(matched) = self.inner.at(path) else {
            return RouteMatch::NotFound;
        };
        let Some(methods) = self.methods.get(*matched.value) else {
            return RouteMatch::NotFound;
        };

        match methods.get(method) {
            Some(route) => RouteMatch::Found {
                route,
                params: matched
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
            None => RouteMatch::MethodNotAllowed {
                allowed: methods.allowed(),
            },
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// `{param}` to matchit's `:param`
fn convert_path_params(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .map(|name| format!(":{}", name))
                .unwrap_or_else(|| segment.to_string())
        })
        .collect::<Vec<_>>()
        .join("/")
}
