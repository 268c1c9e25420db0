//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Decide whether interception is enabled for a request
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks); reloads build a new Router
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Requests matching no route fall back to the global switch

use axum::http::request::Parts;

use crate::config::RouteConfig;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// One compiled routing scope.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub enabled: bool,
    pub priority: u32,
    matcher: AndMatcher,
}

impl Route {
    pub fn from_config(config: &RouteConfig) -> Self {
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = &config.host {
            matchers.push(Box::new(HostMatcher::new(host.as_str())));
        }
        if let Some(prefix) = &config.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix.as_str())));
        }

        Self {
            name: config.name.clone(),
            enabled: config.enabled,
            priority: config.priority,
            matcher: AndMatcher::new(matchers),
        }
    }

    pub fn matches(&self, parts: &Parts) -> bool {
        self.matcher.matches(parts)
    }
}

#[derive(Debug)]
pub struct Router {
    routes: Vec<Route>,
    default_enabled: bool,
}

impl Router {
    /// Compile routes, highest priority first. Equal priorities keep file order.
    pub fn from_config(routes: &[RouteConfig], default_enabled: bool) -> Self {
        let mut routes: Vec<Route> = routes.iter().map(Route::from_config).collect();
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            routes,
            default_enabled,
        }
    }

    /// First matching route, if any.
    pub fn match_route(&self, parts: &Parts) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(parts))
    }

    pub fn firetail_enabled_for(&self, parts: &Parts) -> bool {
        self.match_route(parts)
            .map(|r| r.enabled)
            .unwrap_or(self.default_enabled)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
