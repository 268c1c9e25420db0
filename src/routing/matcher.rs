//! Route matching logic.
//!
//! # Responsibilities
//! - Match host (exact match, case-insensitive, port ignored)
//! - Match path prefix (case-sensitive)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Matchers see request parts only, never the body
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use axum::http::request::Parts;
use axum::http::uri::Authority;
use axum::http::header::HOST;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    fn matches(&self, parts: &Parts) -> bool;
}

/// Host the client addressed: `Host` header, else the URI authority. No port.
pub fn request_host(parts: &Parts) -> Option<String> {
    let authority = parts
        .headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.parse::<Authority>().ok())
        .or_else(|| parts.uri.authority().cloned())?;
    Some(authority.host().to_ascii_lowercase())
}

/// Matches the request host.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_ascii_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, parts: &Parts) -> bool {
        request_host(parts).is_some_and(|h| h == self.expected_host)
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, parts: &Parts) -> bool {
        parts.uri.path().starts_with(&self.prefix)
    }
}

/// Combines multiple matchers with AND semantics. No matchers matches everything.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, parts: &Parts) -> bool {
        self.matchers.iter().all(|m| m.matches(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str, host: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri(uri);
        if let Some(host) = host {
            builder = builder.header("Host", host);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_host_matcher() {
        let matcher = HostMatcher::new("example.com");

        assert!(matcher.matches(&parts("/", Some("example.com"))));
        assert!(matcher.matches(&parts("/", Some("EXAMPLE.COM")))); // Case insensitive
        assert!(matcher.matches(&parts("/", Some("example.com:8080"))));
        assert!(!matcher.matches(&parts("/", Some("other.com"))));
        assert!(matcher.matches(&parts("http://example.com/x", None)));
        assert!(!matcher.matches(&parts("/x", None)));
    }

    #[test]
    fn test_path_matcher() {
        let matcher = PathPrefixMatcher::new("/api");

        assert!(matcher.matches(&parts("http://example.com/api/v1", None)));
        assert!(!matcher.matches(&parts("http://example.com/images", None)));
        assert!(!matcher.matches(&parts("/API", None)));
    }

    #[test]
    fn test_and_matcher() {
        let matcher = AndMatcher::new(vec![
            Box::new(HostMatcher::new("api.local")),
            Box::new(PathPrefixMatcher::new("/v1")),
        ]);
        assert!(matcher.matches(&parts("/v1/pets", Some("api.local"))));
        assert!(!matcher.matches(&parts("/v2/pets", Some("api.local"))));
        assert!(AndMatcher::new(Vec::new()).matches(&parts("/", None)));
    }
}
