//! Caller identity and operation scope resolution.
//!
//! Both resolvers see only the request head. Returning `None` (or a blank
//! string) makes the middleware bypass the engine for that request.

use axum::http::HeaderName;
use axum::http::request::Parts;

/// Resolves who is calling.
pub trait ActorResolver: Send + Sync {
    fn resolve_actor(&self, parts: &Parts) -> Option<String>;
}

/// Resolves which operation family a request belongs to.
pub trait ScopeResolver: Send + Sync {
    fn resolve_scope(&self, parts: &Parts) -> Option<String>;
}

/// Every caller shares one identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousActor;

impl AnonymousActor {
    pub const ID: &'static str = "anon";
}

impl ActorResolver for AnonymousActor {
    fn resolve_actor(&self, _parts: &Parts) -> Option<String> {
        Some(Self::ID.to_string())
    }
}

/// Identity taken from a header set by a trusted upstream auth layer.
#[derive(Debug, Clone)]
pub struct HeaderActor {
    header: HeaderName,
}

impl HeaderActor {
    #[must_use]
    pub const fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl ActorResolver for HeaderActor {
    fn resolve_actor(&self, parts: &Parts) -> Option<String> {
        parts
            .headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    }
}

/// Scope is the request path, so each endpoint gets its own key space.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathScope;

impl ScopeResolver for PathScope {
    fn resolve_scope(&self, parts: &Parts) -> Option<String> {
        Some(parts.uri.path().to_string())
    }
}

/// A fixed scope, for endpoints sharing one key space or per-route layers.
#[derive(Debug, Clone)]
pub struct FixedScope(String);

impl FixedScope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }
}

impl ScopeResolver for FixedScope {
    fn resolve_scope(&self, _parts: &Parts) -> Option<String> {
        Some(self.0.clone())
    }
}
