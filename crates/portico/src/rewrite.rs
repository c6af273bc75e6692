//! Header rewriting for outbound requests and inbound responses.
//!
//! Rewrites are described declaratively as a [`HeaderTransformPlan`]
//! and applied as a single deterministic pass: removals, then
//! overrides, then additions. Overrides always win over additions for
//! the same key; additions only take effect when the header is absent.
//! Applying a plan to its own output is a no-op.

use http::header::{HeaderMap, HeaderName, HeaderValue};

/// CORS response header injected when the upstream did not set one.
pub static ALLOW_ORIGIN_HEADER: HeaderName = HeaderName::from_static("access-control-allow-origin");

/// Hop-by-hop headers (RFC 7230 section 6.1) stripped on both legs.
pub static HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// A declarative header transformation.
#[derive(Debug, Clone, Default)]
pub struct HeaderTransformPlan {
    /// Headers removed first.
    removals: Vec<HeaderName>,
    /// Headers set unconditionally; these win over additions.
    overrides: Vec<(HeaderName, HeaderValue)>,
    /// Headers set only when absent.
    additions: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderTransformPlan {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a removal.
    #[must_use]
    pub fn remove(mut self, name: HeaderName) -> Self {
        self.removals.push(name);
        self
    }

    /// Add an unconditional override.
    #[must_use]
    pub fn override_with(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.overrides.push((name, value));
        self
    }

    /// Add a value applied only when the header is absent.
    #[must_use]
    pub fn add_if_absent(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.additions.push((name, value));
        self
    }

    /// Apply the plan: removals, then overrides, then additions.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for name in &self.removals {
            headers.remove(name);
        }
        for (name, value) in &self.overrides {
            headers.insert(name.clone(), value.clone());
        }
        for (name, value) in &self.additions {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
    }
}

/// Plan applied to request headers before dispatch.
///
/// Pins `host` to the configured upstream host so a client-supplied
/// value never reaches the internal service, and strips hop-by-hop
/// headers. All other headers pass through untouched.
pub fn outbound_plan(upstream_host: &str) -> HeaderTransformPlan {
    let mut plan = HeaderTransformPlan::new();
    for name in hop_by_hop_names() {
        plan = plan.remove(name);
    }
    if let Ok(value) = HeaderValue::from_str(upstream_host) {
        plan = plan.override_with(http::header::HOST, value);
    }
    plan
}

/// Plan applied to response headers before returning to the client.
///
/// Injects `access-control-allow-origin` with the configured default
/// only when the upstream did not set one (an explicit upstream choice
/// wins), and strips hop-by-hop headers.
pub fn inbound_plan(default_cors_origin: &str) -> HeaderTransformPlan {
    let mut plan = HeaderTransformPlan::new();
    for name in hop_by_hop_names() {
        plan = plan.remove(name);
    }
    if let Ok(value) = HeaderValue::from_str(default_cors_origin) {
        plan = plan.add_if_absent(ALLOW_ORIGIN_HEADER.clone(), value);
    }
    plan
}

fn hop_by_hop_names() -> impl Iterator<Item = HeaderName> {
    HOP_BY_HOP_HEADERS
        .iter()
        .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok())
}
