//! Route mappings: public prefix to upstream prefix translation.
//!
//! A [`RouteMapping`] pairs a public-facing path prefix with an upstream
//! base URL and an internal path prefix. Mappings are created once at
//! startup from configuration and are immutable for the process lifetime.

use crate::error::{GatewayError, GatewayResult};

/// A single public-prefix to upstream-prefix mapping.
///
/// Prefixes are normalized at construction (leading slash enforced,
/// trailing slashes stripped) so that concatenation with a forwarded
/// path always yields exactly one separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMapping {
    /// Logical name of the surface (e.g. "operations", "webhooks").
    name: String,
    /// Public-facing path prefix.
    public_prefix: String,
    /// Upstream base URL (scheme + authority, no trailing slash).
    upstream_base: String,
    /// Path prefix substituted on the upstream side.
    upstream_prefix: String,
}

impl RouteMapping {
    /// Create a new route mapping, normalizing prefixes and validating
    /// the upstream base URL.
    pub fn new(
        name: impl Into<String>,
        public_prefix: &str,
        upstream_base: &str,
        upstream_prefix: &str,
    ) -> GatewayResult<Self> {
        let name = name.into();

        if !upstream_base.starts_with("http://") && !upstream_base.starts_with("https://") {
            return Err(GatewayError::config(format!(
                "route {name}: upstream_base must start with http:// or https://"
            )));
        }

        let public_prefix = normalize_prefix(public_prefix);
        if public_prefix.is_empty() {
            return Err(GatewayError::config(format!(
                "route {name}: public_prefix must not be empty"
            )));
        }

        Ok(Self {
            name,
            public_prefix,
            upstream_base: upstream_base.trim_end_matches('/').to_string(),
            upstream_prefix: normalize_prefix(upstream_prefix),
        })
    }

    /// Logical name of this route.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized public prefix.
    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    /// Upstream base URL (no trailing slash).
    pub fn upstream_base(&self) -> &str {
        &self.upstream_base
    }

    /// Normalized upstream prefix.
    pub fn upstream_prefix(&self) -> &str {
        &self.upstream_prefix
    }

    /// The host (authority) portion of the upstream base URL.
    ///
    /// Outbound requests have their `host` header pinned to this value.
    pub fn upstream_host(&self) -> &str {
        let rest = self
            .upstream_base
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        rest.split('/').next().unwrap_or(rest)
    }

    /// Whether an inbound path falls under this mapping's public prefix.
    ///
    /// Matching respects path-segment boundaries: `/api` matches `/api`
    /// and `/api/orders`, but not `/apix`.
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(&self.public_prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Rewrite an inbound path-and-query to the full upstream URL.
    ///
    /// `{public_prefix}/X` is forwarded as
    /// `{upstream_base}{upstream_prefix}/X`, with exactly one separator
    /// between prefix and `X` regardless of trailing slashes in the
    /// configured values. Returns `None` when the path does not match.
    pub fn rewrite(&self, path_and_query: &str) -> Option<String> {
        let rest = path_and_query.strip_prefix(&self.public_prefix)?;
        if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('?')) {
            return None;
        }

        Some(format!(
            "{}{}{}",
            self.upstream_base, self.upstream_prefix, rest
        ))
    }
}

/// Normalize a configured prefix: leading slash, no trailing slash.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
