//! Client identity resolution from forwarding headers.
//!
//! The resolver consults an ordered, configurable list of candidate
//! header names (default: `x-forwarded-for`, then `x-real-ip`); the
//! first header present and non-empty wins. When no candidate header is
//! present it falls back to the transport-level remote address.
//!
//! # Security caveat
//!
//! `x-forwarded-for` may carry a comma-separated chain; only the
//! left-most (original client) entry is used, because intermediate
//! proxies append their own address to the right. Trusting the
//! left-most entry is only appropriate when this gateway is the first
//! hop: a client talking to the gateway directly can spoof the header.
//! Deployments behind another proxy layer should reorder or trim
//! `ip_header_order` accordingly.

use std::net::SocketAddr;

use http::header::HeaderMap;

/// Default header consultation order.
pub const DEFAULT_IP_HEADER_ORDER: &[&str] = &["x-forwarded-for", "x-real-ip"];

/// Where a resolved client address came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// A forwarding header; carries the header name that won.
    Header(String),
    /// The transport-level remote socket address.
    Socket,
    /// No header and no socket address were available.
    Unresolved,
}

/// The client identity derived for a single request.
///
/// Recomputed per request; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Resolved client IP address, empty when unresolved.
    pub ip: String,
    /// Provenance of the resolved address.
    pub source: IdentitySource,
}

impl ClientIdentity {
    /// Whether an address was resolved at all.
    pub fn is_resolved(&self) -> bool {
        !matches!(self.source, IdentitySource::Unresolved)
    }

    fn unresolved() -> Self {
        Self {
            ip: String::new(),
            source: IdentitySource::Unresolved,
        }
    }
}

/// Resolve the originating client address for a request.
///
/// Does not mutate headers; produces a value only.
pub fn resolve_client_identity(
    headers: &HeaderMap,
    remote_addr: Option<SocketAddr>,
    header_order: &[String],
) -> ClientIdentity {
    for name in header_order {
        let Some(value) = headers.get(name.as_str()).and_then(|v| v.to_str().ok()) else {
            continue;
        };

        // Left-most entry of a comma-separated chain is the original client.
        let first = value.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            return ClientIdentity {
                ip: first.to_string(),
                source: IdentitySource::Header(name.clone()),
            };
        }
    }

    match remote_addr {
        Some(addr) => ClientIdentity {
            ip: addr.ip().to_string(),
            source: IdentitySource::Socket,
        },
        None => ClientIdentity::unresolved(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn default_order() -> Vec<String> {
        DEFAULT_IP_HEADER_ORDER
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn remote() -> Option<SocketAddr> {
        Some("4.4.4.4:51000".parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_chain_uses_leftmost() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.1.1.1, 2.2.2.2"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("3.3.3.3"));

        let identity = resolve_client_identity(&headers, remote(), &default_order());
        assert_eq!(identity.ip, "1.1.1.1");
        assert_eq!(
            identity.source,
            IdentitySource::Header("x-forwarded-for".to_string())
        );
    }

    #[test]
    fn test_real_ip_when_forwarded_for_absent() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("3.3.3.3"));

        let identity = resolve_client_identity(&headers, remote(), &default_order());
        assert_eq!(identity.ip, "3.3.3.3");
        assert_eq!(
            identity.source,
            IdentitySource::Header("x-real-ip".to_string())
        );
    }

    #[test]
    fn test_empty_header_is_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        headers.insert("x-real-ip", HeaderValue::from_static("3.3.3.3"));

        let identity = resolve_client_identity(&headers, remote(), &default_order());
        assert_eq!(identity.ip, "3.3.3.3");
    }

    #[test]
    fn test_socket_fallback() {
        let headers = HeaderMap::new();

        let identity = resolve_client_identity(&headers, remote(), &default_order());
        assert_eq!(identity.ip, "4.4.4.4");
        assert_eq!(identity.source, IdentitySource::Socket);
    }

    #[test]
    fn test_unresolved_without_headers_or_socket() {
        let headers = HeaderMap::new();

        let identity = resolve_client_identity(&headers, None, &default_order());
        assert!(!identity.is_resolved());
        assert!(identity.ip.is_empty());
    }

    #[test]
    fn test_custom_header_order() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.1.1.1"));
        headers.insert("cf-connecting-ip", HeaderValue::from_static("5.5.5.5"));

        let order = vec!["cf-connecting-ip".to_string(), "x-forwarded-for".to_string()];
        let identity = resolve_client_identity(&headers, remote(), &order);
        assert_eq!(identity.ip, "5.5.5.5");
        assert_eq!(
            identity.source,
            IdentitySource::Header("cf-connecting-ip".to_string())
        );
    }

    #[test]
    fn test_resolution_does_not_mutate_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.1.1.1"));
        let before = headers.clone();

        let _ = resolve_client_identity(&headers, remote(), &default_order());
        assert_eq!(headers, before);
    }
}
