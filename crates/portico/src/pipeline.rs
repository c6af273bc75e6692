//! The per-route request pipeline.
//!
//! Every proxied call runs the same ordered stages:
//!
//! ```text
//! Received -> PreValidated -> PreHandled -> Dispatching -> ResponseRewriting -> Completed
//!     |             |                            |
//!     v             v                            v
//! ShortCircuited  Rejected (403)             Rejected (502)
//! ```
//!
//! Short-circuit rules and identity gating complete before any byte is
//! requested from the upstream, so a partial response is never sent.
//! Exactly one [`PipelineOutcome`] is produced per request.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{header::HeaderMap, Method, Uri};
use tracing::{debug, warn};

use crate::config::{GatewayConfig, IdentitySettings, RouteSettings};
use crate::error::{GatewayError, GatewayResult};
use crate::identity::{resolve_client_identity, ClientIdentity};
use crate::method_override::MethodOverride;
use crate::proxy::{UpstreamClient, UpstreamResponse};
use crate::rewrite::{inbound_plan, outbound_plan, HeaderTransformPlan};
use crate::route::RouteMapping;

/// Pipeline stages, used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Request received, short-circuit rules not yet evaluated.
    Received,
    /// Short-circuit rules passed; gating checks run here.
    PreValidated,
    /// Identity resolved and method-override shim applied.
    PreHandled,
    /// Outbound rewrite done, upstream attempt in flight.
    Dispatching,
    /// Upstream responded; inbound rewrite in progress.
    ResponseRewriting,
    /// Response ready for the client.
    Completed,
}

impl PipelineStage {
    /// Stage name for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::PreValidated => "pre_validated",
            Self::PreHandled => "pre_handled",
            Self::Dispatching => "dispatching",
            Self::ResponseRewriting => "response_rewriting",
            Self::Completed => "completed",
        }
    }
}

/// Terminal outcome of a pipeline invocation.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// The upstream responded; status and body pass through verbatim.
    Forwarded(UpstreamResponse),
    /// A short-circuit rule matched; redirect without touching the upstream.
    ShortCircuited {
        /// Redirect target.
        location: String,
    },
    /// The request was rejected at some stage.
    Rejected(GatewayError),
}

/// The ordered transformation pipeline bound to one route mapping.
pub struct RoutePipeline {
    mapping: RouteMapping,
    client: UpstreamClient,
    shim: MethodOverride,
    outbound: HeaderTransformPlan,
    inbound: HeaderTransformPlan,
    identity: IdentitySettings,
    short_circuit: BTreeMap<String, String>,
}

impl RoutePipeline {
    /// Build a pipeline for one route from the gateway configuration.
    pub fn new(
        settings: &RouteSettings,
        config: &GatewayConfig,
        client: UpstreamClient,
    ) -> GatewayResult<Self> {
        let mapping = RouteMapping::new(
            settings.name.clone(),
            &settings.public_prefix,
            &settings.upstream_base,
            &settings.upstream_prefix,
        )?;

        let shim = MethodOverride::new(&config.rewrite.method_override_verbs)?;
        let outbound = outbound_plan(mapping.upstream_host());
        let inbound = inbound_plan(&config.rewrite.default_cors_origin);

        Ok(Self {
            mapping,
            client,
            shim,
            outbound,
            inbound,
            identity: config.identity.clone(),
            short_circuit: config.short_circuit.clone(),
        })
    }

    /// The route mapping this pipeline is bound to.
    pub fn mapping(&self) -> &RouteMapping {
        &self.mapping
    }

    /// Run the pipeline for one request.
    pub async fn handle(
        &self,
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        body: Bytes,
        remote_addr: Option<SocketAddr>,
    ) -> PipelineOutcome {
        let route = self.mapping.name().to_string();
        metrics::counter!("portico_requests_total", "route" => route.clone()).increment(1);

        // Received: exact-path short-circuit rules beat everything else.
        if let Some(target) = self.short_circuit.get(uri.path()) {
            debug!(path = %uri.path(), target = %target, "short-circuit rule matched");
            metrics::counter!("portico_short_circuits_total", "route" => route).increment(1);
            return PipelineOutcome::ShortCircuited {
                location: target.clone(),
            };
        }

        // PreValidated: resolve identity and run the gating checks.
        let identity =
            resolve_client_identity(&headers, remote_addr, &self.identity.ip_header_order);
        if let Err(err) = self.gate(&identity) {
            return self.reject(PipelineStage::PreValidated, err, &route);
        }

        // PreHandled: method-override shim. The resolved identity and
        // effective method travel with the request from here on.
        let mut method = method;
        let mut headers = headers;
        self.shim.apply(&mut method, &mut headers);

        debug!(
            route = %route,
            client_ip = %identity.ip,
            method = %method,
            "request pre-handled"
        );

        // Dispatching: outbound header rewrite, then a single upstream attempt.
        self.outbound.apply(&mut headers);

        let path_and_query = uri
            .path_and_query()
            .map_or_else(|| uri.path().to_string(), ToString::to_string);
        let Some(url) = self.mapping.rewrite(&path_and_query) else {
            // The registry only dispatches matching paths; a miss here is a bug.
            let err = GatewayError::internal("path does not match mounted prefix");
            return self.reject(PipelineStage::Dispatching, err, &route);
        };

        let response = match self.client.dispatch(method, &url, headers, body).await {
            Ok(response) => response,
            Err(err) => return self.reject(PipelineStage::Dispatching, err, &route),
        };

        // ResponseRewriting: inbound header rewrite; status and body
        // pass through verbatim.
        let mut response = response;
        self.inbound.apply(&mut response.headers);

        metrics::counter!(
            "portico_upstream_responses_total",
            "route" => route,
            "status" => response.status.as_u16().to_string()
        )
        .increment(1);

        PipelineOutcome::Forwarded(response)
    }

    /// Identity gating: required identity, then denylist, then allowlist.
    ///
    /// The allow/deny lists are an optional, explicitly configured
    /// stage; both are empty by default and nothing is inferred from
    /// ambient process state.
    fn gate(&self, identity: &ClientIdentity) -> GatewayResult<()> {
        if self.identity.require_client_ip && !identity.is_resolved() {
            return Err(GatewayError::identity(
                "client address could not be resolved",
            ));
        }

        if !self.identity.ip_denylist.is_empty()
            && self.identity.ip_denylist.iter().any(|ip| *ip == identity.ip)
        {
            return Err(GatewayError::denied("client address is denylisted"));
        }

        if !self.identity.ip_allowlist.is_empty()
            && !self.identity.ip_allowlist.iter().any(|ip| *ip == identity.ip)
        {
            return Err(GatewayError::denied("client address is not allowlisted"));
        }

        Ok(())
    }

    fn reject(&self, stage: PipelineStage, err: GatewayError, route: &str) -> PipelineOutcome {
        warn!(
            route = %route,
            stage = stage.as_str(),
            category = err.category(),
            error = %err,
            "request rejected"
        );
        metrics::counter!(
            "portico_rejections_total",
            "route" => route.to_string(),
            "category" => err.category()
        )
        .increment(1);
        PipelineOutcome::Rejected(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use std::time::Duration;

    fn pipeline(configure: impl FnOnce(crate::config::GatewayConfigBuilder) -> crate::config::GatewayConfigBuilder) -> RoutePipeline {
        let builder = GatewayConfig::builder()
            .route("operations", "/api", "http://127.0.0.1:9", "/internal/v1")
            .short_circuit("/favicon.ico", "/assets/favicon.ico");
        let config = configure(builder).build().unwrap();
        let client = UpstreamClient::new(Duration::from_secs(1)).unwrap();
        RoutePipeline::new(&config.routes[0], &config, client).unwrap()
    }

    fn remote() -> Option<SocketAddr> {
        Some("4.4.4.4:51000".parse().unwrap())
    }

    #[tokio::test]
    async fn test_short_circuit_never_reaches_upstream() {
        // The upstream base points at a dead port; a dial attempt would fail.
        let p = pipeline(|b| b);
        let outcome = p
            .handle(
                Method::GET,
                &Uri::from_static("/favicon.ico"),
                HeaderMap::new(),
                Bytes::new(),
                remote(),
            )
            .await;

        match outcome {
            PipelineOutcome::ShortCircuited { location } => {
                assert_eq!(location, "/assets/favicon.ico");
            }
            other => panic!("expected short-circuit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_identity_gating_rejects_before_dispatch() {
        let p = pipeline(|b| b.require_client_ip(true));
        let outcome = p
            .handle(
                Method::GET,
                &Uri::from_static("/api/orders"),
                HeaderMap::new(),
                Bytes::new(),
                None,
            )
            .await;

        match outcome {
            PipelineOutcome::Rejected(err) => {
                // 403 for identity, not 502: the upstream was never dialed.
                assert_eq!(err.status_code(), 403);
                assert_eq!(err.category(), "identity");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_denylist_rejects() {
        let p = pipeline(|b| b);
        let mut p = p;
        p.identity.ip_denylist = vec!["1.1.1.1".to_string()];

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            http::HeaderValue::from_static("1.1.1.1, 2.2.2.2"),
        );

        let outcome = p
            .handle(
                Method::GET,
                &Uri::from_static("/api/orders"),
                headers,
                Bytes::new(),
                remote(),
            )
            .await;

        match outcome {
            PipelineOutcome::Rejected(err) => {
                assert_eq!(err.status_code(), 403);
                assert_eq!(err.category(), "denied");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_allowlist_rejects_unlisted() {
        let mut p = pipeline(|b| b);
        p.identity.ip_allowlist = vec!["9.9.9.9".to_string()];

        let outcome = p
            .handle(
                Method::GET,
                &Uri::from_static("/api/orders"),
                HeaderMap::new(),
                Bytes::new(),
                remote(),
            )
            .await;

        assert!(matches!(
            outcome,
            PipelineOutcome::Rejected(GatewayError::Denied { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_rejected_502() {
        let p = pipeline(|b| b);
        let outcome = p
            .handle(
                Method::GET,
                &Uri::from_static("/api/orders"),
                HeaderMap::new(),
                Bytes::new(),
                remote(),
            )
            .await;

        match outcome {
            PipelineOutcome::Rejected(err) => {
                assert_eq!(err.status_code(), 502);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(PipelineStage::Received.as_str(), "received");
        assert_eq!(PipelineStage::Completed.as_str(), "completed");
    }
}
