//! HTTP client for dispatching rewritten requests to upstreams.
//!
//! One logical upstream per mounted prefix, a single attempt per client
//! request. Retries are a client-visible concern, never performed here.

use std::time::Duration;

use bytes::Bytes;
use http::{header::HeaderMap, Method, StatusCode};
use reqwest::Client;

use crate::error::{GatewayError, GatewayResult};

/// Client for forwarding requests to an upstream.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    timeout: Duration,
}

impl UpstreamClient {
    /// Create a new upstream client with the given per-attempt timeout.
    ///
    /// Redirects are never followed: an upstream 3xx belongs to the
    /// client verbatim, like every other status.
    pub fn new(timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(100)
            .build()
            .map_err(|e| GatewayError::server(format!("failed to create client: {e}")))?;

        Ok(Self { client, timeout })
    }

    /// Dispatch a fully rewritten request and buffer the response.
    ///
    /// Connection failures and timeouts surface as `Upstream` (502);
    /// a response that cannot be read surfaces as `Protocol` (502).
    /// Any status code the upstream does return, including non-2xx,
    /// is passed through verbatim.
    pub async fn dispatch(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> GatewayResult<UpstreamResponse> {
        let mut req = self.client.request(method, url).headers(headers);
        if !body.is_empty() {
            req = req.body(body);
        }

        let response = req.send().await.map_err(classify_send_error)?;

        let status = response.status();
        let response_headers = response.headers().clone();

        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::protocol(format!("failed to read upstream body: {e}")))?;

        Ok(UpstreamResponse {
            status,
            headers: response_headers,
            body,
        })
    }

    /// The configured per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Map a reqwest send error onto the gateway taxonomy.
fn classify_send_error(e: reqwest::Error) -> GatewayError {
    if e.is_connect() {
        GatewayError::upstream(format!("connection failed: {e}"))
    } else if e.is_timeout() {
        GatewayError::upstream(format!("upstream timed out: {e}"))
    } else if e.is_decode() {
        GatewayError::protocol(format!("malformed upstream response: {e}"))
    } else {
        GatewayError::upstream(format!("request failed: {e}"))
    }
}

/// Buffered response from an upstream.
#[derive(Debug)]
pub struct UpstreamResponse {
    /// HTTP status code, passed through verbatim.
    pub status: StatusCode,
    /// Response headers prior to the inbound rewrite.
    pub headers: HeaderMap,
    /// Response body, passed through verbatim.
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Whether the upstream reported success.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
