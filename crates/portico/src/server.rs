//! Gateway HTTP server.
//!
//! The HTTP runtime the pipelines plug into: a tokio accept loop with
//! one hyper HTTP/1 connection task per client. Each request runs on
//! its own task; if the client disconnects mid-flight the task is
//! dropped and the in-flight upstream call is aborted with it.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::{HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::{ErrorResponse, GatewayError, GatewayResult};
use crate::health::HealthChecker;
use crate::pipeline::PipelineOutcome;
use crate::registry::GatewayRegistry;

/// Request ID header propagated upstream and on responses.
static REQUEST_ID_HEADER: http::header::HeaderName =
    http::header::HeaderName::from_static("x-request-id");

/// The gateway server.
pub struct GatewayServer {
    /// Configuration.
    config: Arc<GatewayConfig>,
    /// Mounted route pipelines.
    registry: Arc<GatewayRegistry>,
    /// Health checker.
    health: Arc<HealthChecker>,
}

impl GatewayServer {
    /// Create a new gateway server from validated configuration.
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let config = Arc::new(config);
        let registry = Arc::new(GatewayRegistry::from_config(&config)?);
        let health = Arc::new(HealthChecker::new(config.clone()));

        Ok(Self {
            config,
            registry,
            health,
        })
    }

    /// Run the gateway server.
    pub async fn run(self) -> GatewayResult<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .listen_addr
                .parse()
                .map_err(|e| GatewayError::config(format!("invalid listen address: {e}")))?,
            self.config.server.listen_port,
        );

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::server(format!("failed to bind: {e}")))?;

        let metrics_handle = match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("failed to install metrics recorder: {}", e);
                None
            }
        };

        info!("Portico gateway listening on {}", addr);
        for pipeline in self.registry.pipelines() {
            info!(
                route = pipeline.mapping().name(),
                public_prefix = pipeline.mapping().public_prefix(),
                upstream = pipeline.mapping().upstream_base(),
                "route mounted"
            );
        }

        self.health.set_ready(true);

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("failed to accept connection: {}", e);
                    continue;
                }
            };

            let config = self.config.clone();
            let registry = self.registry.clone();
            let health = self.health.clone();
            let metrics_handle = metrics_handle.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let config = config.clone();
                    let registry = registry.clone();
                    let health = health.clone();
                    let metrics_handle = metrics_handle.clone();
                    async move {
                        handle_request(req, config, registry, health, metrics_handle, peer_addr)
                            .await
                    }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("connection error: {}", e);
                }
            });
        }
    }
}

/// Handle a single inbound request.
async fn handle_request<B>(
    req: Request<B>,
    config: Arc<GatewayConfig>,
    registry: Arc<GatewayRegistry>,
    health: Arc<HealthChecker>,
    metrics_handle: Option<PrometheusHandle>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let start = Instant::now();
    let method = req.method().clone();
    let path = req
        .uri()
        .path_and_query()
        .map_or_else(|| "/".to_string(), ToString::to_string);

    let request_id = Uuid::now_v7().to_string();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
        peer = %peer_addr,
    );

    async move {
        if req.uri().path().starts_with("/_portico/") {
            return handle_internal_endpoint(
                req.uri().path(),
                &health,
                metrics_handle.as_ref(),
                &request_id,
            )
            .await;
        }

        // Short-circuit rules may target paths outside every mounted
        // prefix (e.g. /favicon.ico), so they are evaluated before
        // route resolution and never reach an upstream.
        if let Some(target) = config.short_circuit.get(req.uri().path()) {
            debug!(target = %target, "short-circuit rule matched");
            metrics::counter!("portico_short_circuits_total", "route" => "gateway").increment(1);
            return Ok(redirect_response(target, &request_id));
        }

        let Some(pipeline) = registry.resolve(req.uri().path()) else {
            return Ok(error_response(
                StatusCode::NOT_FOUND,
                "no route mounted for path",
                &request_id,
            ));
        };

        let (parts, body) = req.into_parts();
        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("failed to read request body: {}", e);
                return Ok(error_response(
                    StatusCode::BAD_REQUEST,
                    "failed to read request body",
                    &request_id,
                ));
            }
        };

        let mut headers = parts.headers;
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            headers.insert(REQUEST_ID_HEADER.clone(), value);
        }

        let outcome = pipeline
            .handle(parts.method, &parts.uri, headers, body_bytes, Some(peer_addr))
            .await;

        let response = match outcome {
            PipelineOutcome::Forwarded(upstream) => {
                let mut builder = Response::builder().status(upstream.status);
                for (name, value) in &upstream.headers {
                    builder = builder.header(name, value);
                }
                builder = builder.header(&REQUEST_ID_HEADER, &request_id);

                builder
                    .body(Full::new(upstream.body))
                    .unwrap_or_else(|_| plain_response(StatusCode::INTERNAL_SERVER_ERROR))
            }
            PipelineOutcome::ShortCircuited { location } => {
                redirect_response(&location, &request_id)
            }
            PipelineOutcome::Rejected(err) => error_response(
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_GATEWAY),
                &err.to_string(),
                &request_id,
            ),
        };

        if config.telemetry.access_log {
            info!(
                status = %response.status(),
                duration_ms = %start.elapsed().as_millis(),
                "request completed"
            );
        }

        Ok(response)
    }
    .instrument(span)
    .await
}

/// Handle internal gateway endpoints.
async fn handle_internal_endpoint(
    path: &str,
    health: &HealthChecker,
    metrics_handle: Option<&PrometheusHandle>,
    request_id: &str,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match path {
        "/_portico/health" => {
            let response = health.liveness();
            let status = if response.status.is_operational() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };

            Ok(json_response(status, &response))
        }
        "/_portico/ready" => {
            let response = health.readiness().await;
            let status = if response.status.is_ready() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };

            Ok(json_response(status, &response))
        }
        "/_portico/metrics" => {
            let body = metrics_handle.map_or_else(String::new, PrometheusHandle::render);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "text/plain")
                .body(Full::new(Bytes::from(body)))
                .unwrap_or_else(|_| plain_response(StatusCode::INTERNAL_SERVER_ERROR)))
        }
        "/_portico/version" => {
            let version = serde_json::json!({
                "version": crate::VERSION,
            });

            Ok(json_response(StatusCode::OK, &version))
        }
        _ => Ok(error_response(
            StatusCode::NOT_FOUND,
            &format!("unknown internal endpoint: {path}"),
            request_id,
        )),
    }
}

/// Create a JSON response.
fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|_| plain_response(StatusCode::INTERNAL_SERVER_ERROR))
}

/// Create a JSON error envelope response.
fn error_response(status: StatusCode, message: &str, request_id: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse::new(status.canonical_reason().unwrap_or("error"), message)
        .with_request_id(request_id);

    json_response(status, &error)
}

/// Redirect response for a short-circuit rule.
fn redirect_response(location: &str, request_id: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(http::header::LOCATION, location)
        .header(&REQUEST_ID_HEADER, request_id)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| plain_response(StatusCode::INTERNAL_SERVER_ERROR))
}

/// Last-resort response when a builder fails.
fn plain_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
