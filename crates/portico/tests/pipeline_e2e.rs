//! End-to-end pipeline tests against a live local stub upstream.
//!
//! These exercise the full transformation pipeline over real sockets:
//! method override, host pinning, path rewriting, CORS injection,
//! verbatim pass-through, and upstream-failure handling.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use portico::pipeline::{PipelineOutcome, RoutePipeline};
use portico::proxy::UpstreamClient;
use portico::GatewayConfig;

/// Spawn a stub upstream that echoes request details as JSON.
///
/// Special behaviors:
/// - a path ending in `/teapot` returns 418 with a plain body;
/// - a path ending in `/moved` returns 302 pointing at a sibling path;
/// - an `x-set-cors` request header makes the response carry its own
///   `access-control-allow-origin`.
async fn spawn_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(echo_handler);
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    addr
}

async fn echo_handler(
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let method = req.method().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map(ToString::to_string)
        .unwrap_or_default();
    let host = header_string(req.headers(), "host");
    let override_verb = header_string(req.headers(), "x-http-method-override");
    let set_cors = req.headers().contains_key("x-set-cors");

    if path.ends_with("/moved") {
        let response = Response::builder()
            .status(StatusCode::FOUND)
            .header("location", "/internal/v1/orders")
            .body(Full::new(Bytes::from("followed")))
            .unwrap();
        return Ok(response);
    }

    if path.ends_with("/teapot") {
        let response = Response::builder()
            .status(StatusCode::IM_A_TEAPOT)
            .body(Full::new(Bytes::from("short and stout")))
            .unwrap();
        return Ok(response);
    }

    let body = req.into_body().collect().await.unwrap().to_bytes();
    let echo = serde_json::json!({
        "method": method,
        "path": path,
        "host": host,
        "override": override_verb,
        "body": String::from_utf8_lossy(&body),
    });

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json");
    if set_cors {
        builder = builder.header(
            "access-control-allow-origin",
            "https://upstream-choice.example.com",
        );
    }

    Ok(builder
        .body(Full::new(Bytes::from(echo.to_string())))
        .unwrap())
}

fn header_string(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn pipeline_for(upstream: SocketAddr) -> RoutePipeline {
    let config = GatewayConfig::builder()
        .route(
            "operations",
            "/api",
            format!("http://{upstream}"),
            "/internal/v1",
        )
        .default_cors_origin("https://app.example.com")
        .build()
        .unwrap();
    let client = UpstreamClient::new(config.upstream.timeout).unwrap();
    RoutePipeline::new(&config.routes[0], &config, client).unwrap()
}

fn remote() -> Option<SocketAddr> {
    Some("4.4.4.4:51000".parse().unwrap())
}

fn forwarded(outcome: PipelineOutcome) -> portico::proxy::UpstreamResponse {
    match outcome {
        PipelineOutcome::Forwarded(response) => response,
        other => panic!("expected forwarded outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn delete_is_dispatched_as_post_with_marker() {
    let upstream = spawn_echo_upstream().await;
    let pipeline = pipeline_for(upstream);

    let mut headers = HeaderMap::new();
    headers.insert("host", HeaderValue::from_static("public.example.com"));

    let outcome = pipeline
        .handle(
            Method::DELETE,
            &Uri::from_static("/api/orders/42"),
            headers,
            Bytes::from("payload"),
            remote(),
        )
        .await;

    let response = forwarded(outcome);
    assert_eq!(response.status, StatusCode::OK);

    let echo: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(echo["method"], "POST");
    assert_eq!(echo["override"], "DELETE");
    assert_eq!(echo["path"], "/internal/v1/orders/42");
    // Host pinned to the upstream authority, never the client's value.
    assert_eq!(echo["host"], upstream.to_string());
    assert_eq!(echo["body"], "payload");
}

#[tokio::test]
async fn get_passes_through_unchanged() {
    let upstream = spawn_echo_upstream().await;
    let pipeline = pipeline_for(upstream);

    let outcome = pipeline
        .handle(
            Method::GET,
            &Uri::from_static("/api/orders?page=2"),
            HeaderMap::new(),
            Bytes::new(),
            remote(),
        )
        .await;

    let response = forwarded(outcome);
    let echo: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(echo["method"], "GET");
    assert_eq!(echo["override"], "");
    assert_eq!(echo["path"], "/internal/v1/orders?page=2");
}

#[tokio::test]
async fn default_cors_origin_is_injected() {
    let upstream = spawn_echo_upstream().await;
    let pipeline = pipeline_for(upstream);

    let outcome = pipeline
        .handle(
            Method::GET,
            &Uri::from_static("/api/orders"),
            HeaderMap::new(),
            Bytes::new(),
            remote(),
        )
        .await;

    let response = forwarded(outcome);
    assert_eq!(
        response
            .headers
            .get("access-control-allow-origin")
            .unwrap(),
        "https://app.example.com"
    );
}

#[tokio::test]
async fn upstream_cors_choice_is_preserved() {
    let upstream = spawn_echo_upstream().await;
    let pipeline = pipeline_for(upstream);

    let mut headers = HeaderMap::new();
    headers.insert("x-set-cors", HeaderValue::from_static("1"));

    let outcome = pipeline
        .handle(
            Method::GET,
            &Uri::from_static("/api/orders"),
            headers,
            Bytes::new(),
            remote(),
        )
        .await;

    let response = forwarded(outcome);
    assert_eq!(
        response
            .headers
            .get("access-control-allow-origin")
            .unwrap(),
        "https://upstream-choice.example.com"
    );
}

#[tokio::test]
async fn status_and_body_pass_through_verbatim() {
    let upstream = spawn_echo_upstream().await;
    let pipeline = pipeline_for(upstream);

    let outcome = pipeline
        .handle(
            Method::GET,
            &Uri::from_static("/api/teapot"),
            HeaderMap::new(),
            Bytes::new(),
            remote(),
        )
        .await;

    let response = forwarded(outcome);
    assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
    assert_eq!(&response.body[..], b"short and stout");
}

#[tokio::test]
async fn upstream_redirect_passes_through_verbatim() {
    // A 3xx is a status like any other; the gateway must not follow
    // it and hand back whatever the redirect target returns.
    let upstream = spawn_echo_upstream().await;
    let pipeline = pipeline_for(upstream);

    let outcome = pipeline
        .handle(
            Method::GET,
            &Uri::from_static("/api/moved"),
            HeaderMap::new(),
            Bytes::new(),
            remote(),
        )
        .await;

    let response = forwarded(outcome);
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(
        response.headers.get("location").unwrap(),
        "/internal/v1/orders"
    );
}

#[tokio::test]
async fn upstream_failure_yields_502_after_single_attempt() {
    // An upstream that slams every connection shut; count the dials.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = attempts.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });

    let pipeline = pipeline_for(addr);
    let outcome = pipeline
        .handle(
            Method::GET,
            &Uri::from_static("/api/orders"),
            HeaderMap::new(),
            Bytes::new(),
            remote(),
        )
        .await;

    match outcome {
        PipelineOutcome::Rejected(err) => assert_eq!(err.status_code(), 502),
        other => panic!("expected rejection, got {other:?}"),
    }

    // Give the accept loop a beat to observe any (unexpected) retry.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
