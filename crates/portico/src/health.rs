//! Health and readiness checks for the gateway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;

/// Health status of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Gateway is healthy.
    Healthy,
    /// Gateway is unhealthy.
    Unhealthy,
}

impl HealthStatus {
    /// Whether the gateway is operational.
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Readiness status of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessStatus {
    /// Gateway is ready to handle traffic.
    Ready,
    /// Gateway is not ready.
    NotReady,
}

impl ReadinessStatus {
    /// Whether the gateway is ready.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Health check response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall health status.
    pub status: HealthStatus,
    /// Individual check results.
    pub checks: Vec<CheckResult>,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Version information.
    pub version: String,
}

/// Readiness check response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Overall readiness status.
    pub status: ReadinessStatus,
    /// Individual check results.
    pub checks: Vec<CheckResult>,
    /// Seconds since the previous round of upstream probes, if any ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_since_last_probe: Option<u64>,
}

/// Result of a single check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Name of the check.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Optional message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Time taken for the check in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: None,
            duration_ms: None,
        }
    }

    /// Create a failing check result.
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: Some(message.into()),
            duration_ms: None,
        }
    }

    /// Set the duration.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    /// Set the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Health checker for the gateway.
#[derive(Debug)]
pub struct HealthChecker {
    /// Start time for uptime calculation.
    start_time: Instant,
    /// Whether the gateway is accepting traffic.
    ready: AtomicBool,
    /// Last upstream probe time.
    last_upstream_check: RwLock<Option<Instant>>,
    /// Configuration.
    config: Arc<GatewayConfig>,
    /// HTTP client for upstream probes.
    client: reqwest::Client,
}

impl HealthChecker {
    /// Create a new health checker.
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            start_time: Instant::now(),
            ready: AtomicBool::new(false),
            last_upstream_check: RwLock::new(None),
            config,
            client,
        }
    }

    /// Mark the gateway as ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Whether the gateway is ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Uptime since startup.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Perform a liveness check.
    pub fn liveness(&self) -> HealthResponse {
        let checks = vec![CheckResult::pass("process").with_message("gateway is running")];

        let all_passed = checks.iter().all(|c| c.passed);
        let status = if all_passed {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        HealthResponse {
            status,
            checks,
            uptime_seconds: self.uptime().as_secs(),
            version: crate::VERSION.to_string(),
        }
    }

    /// Perform a readiness check, probing each configured upstream.
    pub async fn readiness(&self) -> ReadinessResponse {
        let seconds_since_last_probe = self
            .last_upstream_check
            .read()
            .map(|t| t.elapsed().as_secs());

        let mut checks = Vec::new();

        checks.push(CheckResult::pass("config").with_message(format!(
            "{} route(s) mounted",
            self.config.routes.len()
        )));

        for route in &self.config.routes {
            checks.push(self.check_upstream(&route.name, &route.upstream_base).await);
        }

        let all_passed = checks.iter().all(|c| c.passed);
        let status = if all_passed && self.is_ready() {
            ReadinessStatus::Ready
        } else {
            ReadinessStatus::NotReady
        };

        ReadinessResponse {
            status,
            checks,
            seconds_since_last_probe,
        }
    }

    /// Probe one upstream's health endpoint.
    async fn check_upstream(&self, name: &str, upstream_base: &str) -> CheckResult {
        let start = Instant::now();
        let health_url = format!(
            "{}{}",
            upstream_base.trim_end_matches('/'),
            self.config.upstream.health_path
        );

        let result = match self.client.get(&health_url).send().await {
            Ok(resp) => {
                let duration = start.elapsed();

                if resp.status().is_success() {
                    CheckResult::pass(format!("upstream:{name}"))
                        .with_message(format!("status {}", resp.status()))
                        .with_duration(duration)
                } else {
                    CheckResult::fail(
                        format!("upstream:{name}"),
                        format!("unhealthy status: {}", resp.status()),
                    )
                    .with_duration(duration)
                }
            }
            Err(e) => CheckResult::fail(
                format!("upstream:{name}"),
                format!("connection failed: {e}"),
            ),
        };

        // Probe time is recorded regardless of the outcome.
        *self.last_upstream_check.write() = Some(Instant::now());

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Arc<GatewayConfig> {
        Arc::new(
            GatewayConfig::builder()
                .route("operations", "/api", "http://127.0.0.1:9", "/internal/v1")
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_status_predicates() {
        assert!(HealthStatus::Healthy.is_operational());
        assert!(!HealthStatus::Unhealthy.is_operational());
        assert!(ReadinessStatus::Ready.is_ready());
        assert!(!ReadinessStatus::NotReady.is_ready());
    }

    #[test]
    fn test_check_result() {
        let pass = CheckResult::pass("test");
        assert!(pass.passed);

        let fail = CheckResult::fail("test", "error message");
        assert!(!fail.passed);
        assert_eq!(fail.message, Some("error message".to_string()));

        let with_duration = CheckResult::pass("test").with_duration(Duration::from_millis(100));
        assert_eq!(with_duration.duration_ms, Some(100));
    }

    #[test]
    fn test_liveness() {
        let checker = HealthChecker::new(config());
        let response = checker.liveness();
        assert_eq!(response.status, HealthStatus::Healthy);
        assert!(!response.checks.is_empty());
    }

    #[test]
    fn test_ready_state() {
        let checker = HealthChecker::new(config());
        assert!(!checker.is_ready());
        checker.set_ready(true);
        assert!(checker.is_ready());
    }

    #[tokio::test]
    async fn test_readiness_reports_unreachable_upstream() {
        let checker = HealthChecker::new(config());
        checker.set_ready(true);

        let response = checker.readiness().await;
        assert_eq!(response.status, ReadinessStatus::NotReady);
        assert!(response.checks.iter().any(|c| !c.passed));
    }

    #[tokio::test]
    async fn test_readiness_reports_time_since_previous_probe() {
        let checker = HealthChecker::new(config());

        // No probe has run before the first readiness call.
        let first = checker.readiness().await;
        assert!(first.seconds_since_last_probe.is_none());

        let second = checker.readiness().await;
        assert!(second.seconds_since_last_probe.is_some());
    }
}
