//! Configuration for the Portico gateway.
//!
//! The configuration is constructed exactly once at startup (file,
//! environment overrides, or builder) and validated before the server
//! starts. Request-handling code never reads ambient process state:
//! everything it needs flows in through this object.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};
use crate::identity::DEFAULT_IP_HEADER_ORDER;
use crate::method_override::{MethodOverride, DEFAULT_OVERRIDE_VERBS};

/// Gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener settings.
    pub server: ServerSettings,
    /// Route mappings, one per logical upstream surface.
    pub routes: Vec<RouteSettings>,
    /// Client identity resolution settings.
    pub identity: IdentitySettings,
    /// Header rewrite settings.
    pub rewrite: RewriteSettings,
    /// Exact path to redirect target, evaluated before any dispatch.
    pub short_circuit: BTreeMap<String, String>,
    /// Upstream dispatch settings.
    pub upstream: UpstreamSettings,
    /// Telemetry settings.
    pub telemetry: TelemetrySettings,
}

impl GatewayConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Load configuration from a TOML or JSON file.
    pub fn from_file(path: impl Into<PathBuf>) -> GatewayResult<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| GatewayError::config(format!("failed to read config file: {e}")))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| GatewayError::config(format!("invalid TOML: {e}"))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| GatewayError::config(format!("invalid JSON: {e}"))),
            _ => Err(GatewayError::config(format!(
                "unsupported config format: {extension}"
            ))),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Variables are prefixed with `PORTICO_` and use uppercase
    /// `snake_case`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(addr) = std::env::var("PORTICO_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }

        if let Ok(port) = std::env::var("PORTICO_LISTEN_PORT") {
            if let Ok(port) = port.parse() {
                self.server.listen_port = port;
            }
        }

        if let Ok(timeout) = std::env::var("PORTICO_UPSTREAM_TIMEOUT") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.upstream.timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(origin) = std::env::var("PORTICO_DEFAULT_CORS_ORIGIN") {
            self.rewrite.default_cors_origin = origin;
        }

        if let Ok(level) = std::env::var("PORTICO_LOG_LEVEL") {
            self.telemetry.log_level = level;
        }

        self
    }

    /// Validate the configuration. Called once at startup; any failure
    /// here aborts the process before a socket is bound.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.routes.is_empty() {
            return Err(GatewayError::config("at least one route is required"));
        }

        for route in &self.routes {
            if route.public_prefix.trim_matches('/').is_empty() {
                return Err(GatewayError::config(format!(
                    "route {}: public_prefix is required",
                    route.name
                )));
            }

            if !route.upstream_base.starts_with("http://")
                && !route.upstream_base.starts_with("https://")
            {
                return Err(GatewayError::config(format!(
                    "route {}: upstream_base must start with http:// or https://",
                    route.name
                )));
            }
        }

        // Duplicate public prefixes are a startup failure, not a
        // first-match-wins surprise at runtime.
        for (i, a) in self.routes.iter().enumerate() {
            for b in &self.routes[i + 1..] {
                if a.public_prefix.trim_matches('/') == b.public_prefix.trim_matches('/') {
                    return Err(GatewayError::config(format!(
                        "duplicate public_prefix: {}",
                        a.public_prefix
                    )));
                }
            }
        }

        MethodOverride::new(&self.rewrite.method_override_verbs)?;

        if self.identity.ip_header_order.is_empty() {
            return Err(GatewayError::config("ip_header_order must not be empty"));
        }

        Ok(())
    }
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind to.
    pub listen_addr: String,
    /// Port the gateway listens on.
    pub listen_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
        }
    }
}

/// Per-route mapping settings: the public prefix to upstream triple.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    /// Logical name of the surface (e.g. "operations", "webhooks").
    pub name: String,
    /// Public-facing path prefix.
    pub public_prefix: String,
    /// Upstream base URL.
    pub upstream_base: String,
    /// Path prefix substituted on the upstream side.
    pub upstream_prefix: String,
}

/// Client identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// Ordered list of headers consulted for the client address.
    pub ip_header_order: Vec<String>,
    /// Reject requests whose client address cannot be resolved.
    pub require_client_ip: bool,
    /// Optional explicit allowlist of client addresses.
    pub ip_allowlist: Vec<String>,
    /// Optional explicit denylist of client addresses.
    pub ip_denylist: Vec<String>,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            ip_header_order: DEFAULT_IP_HEADER_ORDER
                .iter()
                .map(ToString::to_string)
                .collect(),
            require_client_ip: false,
            ip_allowlist: Vec::new(),
            ip_denylist: Vec::new(),
        }
    }
}

/// Header rewrite settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteSettings {
    /// Origin injected into `access-control-allow-origin` when the
    /// upstream response lacks one.
    pub default_cors_origin: String,
    /// Verbs rewritten to POST plus the override marker header.
    pub method_override_verbs: Vec<String>,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            default_cors_origin: "*".to_string(),
            method_override_verbs: DEFAULT_OVERRIDE_VERBS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Upstream dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Timeout for a single upstream attempt.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Health check path probed on each upstream.
    pub health_path: String,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            health_path: "/health".to_string(),
        }
    }
}

/// Telemetry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Service name for logs.
    pub service_name: String,
    /// Log level.
    pub log_level: String,
    /// Emit an access log line per completed request.
    pub access_log: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            service_name: "portico".to_string(),
            log_level: "info".to_string(),
            access_log: true,
        }
    }
}

/// Builder for `GatewayConfig`.
#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Set the listen address.
    #[must_use]
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server.listen_addr = addr.into();
        self
    }

    /// Set the listen port.
    #[must_use]
    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.server.listen_port = port;
        self
    }

    /// Add a route mapping.
    #[must_use]
    pub fn route(
        mut self,
        name: impl Into<String>,
        public_prefix: impl Into<String>,
        upstream_base: impl Into<String>,
        upstream_prefix: impl Into<String>,
    ) -> Self {
        self.config.routes.push(RouteSettings {
            name: name.into(),
            public_prefix: public_prefix.into(),
            upstream_base: upstream_base.into(),
            upstream_prefix: upstream_prefix.into(),
        });
        self
    }

    /// Set the IP header consultation order.
    #[must_use]
    pub fn ip_header_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.identity.ip_header_order = order.into_iter().map(Into::into).collect();
        self
    }

    /// Require a resolvable client address.
    #[must_use]
    pub fn require_client_ip(mut self, require: bool) -> Self {
        self.config.identity.require_client_ip = require;
        self
    }

    /// Set the default CORS origin.
    #[must_use]
    pub fn default_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.config.rewrite.default_cors_origin = origin.into();
        self
    }

    /// Set the verbs that trigger the method-override shim.
    #[must_use]
    pub fn method_override_verbs<I, S>(mut self, verbs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.rewrite.method_override_verbs = verbs.into_iter().map(Into::into).collect();
        self
    }

    /// Add a short-circuit redirect for an exact path.
    #[must_use]
    pub fn short_circuit(mut self, path: impl Into<String>, target: impl Into<String>) -> Self {
        self.config.short_circuit.insert(path.into(), target.into());
        self
    }

    /// Set the upstream timeout.
    #[must_use]
    pub fn upstream_timeout(mut self, timeout: Duration) -> Self {
        self.config.upstream.timeout = timeout;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> GatewayResult<GatewayConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Serde helper for humantime-style durations ("500ms", "30s", "5m").
mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = format!("{}s", duration.as_secs());
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(stripped) = s.strip_suffix("ms") {
            let n: u64 = stripped.trim().parse().map_err(|_| "invalid duration")?;
            Ok(Duration::from_millis(n))
        } else if let Some(stripped) = s.strip_suffix('s') {
            let n: u64 = stripped.trim().parse().map_err(|_| "invalid duration")?;
            Ok(Duration::from_secs(n))
        } else if let Some(stripped) = s.strip_suffix('m') {
            let n: u64 = stripped.trim().parse().map_err(|_| "invalid duration")?;
            Ok(Duration::from_secs(n * 60))
        } else {
            // Assume seconds
            let n: u64 = s.parse().map_err(|_| "invalid duration")?;
            Ok(Duration::from_secs(n))
        }
    }
}
