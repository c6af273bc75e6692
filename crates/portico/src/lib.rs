//! Portico - Edge gateway for internal APIs
//!
//! Portico sits in front of an internal API and forwards public traffic
//! to it under path-rewritten routes, normalizing client identity and
//! method semantics the internal service cannot handle itself.
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────────────────────────────────────┐
//!              │              Portico Gateway             │
//!   public     │  ┌────────────────────────────────────┐  │    internal
//!  ─────────►  │  │ short-circuit │ identity │ method  │  │  ─────────►
//!   /api/...   │  │ rules         │ resolver │ override│  │  /internal/v1/...
//!              │  │ host pinning  │ CORS injection     │  │
//!  ◄─────────  │  └────────────────────────────────────┘  │  ◄─────────
//!              │     one pipeline per mounted prefix      │
//!              └──────────────────────────────────────────┘
//! ```
//!
//! # Features
//!
//! - **Prefix routing**: `{public_prefix}/X` dispatches to
//!   `{upstream_base}{upstream_prefix}/X`, one upstream per prefix.
//! - **Client-IP resolution**: ordered, configurable forwarding-header
//!   consultation with a transport-address fallback.
//! - **Method override**: DELETE/PATCH/PUT rewritten to POST plus
//!   `x-http-method-override` for verb-restricted upstreams.
//! - **Header rewriting**: host pinning outbound, default CORS origin
//!   injection inbound, deterministic removals/overrides/additions.
//! - **Short circuits**: exact-path redirects that never touch the upstream.
//!
//! # Example Usage
//!
//! ```bash
//! # Run the gateway with a configuration file
//! $ portico --config /etc/portico/gateway.toml
//!
//! # Run with environment variable overrides
//! $ PORTICO_LISTEN_PORT=8080 portico --config gateway.toml
//! ```

#![doc(html_root_url = "https://docs.rs/portico/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod identity;
pub mod method_override;
pub mod pipeline;
pub mod proxy;
pub mod registry;
pub mod rewrite;
pub mod route;
pub mod server;

pub use config::{GatewayConfig, GatewayConfigBuilder};
pub use error::{GatewayError, GatewayResult};
pub use identity::{ClientIdentity, IdentitySource};
pub use pipeline::{PipelineOutcome, RoutePipeline};
pub use registry::GatewayRegistry;
pub use route::RouteMapping;
pub use server::GatewayServer;

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
