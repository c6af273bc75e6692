//! The gateway registry: mounted route pipelines keyed by public prefix.
//!
//! The set of mappings is fixed after initialization. Registration of a
//! duplicate public prefix is a configuration error that fails startup.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::pipeline::RoutePipeline;
use crate::proxy::UpstreamClient;

/// Registry of mounted route pipelines.
///
/// Read-only after startup; shared freely across request tasks.
#[derive(Default)]
pub struct GatewayRegistry {
    pipelines: Vec<Arc<RoutePipeline>>,
}

impl GatewayRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configuration, one pipeline per route.
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let mut registry = Self::new();
        for settings in &config.routes {
            let client = UpstreamClient::new(config.upstream.timeout)?;
            let pipeline = RoutePipeline::new(settings, config, client)?;
            registry.register(pipeline)?;
        }
        Ok(registry)
    }

    /// Mount a pipeline. Fails on a duplicate public prefix.
    pub fn register(&mut self, pipeline: RoutePipeline) -> GatewayResult<()> {
        let prefix = pipeline.mapping().public_prefix();
        if self
            .pipelines
            .iter()
            .any(|p| p.mapping().public_prefix() == prefix)
        {
            return Err(GatewayError::config(format!(
                "duplicate public_prefix: {prefix}"
            )));
        }

        self.pipelines.push(Arc::new(pipeline));
        Ok(())
    }

    /// Resolve the pipeline mounted for a path.
    ///
    /// The longest matching prefix wins, so `/api/admin` can be mounted
    /// alongside `/api`.
    pub fn resolve(&self, path: &str) -> Option<Arc<RoutePipeline>> {
        self.pipelines
            .iter()
            .filter(|p| p.mapping().matches(path))
            .max_by_key(|p| p.mapping().public_prefix().len())
            .cloned()
    }

    /// Number of mounted pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Iterate over the mounted pipelines.
    pub fn pipelines(&self) -> impl Iterator<Item = &Arc<RoutePipeline>> {
        self.pipelines.iter()
    }
}
