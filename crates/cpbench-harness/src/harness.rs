//! Shared handle passed to every pipeline stage.

use std::sync::Arc;

use cpbench_core::{HarnessConfig, ModelRegistry};

use crate::tool::{ProcessExecutor, ToolExecutor};

/// Tool executor, configuration and model registry used by every stage.
///
/// Cheap to clone; all three parts are shared read-only.
#[derive(Clone)]
pub struct Harness {
    executor: Arc<dyn ToolExecutor>,
    config: Arc<HarnessConfig>,
    registry: Arc<ModelRegistry>,
}

impl Harness {
    pub fn new(
        executor: Arc<dyn ToolExecutor>,
        config: HarnessConfig,
        registry: ModelRegistry,
    ) -> Self {
        Self {
            executor,
            config: Arc::new(config),
            registry: Arc::new(registry),
        }
    }

    /// Real processes and the built-in models.
    pub fn with_processes(config: HarnessConfig) -> Self {
        let registry = ModelRegistry::builtin(&config);
        Self::new(Arc::new(ProcessExecutor), config, registry)
    }

    pub fn executor(&self) -> &dyn ToolExecutor {
        self.executor.as_ref()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
