//! Port traits abstracting I/O away from the orchestrator.

use pipewright_container::ContainerEngine;
use pipewright_types::{ContainerEngineKind, EnvMap};

/// Hands out a container engine for the pipeline's configured kind.
pub trait EngineProvider {
    fn engine(&self, kind: ContainerEngineKind) -> Box<dyn ContainerEngine + '_>;
}

/// Named environments and the ambient process environment.
pub trait EnvironmentSource {
    /// Snapshot of the current process environment.
    fn capture(&self) -> anyhow::Result<EnvMap>;
    fn load(&self, name: &str) -> anyhow::Result<Option<EnvMap>>;
    fn save(&self, name: &str, env: &EnvMap) -> anyhow::Result<()>;
    /// Names of stored environments, sorted.
    fn list(&self) -> anyhow::Result<Vec<String>>;
}

/// The process-wide "current pipeline" pointer.
pub trait CurrentPipelineStore {
    fn get(&self) -> anyhow::Result<Option<String>>;
    fn set(&self, name: Option<&str>) -> anyhow::Result<()>;
}
