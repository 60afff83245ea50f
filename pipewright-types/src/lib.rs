//! Shared data model for the pipewright workspace.
//!
//! # Design constraints
//! - Types under [`wire`] are written to disk and read back by other versions.
//! - In-memory types ([`PipelineState`], [`PackageDefinition`]) stay free of I/O.
//! - Prefer adding optional fields over changing semantics.

pub mod definition;
pub mod env;
pub mod hostfile;
pub mod layout;
pub mod pipeline;
pub mod value;
pub mod wire;

pub use definition::{DeployMode, PackageDefinition, leaf_name};
pub use env::{EnvMap, PRELOAD_KEY};
pub use hostfile::Hostfile;
pub use layout::Layout;
pub use pipeline::{ContainerEngineKind, ContainerSettings, PipelineState};
pub use value::{ConfigMap, ConfigValue};

/// File names used inside pipeline and container directories.
pub mod files {
    pub const PIPELINE_FILE: &str = "pipeline.yaml";
    pub const ENVIRONMENT_FILE: &str = "environment.yaml";
    pub const COMPOSE_FILE: &str = "docker-compose.yaml";
    pub const STATE_FILE: &str = "state.yaml";
}

/// Paths as seen from inside a pipeline container.
pub mod container_paths {
    pub const ROOT: &str = "/root/.pipewright";
    pub const PRIVATE: &str = "/root/.pipewright/private";
    pub const SHARED: &str = "/root/.pipewright/shared";
    pub const HOSTFILE: &str = "/root/.pipewright/hostfile";
    pub const PIPELINE_FILE: &str = "/root/.pipewright/shared/pipeline.yaml";
    pub const SSH_HOST: &str = "/root/.ssh_host";
}
