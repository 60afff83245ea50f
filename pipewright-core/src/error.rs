use camino::Utf8PathBuf;
use pipewright_catalog::CatalogError;
use pipewright_container::ContainerError;
use pipewright_package::SchemaError;
use thiserror::Error;

/// Errors surfaced by pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("package not found: {spec}")]
    PackageNotFound { spec: String },

    #[error(transparent)]
    PackageLoad(CatalogError),

    #[error("missing required configuration for {pkg_id}: {}", options.join(", "))]
    MissingRequiredConfig { pkg_id: String, options: Vec<String> },

    #[error("invalid configuration for {pkg_id}: {source}")]
    InvalidConfig {
        pkg_id: String,
        #[source]
        source: SchemaError,
    },

    #[error("id conflict on '{pkg_id}': {detail}")]
    IdConflict { pkg_id: String, detail: String },

    #[error(transparent)]
    ContainerConflict(ContainerError),

    /// A package hook failed while the pipeline was starting.
    #[error("package {pkg_id} failed: {source:#}")]
    Lifecycle {
        pkg_id: String,
        source: anyhow::Error,
    },

    #[error("no pipeline selected (create or load one first)")]
    NoPipeline,

    #[error("pipeline not found: {name}")]
    UnknownPipeline { name: String },

    #[error("package '{pkg_id}' is not in pipeline {pipeline}")]
    UnknownPackage { pipeline: String, pkg_id: String },

    #[error("environment not found: {name}")]
    UnknownEnvironment { name: String },

    #[error("invalid pipeline file {path}: {reason}")]
    InvalidPipelineFile { path: Utf8PathBuf, reason: String },

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    /// 2 for bad user input, 1 for runtime failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::PackageNotFound { .. }
            | PipelineError::PackageLoad(CatalogError::RepositoryNotFound { .. })
            | PipelineError::MissingRequiredConfig { .. }
            | PipelineError::InvalidConfig { .. }
            | PipelineError::IdConflict { .. }
            | PipelineError::ContainerConflict(_)
            | PipelineError::NoPipeline
            | PipelineError::UnknownPipeline { .. }
            | PipelineError::UnknownPackage { .. }
            | PipelineError::UnknownEnvironment { .. }
            | PipelineError::InvalidPipelineFile { .. } => 2,
            PipelineError::PackageLoad(_)
            | PipelineError::Lifecycle { .. }
            | PipelineError::Internal(_) => 1,
        }
    }
}

impl From<CatalogError> for PipelineError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::PackageNotFound { spec } => PipelineError::PackageNotFound { spec },
            other => PipelineError::PackageLoad(other),
        }
    }
}

impl From<ContainerError> for PipelineError {
    fn from(err: ContainerError) -> Self {
        match err {
            ContainerError::Internal(e) => PipelineError::Internal(e),
            other => PipelineError::ContainerConflict(other),
        }
    }
}
