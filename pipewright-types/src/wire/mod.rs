pub mod container_v1;
pub mod pipeline_v1;

pub use container_v1::{ContainerManifestV1, SnapshotV1};
pub use pipeline_v1::{PackageEntryV1, PipelineFileV1};

/// Errors emitted while converting wire models to internal models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    MissingName,
    EmptyPackageType { index: usize },
    InvalidEngine(String),
    InvalidTimestamp(String),
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::MissingName => write!(f, "pipeline file has no name"),
            WireError::EmptyPackageType { index } => {
                write!(f, "package entry {} has an empty pkg_type", index)
            }
            WireError::InvalidEngine(e) => write!(f, "invalid container_engine: {}", e),
            WireError::InvalidTimestamp(t) => write!(f, "invalid created_at timestamp '{}'", t),
        }
    }
}

impl std::error::Error for WireError {}
