use camino::Utf8PathBuf;
use pipewright_types::DeployMode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error(
        "container conflict: {pkg_type} is installed with deploy_mode '{installed}', cannot add it with '{requested}'"
    )]
    Conflict {
        pkg_type: String,
        installed: DeployMode,
        requested: DeployMode,
    },

    #[error("no Dockerfile at {path}")]
    MissingDockerfile { path: Utf8PathBuf },

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}
