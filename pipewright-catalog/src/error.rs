use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// No repository provides the requested type.
    #[error("package not found: {spec}")]
    PackageNotFound { spec: String },

    /// A qualified type names a repository that is not registered.
    #[error("repository not found: {repo}")]
    RepositoryNotFound { repo: String },

    /// The type was found but could not be loaded or initialized.
    #[error("failed to load package '{qualified}': type {type_name} from {repo_path}: {source:#}")]
    PackageLoad {
        repo_path: Utf8PathBuf,
        qualified: String,
        type_name: String,
        source: anyhow::Error,
    },
}
