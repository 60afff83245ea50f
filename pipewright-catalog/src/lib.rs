//! Package repositories and the loader.
//!
//! A package type is named `repo.name`. Repositories are consulted in
//! priority order with the builtin repository as last resort; the loader
//! turns a [`PackageDefinition`](pipewright_types::PackageDefinition) into a
//! live [`PackageInstance`].

mod error;
mod instance;
mod loader;
mod registry;
mod repository;
mod script;

pub use error::CatalogError;
pub use instance::PackageInstance;
pub use loader::{PackageLoader, pascal_case};
pub use registry::RepositoryRegistry;
pub use repository::{PackageFactory, Repository, StaticRepository};
pub use script::{ScriptLauncher, ScriptManifest, ScriptPackage, ScriptRepository};
