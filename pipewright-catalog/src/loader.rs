use crate::error::CatalogError;
use crate::instance::PackageInstance;
use crate::registry::RepositoryRegistry;
use camino::Utf8PathBuf;
use pipewright_package::{ConfigSchema, PackageState, PipelineContext};
use pipewright_types::{ConfigMap, ConfigValue, EnvMap, PackageDefinition};
use tracing::debug;

pub const DEFAULT_DBG_PORT: i64 = 50000;

/// Resolves package types and creates [`PackageInstance`]s.
pub struct PackageLoader<'a> {
    registry: &'a RepositoryRegistry,
}

impl<'a> PackageLoader<'a> {
    pub fn new(registry: &'a RepositoryRegistry) -> Self {
        Self { registry }
    }

    /// Resolve a bare or qualified spec to its qualified `repo.name` type.
    pub fn resolve_type(&self, spec: &str) -> Result<String, CatalogError> {
        let (repo, name) = self.registry.resolve(spec)?;
        Ok(format!("{}.{}", repo, name))
    }

    /// Instantiate the package a definition describes.
    ///
    /// The instance starts from a copy of `pipeline_env`, gets its per-package
    /// directories created and has its initializer run.
    pub fn instantiate(
        &self,
        def: &PackageDefinition,
        pipeline_env: &EnvMap,
        ctx: PipelineContext,
    ) -> Result<PackageInstance<'a>, CatalogError> {
        let (repo_name, name) = self.registry.resolve(&def.pkg_type)?;
        let qualified = format!("{}.{}", repo_name, name);
        let repo = self
            .registry
            .repository(&repo_name)
            .ok_or_else(|| CatalogError::RepositoryNotFound {
                repo: repo_name.clone(),
            })?;
        let type_name = pascal_case(&name);
        let load_err = |source: anyhow::Error| CatalogError::PackageLoad {
            repo_path: repo.path().to_owned(),
            qualified: qualified.clone(),
            type_name: type_name.clone(),
            source,
        };

        let mut base = repo.load(&name, &type_name).map_err(load_err)?;
        let mut state = PackageState::new(def, pipeline_env, ctx);
        state.pkg_type = qualified.clone();
        state
            .config
            .entry("do_dbg".into())
            .or_insert(ConfigValue::Bool(false));
        state
            .config
            .entry("dbg_port".into())
            .or_insert(ConfigValue::Int(DEFAULT_DBG_PORT));
        state.ensure_dirs().map_err(load_err)?;
        base.init(&mut state).map_err(load_err)?;
        debug!(pkg_id = %def.pkg_id, pkg_type = %qualified, "instantiated package");

        Ok(PackageInstance::new(repo, name, type_name, base, state))
    }

    /// The full option schema of a package type, without instantiating it.
    pub fn schema(&self, spec: &str) -> Result<ConfigSchema, CatalogError> {
        let (repo_name, name) = self.registry.resolve(spec)?;
        let qualified = format!("{}.{}", repo_name, name);
        let repo = self
            .registry
            .repository(&repo_name)
            .ok_or_else(|| CatalogError::RepositoryNotFound {
                repo: repo_name.clone(),
            })?;
        let type_name = pascal_case(&name);
        let base = repo
            .load(&name, &type_name)
            .map_err(|source| CatalogError::PackageLoad {
                repo_path: repo.path().to_owned(),
                qualified,
                type_name,
                source,
            })?;
        Ok(ConfigSchema::with_common(base.options()))
    }

    /// Directory holding the package's sources, when its repository has one.
    pub fn package_dir(&self, spec: &str) -> Result<Option<Utf8PathBuf>, CatalogError> {
        let (repo_name, name) = self.registry.resolve(spec)?;
        let repo = self
            .registry
            .repository(&repo_name)
            .ok_or(CatalogError::RepositoryNotFound { repo: repo_name })?;
        Ok(repo.package_dir(&name))
    }

    /// Defaults of every option of a package type.
    pub fn default_config(&self, spec: &str) -> Result<ConfigMap, CatalogError> {
        Ok(self.schema(spec)?.defaults())
    }
}

/// `adios2_pdf_calc` -> `Adios2PdfCalc`.
pub fn pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}
