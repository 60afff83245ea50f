//! The pipeline orchestrator.
//!
//! A [`Pipeline`] is an ordered list of package definitions plus the
//! environment threaded through them. `start` is fail-fast and runs packages
//! in append order; `stop`, `kill`, `clean` and `status` are best-effort and
//! report the aliases that failed instead of aborting.

use crate::error::PipelineError;
use crate::persist;
use crate::settings::Runtime;
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use fs_err as fs;
use pipewright_catalog::PackageInstance;
use pipewright_container::{
    BatchOutcome, ComposeAction, ComposeInput, ContainerBuildCoordinator, ContainerError,
    ContainerMember, write_compose,
};
use pipewright_package::PackageKind;
use pipewright_render::{StatusLine, render_pipeline, render_schema_help, render_status};
use pipewright_types::layout::PackageDirs;
use pipewright_types::wire::PipelineFileV1;
use pipewright_types::{
    ConfigMap, ContainerEngineKind, ContainerSettings, DeployMode, EnvMap, PackageDefinition, PipelineState, container_paths,
    files, leaf_name,
};
use serde_yaml::Value;
use std::collections::BTreeSet;
use tracing::{error, info, warn};

/// Result of [`Pipeline::configure_package`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigureOutcome {
    Configured { config: ConfigMap },
    /// The pipeline kept its previous configuration.
    Rejected { error: String, help: String },
}

/// A loaded pipeline bound to its runtime.
pub struct Pipeline<'rt> {
    rt: &'rt Runtime,
    state: PipelineState,
}

impl<'rt> Pipeline<'rt> {
    pub fn from_state(rt: &'rt Runtime, state: PipelineState) -> Self {
        Self { rt, state }
    }

    /// Start an empty pipeline, persist it and make it current.
    pub fn create(rt: &'rt Runtime, name: &str) -> Result<Self, PipelineError> {
        if name.trim().is_empty() || name.contains(['/', '\\']) {
            return Err(anyhow::anyhow!("invalid pipeline name '{}'", name).into());
        }
        let mut state = PipelineState::new(name);
        state.created_at = Some(Utc::now());
        let pipeline = Self { rt, state };
        pipeline.save()?;
        rt.current.set(Some(name))?;
        info!(pipeline = %name, "created pipeline");
        Ok(pipeline)
    }

    /// Re-read a pipeline from its persisted files.
    pub fn open(rt: &'rt Runtime, name: &str) -> Result<Self, PipelineError> {
        let state = persist::load_state(&rt.layout, name)?;
        Ok(Self { rt, state })
    }

    pub fn current(rt: &'rt Runtime) -> Result<Self, PipelineError> {
        let name = rt.current.get()?.ok_or(PipelineError::NoPipeline)?;
        Self::open(rt, &name)
    }

    /// Replace the pipeline named by an external pipeline file.
    ///
    /// Bare package types are resolved, file configs overlay the plugin
    /// defaults and the environment is resolved from the `env` reference.
    /// The result is saved and becomes the current pipeline.
    pub fn load_file(rt: &'rt Runtime, path: &Utf8Path) -> Result<Self, PipelineError> {
        let file = persist::read_pipeline_file(path)?;
        let invalid = |reason: String| PipelineError::InvalidPipelineFile {
            path: path.to_path_buf(),
            reason,
        };

        let mut seen = BTreeSet::new();
        for entry in file.pkgs.iter().chain(&file.interceptors) {
            let alias = entry.alias();
            if !seen.insert(alias.clone()) {
                return Err(PipelineError::IdConflict {
                    pkg_id: alias,
                    detail: format!("defined more than once in {}", path),
                });
            }
        }

        let env_ref = file.env.clone();
        let mut state = file
            .into_state(path.file_stem())
            .map_err(|e| invalid(e.to_string()))?;

        let loader = rt.loader();
        for def in state
            .packages
            .iter_mut()
            .chain(state.interceptors.values_mut())
        {
            let pkg_type = loader.resolve_type(&def.pkg_type)?;
            let mut config = loader.default_config(&pkg_type)?;
            config.extend(std::mem::take(&mut def.config));
            def.pkg_type = pkg_type;
            def.config = config;
        }

        state.env = resolve_environment(rt, env_ref.as_ref(), path)?;
        state.created_at = Some(Utc::now());
        state.last_loaded_file = Some(
            path.canonicalize_utf8()
                .with_context(|| format!("resolve {}", path))?,
        );

        let pipeline = Self { rt, state };
        pipeline.save()?;
        info!(
            pipeline = %pipeline.state.name,
            file = %path,
            packages = pipeline.state.packages.len(),
            interceptors = pipeline.state.interceptors.len(),
            "loaded pipeline file"
        );
        if pipeline.state.container.is_containerized() {
            pipeline.build_container_if_needed(false)?;
        }
        rt.current.set(Some(&pipeline.state.name))?;
        Ok(pipeline)
    }

    /// Clean a pipeline, then remove its directories.
    ///
    /// Cleaning failures are logged; they never block removal. Destroying the
    /// current pipeline clears the pointer.
    pub fn destroy(rt: &'rt Runtime, name: Option<&str>) -> Result<String, PipelineError> {
        let current = rt.current.get()?;
        let name = match name {
            Some(n) => n.to_string(),
            None => current.clone().ok_or(PipelineError::NoPipeline)?,
        };
        if !rt.layout.pipeline_config_dir(&name).is_dir() {
            return Err(PipelineError::UnknownPipeline { name });
        }

        match Self::open(rt, &name) {
            Ok(pipeline) => {
                let failed = pipeline.clean();
                if !failed.is_empty() {
                    warn!(pipeline = %name, ?failed, "clean before destroy had failures");
                }
            }
            Err(e) => warn!(pipeline = %name, error = %e, "could not clean before destroy"),
        }

        persist::remove_pipeline_dirs(&rt.layout, &name)?;
        if current.as_deref() == Some(name.as_str()) {
            rt.current.set(None)?;
            info!(pipeline = %name, "cleared current pipeline");
        }
        info!(pipeline = %name, "destroyed pipeline");
        Ok(name)
    }

    /// Persisted pipeline names and the current one.
    pub fn list(rt: &Runtime) -> Result<(Vec<String>, Option<String>), PipelineError> {
        Ok((persist::list_pipelines(&rt.layout)?, rt.current.get()?))
    }

    /// Option table of a package type, without a pipeline.
    pub fn package_help(rt: &Runtime, spec: &str) -> Result<String, PipelineError> {
        let loader = rt.loader();
        let pkg_type = loader.resolve_type(spec)?;
        let schema = loader.schema(&pkg_type)?;
        Ok(render_schema_help(&pkg_type, &schema))
    }

    /// The README shipped with a package type, or a note saying where it was
    /// expected.
    pub fn package_readme(rt: &Runtime, spec: &str) -> Result<String, PipelineError> {
        let loader = rt.loader();
        let pkg_type = loader.resolve_type(spec)?;
        let Some(dir) = loader.package_dir(&pkg_type)? else {
            return Ok(format!("No README found for package {}\n", pkg_type));
        };
        let path = dir.join("README.md");
        if !path.is_file() {
            return Ok(format!(
                "No README found for package {}\nExpected location: {}\n",
                pkg_type, path
            ));
        }
        let text = fs::read_to_string(&path).with_context(|| format!("read {}", path))?;
        Ok(format!("=== README for {} ===\nLocation: {}\n\n{}", pkg_type, path, text))
    }

    /// Rebuild a recorded image from its stored Dockerfile.
    pub fn update_image(
        rt: &Runtime,
        image: &str,
        engine: ContainerEngineKind,
        no_cache: bool,
    ) -> Result<(), PipelineError> {
        let store = rt.container_store();
        let engine = rt.engines.engine(engine);
        let coordinator =
            ContainerBuildCoordinator::new(&store, &*engine, image, ContainerSettings::default().base);
        coordinator.build(no_cache)?;
        info!(image, "updated container image");
        Ok(())
    }

    // ---- accessors ------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn into_state(self) -> PipelineState {
        self.state
    }

    pub fn save(&self) -> Result<(), PipelineError> {
        persist::save_state(&self.rt.layout, &self.state)?;
        Ok(())
    }

    pub fn print(&self) -> String {
        render_pipeline(&self.state)
    }

    pub fn pipeline_dirs(&self) -> [Utf8PathBuf; 3] {
        self.rt.layout.pipeline_dirs(&self.state.name)
    }

    pub fn package_dirs(&self, pkg_id: &str) -> Result<PackageDirs, PipelineError> {
        self.require(pkg_id)?;
        Ok(self.rt.layout.package_dirs(&self.state.name, pkg_id))
    }

    fn require(&self, pkg_id: &str) -> Result<&PackageDefinition, PipelineError> {
        self.state
            .definition(pkg_id)
            .ok_or_else(|| PipelineError::UnknownPackage {
                pipeline: self.state.name.clone(),
                pkg_id: pkg_id.to_string(),
            })
    }

    fn instantiate(&self, def: &PackageDefinition) -> Result<PackageInstance<'rt>, PipelineError> {
        let rt: &'rt Runtime = self.rt;
        let ctx = rt.context(&self.state)?;
        Ok(rt.loader().instantiate(def, &self.state.env, ctx)?)
    }

    // ---- membership -----------------------------------------------------------

    /// Add a package with its defaults plus `overrides`.
    ///
    /// Fails without touching the pipeline when the alias is taken or a
    /// required option is left unset.
    pub fn append(
        &mut self,
        spec: &str,
        alias: Option<&str>,
        overrides: &[String],
    ) -> Result<PackageDefinition, PipelineError> {
        let loader = self.rt.loader();
        let pkg_type = loader.resolve_type(spec)?;
        let pkg_id = alias
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| leaf_name(&pkg_type).to_string());
        if self.state.contains_id(&pkg_id) {
            return Err(PipelineError::IdConflict {
                detail: format!("alias already used in pipeline {}", self.state.name),
                pkg_id,
            });
        }

        let schema = loader.schema(&pkg_type)?;
        let mut config = schema.defaults();
        let parsed = schema
            .parse_overrides(overrides)
            .map_err(|source| PipelineError::InvalidConfig {
                pkg_id: pkg_id.clone(),
                source,
            })?;
        config.extend(parsed);
        let missing = schema.missing_required(&config);
        if !missing.is_empty() {
            return Err(PipelineError::MissingRequiredConfig {
                pkg_id,
                options: missing,
            });
        }

        let def = PackageDefinition::new(&self.state.name, pkg_type, pkg_id).with_config(config);
        let kind = self.instantiate(&def)?.kind();
        if kind == PackageKind::Interceptor {
            self.state
                .interceptors
                .insert(def.pkg_id.clone(), def.clone());
        } else {
            self.state.packages.push(def.clone());
        }
        self.save()?;
        info!(pipeline = %self.state.name, pkg_id = %def.pkg_id, pkg_type = %def.pkg_type, %kind, "appended package");
        Ok(def)
    }

    /// Remove by alias; an unknown alias is logged and ignored.
    pub fn remove(&mut self, pkg_id: &str) -> Result<Option<PackageDefinition>, PipelineError> {
        match self.state.remove(pkg_id) {
            Some(def) => {
                self.save()?;
                info!(pipeline = %self.state.name, pkg_id, pkg_type = %def.pkg_type, "removed package");
                Ok(Some(def))
            }
            None => {
                warn!(
                    pipeline = %self.state.name,
                    pkg_id,
                    available = ?self.state.package_ids(),
                    "package not in pipeline"
                );
                Ok(None)
            }
        }
    }

    // ---- configuration --------------------------------------------------------

    /// Reconfigure one package.
    ///
    /// A rejected configuration is reported in the outcome together with the
    /// package's option help; the pipeline keeps its previous state.
    pub fn configure_package(
        &mut self,
        pkg_id: &str,
        overrides: &[String],
    ) -> Result<ConfigureOutcome, PipelineError> {
        let def = self.require(pkg_id)?.clone();
        let mut inst = self.instantiate(&def)?;
        let before = self.state.clone();
        match self.try_configure(&mut inst, &def, overrides) {
            Ok(config) => {
                info!(pipeline = %self.state.name, pkg_id, "configured package");
                Ok(ConfigureOutcome::Configured { config })
            }
            Err(e) => {
                self.state = before;
                warn!(pipeline = %self.state.name, pkg_id, error = %format!("{e:#}"), "configuration rejected");
                Ok(ConfigureOutcome::Rejected {
                    error: format!("{e:#}"),
                    help: render_schema_help(&def.pkg_type, &inst.schema()),
                })
            }
        }
    }

    fn try_configure(
        &mut self,
        inst: &mut PackageInstance<'rt>,
        def: &PackageDefinition,
        overrides: &[String],
    ) -> anyhow::Result<ConfigMap> {
        let parsed = inst.schema().parse_overrides(overrides)?;
        let config = inst.configure(&parsed)?;
        let mut updated = def.clone();
        updated.config = config.clone();
        if let Some(d) = self.state.definition_mut(&def.pkg_id) {
            d.config = config.clone();
        }
        self.state.env.extend(inst.state().env());
        let container = &self.state.container;
        if container.is_containerized()
            && !container.is_prebuilt()
            && updated.deploy_mode() == DeployMode::Container
        {
            let member = ContainerMember::new(
                updated.pkg_type.clone(),
                updated.deploy_mode(),
                inst.augment_container()?,
            );
            let rebuilt = self.with_coordinator(|c| c.register_incremental(&member, false))?;
            info!(pkg_id = %def.pkg_id, rebuilt, "attached package to container image");
        }
        self.save()?;
        Ok(config)
    }

    /// Re-apply every persisted config: interceptors first, then packages.
    pub fn configure_all(&mut self) -> Result<(), PipelineError> {
        let members: Vec<PackageDefinition> = self
            .state
            .interceptors
            .values()
            .chain(&self.state.packages)
            .cloned()
            .collect();
        for def in members {
            info!(pkg_id = %def.pkg_id, pkg_type = %def.pkg_type, "[CONFIGURE] begin");
            let lifecycle = |source: anyhow::Error| PipelineError::Lifecycle {
                pkg_id: def.pkg_id.clone(),
                source,
            };
            let mut inst = self
                .instantiate(&def)
                .map_err(|e| lifecycle(anyhow::Error::from(e)))?;
            let config = inst.configure(&ConfigMap::new()).map_err(lifecycle)?;
            if let Some(d) = self.state.definition_mut(&def.pkg_id) {
                d.config = config;
            }
            self.state.env.extend(inst.state().env());
        }
        self.save()
    }

    /// Attach new container-mode members to the image (rebuilding it when any
    /// was new), reconfigure everything, and optionally force a rebuild.
    pub fn update(&mut self, rebuild: bool, no_cache: bool) -> Result<(), PipelineError> {
        let rebuilt = self.attach_container_members(no_cache)?;
        self.configure_all()?;
        let container = &self.state.container;
        if rebuild && container.is_containerized() && !container.is_prebuilt() {
            if rebuilt {
                info!(pipeline = %self.state.name, "image already rebuilt");
            } else {
                self.with_coordinator(|c| c.build(no_cache))?;
            }
        }
        Ok(())
    }

    // ---- lifecycle ------------------------------------------------------------

    /// Start packages in order, threading the environment forward.
    ///
    /// Interceptors listed by a package modify its environment first. The
    /// first failure aborts, naming the package.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.state.container.is_containerized() {
            return self.compose(ComposeAction::Up);
        }
        info!(pipeline = %self.state.name, packages = self.state.packages.len(), "starting pipeline");
        let packages = self.state.packages.clone();
        for def in &packages {
            info!(pkg_id = %def.pkg_id, pkg_type = %def.pkg_type, "[START] begin");
            let lifecycle = |source: anyhow::Error| PipelineError::Lifecycle {
                pkg_id: def.pkg_id.clone(),
                source,
            };
            let mut inst = self
                .instantiate(def)
                .map_err(|e| lifecycle(anyhow::Error::from(e)))?;
            self.apply_interceptors(&mut inst, def);
            inst.start().map_err(lifecycle)?;
            self.state.env.extend(inst.state().env());
            info!(pkg_id = %def.pkg_id, "[START] end");
        }
        Ok(())
    }

    fn apply_interceptors(&self, target: &mut PackageInstance<'rt>, def: &PackageDefinition) {
        for alias in def.interceptors() {
            let Some(icpt) = self.state.interceptors.get(&alias) else {
                warn!(pkg_id = %def.pkg_id, interceptor = %alias, "interceptor not in pipeline");
                continue;
            };
            if let Err(e) = self.apply_interceptor(target, icpt) {
                error!(pkg_id = %def.pkg_id, interceptor = %alias, error = %format!("{e:#}"), "interceptor failed");
            }
        }
    }

    /// Alias the interceptor's environment to the target's, then let it
    /// modify the shared store.
    fn apply_interceptor(
        &self,
        target: &mut PackageInstance<'rt>,
        icpt: &PackageDefinition,
    ) -> anyhow::Result<()> {
        let mut inst = self.instantiate(icpt)?;
        if inst.kind() != PackageKind::Interceptor {
            warn!(interceptor = %icpt.pkg_id, kind = %inst.kind(), "not an interceptor; skipped");
            return Ok(());
        }
        info!(interceptor = %icpt.pkg_id, pkg_type = %icpt.pkg_type, target = %target.pkg_id(), "[MODIFY_ENV]");
        inst.state_mut().alias_env_of(target.state());
        inst.modify_env()
    }

    /// Stop packages in reverse order; returns the aliases that failed.
    pub fn stop(&self) -> Vec<String> {
        if self.state.container.is_containerized() {
            return self.compose_best_effort(&[ComposeAction::Down]);
        }
        self.best_effort("STOP", true, |inst| inst.stop())
    }

    /// Kill packages in reverse order; returns the aliases that failed.
    pub fn kill(&self) -> Vec<String> {
        if self.state.container.is_containerized() {
            return self.compose_best_effort(&[ComposeAction::Kill, ComposeAction::Down]);
        }
        self.best_effort("KILL", true, |inst| inst.kill())
    }

    /// Clean packages in order; returns the aliases that failed.
    pub fn clean(&self) -> Vec<String> {
        self.best_effort("CLEAN", false, |inst| inst.clean())
    }

    /// `start` then `stop`; stop runs even when start failed.
    pub fn run(&mut self) -> Result<(), PipelineError> {
        let started = self.start();
        if let Err(e) = &started {
            error!(pipeline = %self.state.name, error = %e, "start failed; stopping");
        }
        let failed = self.stop();
        if !failed.is_empty() {
            warn!(pipeline = %self.state.name, ?failed, "stop had failures");
        }
        started
    }

    pub fn status(&self) -> Vec<StatusLine> {
        self.state
            .packages
            .iter()
            .map(|def| {
                let status = self
                    .instantiate(def)
                    .map_err(anyhow::Error::from)
                    .and_then(|mut inst| inst.status())
                    .map_err(|e| {
                        warn!(pkg_id = %def.pkg_id, error = %format!("{e:#}"), "status failed");
                        format!("{e:#}")
                    });
                (def.pkg_id.clone(), status)
            })
            .collect()
    }

    pub fn status_report(&self) -> String {
        render_status(&self.state.name, &self.status())
    }

    fn best_effort(
        &self,
        phase: &'static str,
        reverse: bool,
        hook: impl Fn(&mut PackageInstance<'rt>) -> anyhow::Result<()>,
    ) -> Vec<String> {
        let mut order: Vec<&PackageDefinition> = self.state.packages.iter().collect();
        if reverse {
            order.reverse();
        }
        let mut failed = Vec::new();
        for def in order {
            info!(phase, pkg_id = %def.pkg_id, pkg_type = %def.pkg_type, "begin");
            let result = self
                .instantiate(def)
                .map_err(anyhow::Error::from)
                .and_then(|mut inst| hook(&mut inst));
            if let Err(e) = result {
                error!(phase, pkg_id = %def.pkg_id, error = %format!("{e:#}"), "package failed");
                failed.push(def.pkg_id.clone());
            }
        }
        failed
    }

    // ---- single package operations ---------------------------------------------

    pub fn package_status(&self, pkg_id: &str) -> Result<String, PipelineError> {
        let def = self.require(pkg_id)?;
        let mut inst = self.instantiate(def)?;
        inst.status().map_err(|source| PipelineError::Lifecycle {
            pkg_id: pkg_id.to_string(),
            source,
        })
    }

    pub fn augment_package(&self, pkg_id: &str) -> Result<String, PipelineError> {
        let def = self.require(pkg_id)?;
        let inst = self.instantiate(def)?;
        inst.augment_container()
            .map_err(|source| PipelineError::Lifecycle {
                pkg_id: pkg_id.to_string(),
                source,
            })
    }

    // ---- environments -----------------------------------------------------------

    /// Replace the pipeline environment with the current process environment.
    pub fn env_build(&mut self) -> Result<(), PipelineError> {
        self.state.env = self.rt.environments.capture()?;
        self.save()?;
        info!(pipeline = %self.state.name, vars = self.state.env.len(), "captured environment");
        Ok(())
    }

    /// Replace the pipeline environment with a named one.
    pub fn env_copy(&mut self, name: &str) -> Result<(), PipelineError> {
        self.state.env =
            self.rt
                .environments
                .load(name)?
                .ok_or_else(|| PipelineError::UnknownEnvironment {
                    name: name.to_string(),
                })?;
        self.save()?;
        info!(pipeline = %self.state.name, env = name, "copied environment");
        Ok(())
    }

    // ---- containers -------------------------------------------------------------

    fn image_name(&self) -> String {
        self.state
            .container
            .image_name()
            .unwrap_or(&self.state.name)
            .to_string()
    }

    fn with_coordinator<T>(
        &self,
        f: impl FnOnce(&ContainerBuildCoordinator<'_>) -> Result<T, ContainerError>,
    ) -> Result<T, PipelineError> {
        let store = self.rt.container_store();
        let engine = self.rt.engines.engine(self.state.container.engine);
        let coordinator = ContainerBuildCoordinator::new(
            &store,
            &*engine,
            self.image_name(),
            self.state.container.base.clone(),
        );
        Ok(f(&coordinator)?)
    }

    fn container_member(&self, def: &PackageDefinition) -> Result<ContainerMember, PipelineError> {
        let fragment = self
            .instantiate(def)?
            .augment_container()
            .map_err(|source| PipelineError::Lifecycle {
                pkg_id: def.pkg_id.clone(),
                source,
            })?;
        Ok(ContainerMember::new(
            def.pkg_type.clone(),
            def.deploy_mode(),
            fragment,
        ))
    }

    /// Load-time container pass: batch rebuild decision, the in-container
    /// pipeline file and the compose file. `None` when not containerized.
    pub fn build_container_if_needed(
        &self,
        no_cache: bool,
    ) -> Result<Option<BatchOutcome>, PipelineError> {
        if !self.state.container.is_containerized() {
            return Ok(None);
        }
        let packages = self
            .state
            .packages
            .iter()
            .map(|def| self.container_member(def))
            .collect::<Result<Vec<_>, _>>()?;
        let interceptors = self
            .state
            .interceptors
            .values()
            .map(|def| self.container_member(def))
            .collect::<Result<Vec<_>, _>>()?;
        let prebuilt = self.state.container.is_prebuilt();
        let outcome =
            self.with_coordinator(|c| c.batch(&packages, &interceptors, prebuilt, no_cache))?;
        self.write_container_pipeline()?;
        self.write_compose_file()?;
        info!(
            pipeline = %self.state.name,
            image = %self.image_name(),
            changed = outcome.changed,
            rebuilt = outcome.rebuilt,
            "container files up to date"
        );
        Ok(Some(outcome))
    }

    /// Register container-mode packages and interceptors one by one, building
    /// once if any was new. Returns whether the image was rebuilt.
    fn attach_container_members(&self, no_cache: bool) -> Result<bool, PipelineError> {
        let container = &self.state.container;
        if !container.is_containerized() || container.is_prebuilt() {
            return Ok(false);
        }
        let members = self
            .state
            .packages
            .iter()
            .chain(self.state.interceptors.values())
            .filter(|def| def.deploy_mode() == DeployMode::Container)
            .map(|def| self.container_member(def))
            .collect::<Result<Vec<_>, _>>()?;
        let rebuilt = self.with_coordinator(|c| c.build_if_needed(&members, no_cache))?;
        self.write_container_pipeline()?;
        self.write_compose_file()?;
        info!(pipeline = %self.state.name, image = %self.image_name(), rebuilt, "container members attached");
        Ok(rebuilt)
    }

    pub fn compose_file(&self) -> Utf8PathBuf {
        self.rt
            .layout
            .pipeline_shared_dir(&self.state.name)
            .join(files::COMPOSE_FILE)
    }

    /// The pipeline file the container runs, inside the shared mount.
    pub fn container_pipeline_file(&self) -> Utf8PathBuf {
        self.rt
            .layout
            .pipeline_shared_dir(&self.state.name)
            .join(files::PIPELINE_FILE)
    }

    fn mounted_hostfile(&self) -> Option<Utf8PathBuf> {
        self.state
            .hostfile
            .clone()
            .or_else(|| self.rt.hostfile.path.clone())
    }

    fn write_container_pipeline(&self) -> anyhow::Result<()> {
        let mut inner = self.state.clone();
        inner.container = ContainerSettings::default();
        inner.last_loaded_file = None;
        inner.hostfile = self
            .mounted_hostfile()
            .map(|_| Utf8PathBuf::from(container_paths::HOSTFILE));
        for def in inner
            .packages
            .iter_mut()
            .chain(inner.interceptors.values_mut())
        {
            def.config.remove("deploy_mode");
        }
        let path = self.container_pipeline_file();
        let text = serde_yaml::to_string(&PipelineFileV1::from(&inner))
            .context("serialize container pipeline")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent))?;
        }
        fs::write(&path, text).with_context(|| format!("write {}", path))
    }

    fn write_compose_file(&self) -> anyhow::Result<Utf8PathBuf> {
        let input = ComposeInput {
            pipeline: self.state.name.clone(),
            image: self.image_name(),
            ssh_port: self.state.container.ssh_port,
            private_dir: self.rt.layout.pipeline_private_dir(&self.state.name),
            shared_dir: self.rt.layout.pipeline_shared_dir(&self.state.name),
            ssh_dir: self.rt.ssh_dir.clone(),
            hostfile: self.mounted_hostfile(),
            extensions: self.state.container.extensions.clone(),
        };
        let path = self.compose_file();
        write_compose(&path, &input)?;
        Ok(path)
    }

    fn compose(&self, action: ComposeAction) -> Result<(), PipelineError> {
        let file = self.write_compose_file()?;
        let hostfile = self.rt.effective_hostfile(&self.state)?;
        let engine = self.rt.engines.engine(self.state.container.engine);
        info!(pipeline = %self.state.name, action = action.args(), "compose");
        engine.compose(&file, action, &hostfile)?;
        Ok(())
    }

    fn compose_best_effort(&self, actions: &[ComposeAction]) -> Vec<String> {
        let mut failed = Vec::new();
        for action in actions {
            if let Err(e) = self.compose(*action) {
                error!(pipeline = %self.state.name, action = action.args(), error = %e, "compose failed");
                failed.push(format!("{}_container", self.state.name));
            }
        }
        failed
    }
}

fn capture_or_empty(rt: &Runtime) -> EnvMap {
    match rt.environments.capture() {
        Ok(env) => env,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "could not capture environment; using an empty one");
            EnvMap::new()
        }
    }
}

/// The `env` key of a pipeline file: absent captures, a name loads (or
/// builds) a stored environment, anything else is rejected.
fn resolve_environment(
    rt: &Runtime,
    env: Option<&Value>,
    path: &Utf8Path,
) -> Result<EnvMap, PipelineError> {
    let invalid = |reason: &str| PipelineError::InvalidPipelineFile {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    match env {
        None | Some(Value::Null) => Ok(capture_or_empty(rt)),
        Some(Value::String(name)) => match rt.environments.load(name)? {
            Some(env) => Ok(env),
            None => {
                info!(env = %name, "environment missing; building it");
                let env = capture_or_empty(rt);
                rt.environments.save(name, &env)?;
                Ok(env)
            }
        },
        Some(Value::Mapping(_)) => Err(invalid(
            "Inline environment dictionaries are not supported; name a stored environment",
        )),
        Some(_) => Err(invalid("env must be the name of a stored environment")),
    }
}
