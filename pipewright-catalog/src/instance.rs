use crate::error::CatalogError;
use crate::repository::Repository;
use anyhow::Context;
use pipewright_package::{ConfigSchema, Package, PackageKind, PackageState};
use pipewright_types::{ConfigMap, DeployMode};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::{debug, info};

/// A loaded package: implementation, per-instance state and deploy delegates.
///
/// Lifecycle operations go to the delegate matching the configured
/// `deploy_mode`; configuration and environment hooks stay on the base.
pub struct PackageInstance<'a> {
    repo: &'a dyn Repository,
    name: String,
    type_name: String,
    base: Box<dyn Package>,
    state: PackageState,
    delegates: BTreeMap<DeployMode, Box<dyn Package>>,
}

impl<'a> PackageInstance<'a> {
    pub(crate) fn new(
        repo: &'a dyn Repository,
        name: String,
        type_name: String,
        base: Box<dyn Package>,
        state: PackageState,
    ) -> Self {
        Self {
            repo,
            name,
            type_name,
            base,
            state,
            delegates: BTreeMap::new(),
        }
    }

    pub fn pkg_id(&self) -> &str {
        &self.state.pkg_id
    }

    pub fn kind(&self) -> PackageKind {
        self.base.kind()
    }

    pub fn schema(&self) -> ConfigSchema {
        ConfigSchema::with_common(self.base.options())
    }

    pub fn state(&self) -> &PackageState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PackageState {
        &mut self.state
    }

    pub fn into_state(self) -> PackageState {
        self.state
    }

    pub fn deploy_mode(&self) -> DeployMode {
        self.state
            .value("deploy_mode")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Ensure directories, apply defaults, overlay `overrides`, run the hook.
    ///
    /// Returns the resulting configuration.
    pub fn configure(&mut self, overrides: &ConfigMap) -> anyhow::Result<ConfigMap> {
        self.state.ensure_dirs()?;
        self.schema().apply_defaults(&mut self.state.config);
        for (k, v) in overrides {
            self.state.config.insert(k.clone(), v.clone());
        }
        let hostfile = self.state.hostfile()?;
        info!(
            pkg_id = %self.state.pkg_id,
            hostfile = %hostfile.path.as_ref().map(|p| p.as_str()).unwrap_or("localhost"),
            hosts = hostfile.len(),
            "configuring package"
        );
        self.base
            .configure(&mut self.state)
            .with_context(|| format!("configure {}", self.state.pkg_id))?;
        Ok(self.state.config.clone())
    }

    pub fn start(&mut self) -> anyhow::Result<()> {
        self.with_active(|pkg, state| pkg.start(state))
    }

    pub fn stop(&mut self) -> anyhow::Result<()> {
        self.with_active(|pkg, state| pkg.stop(state))
    }

    pub fn kill(&mut self) -> anyhow::Result<()> {
        self.with_active(|pkg, state| pkg.kill(state))
    }

    pub fn clean(&mut self) -> anyhow::Result<()> {
        self.with_active(|pkg, state| pkg.clean(state))
    }

    pub fn status(&mut self) -> anyhow::Result<String> {
        self.with_active(|pkg, state| pkg.status(state))
    }

    pub fn augment_container(&self) -> anyhow::Result<String> {
        self.base.augment_container(&self.state)
    }

    pub fn modify_env(&mut self) -> anyhow::Result<()> {
        self.base.modify_env(&mut self.state)
    }

    fn with_active<T>(
        &mut self,
        f: impl FnOnce(&mut dyn Package, &mut PackageState) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let mode = self.deploy_mode();
        if mode == DeployMode::Default {
            return f(self.base.as_mut(), &mut self.state);
        }
        let delegate = match self.delegates.entry(mode) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let type_name = format!("{}{}", self.type_name, mode.type_suffix());
                debug!(pkg_id = %self.state.pkg_id, delegate = %type_name, "loading delegate");
                let loaded = self
                    .repo
                    .load_delegate(&self.name, mode, &type_name)
                    .map_err(|source| CatalogError::PackageLoad {
                        repo_path: self.repo.path().to_owned(),
                        qualified: format!("{}.{}", self.repo.name(), self.name),
                        type_name,
                        source,
                    })?;
                e.insert(loaded)
            }
        };
        f(delegate.as_mut(), &mut self.state)
    }
}
