use crate::definition::PackageDefinition;
use crate::env::EnvMap;
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CONTAINER_BASE: &str = "iowarp/iowarp-build:latest";
pub const DEFAULT_SSH_PORT: u16 = 2222;

/// Container engine used to build images and run compose files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerEngineKind {
    Docker,
    #[default]
    Podman,
}

impl ContainerEngineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerEngineKind::Docker => "docker",
            ContainerEngineKind::Podman => "podman",
        }
    }
}

impl fmt::Display for ContainerEngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerEngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(ContainerEngineKind::Docker),
            "podman" => Ok(ContainerEngineKind::Podman),
            other => Err(format!("unknown container engine '{}'", other)),
        }
    }
}

/// Container settings of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSettings {
    /// Image to build from registered package fragments.
    pub build: String,
    /// Pre-built image; when set nothing is built.
    pub image: String,
    pub engine: ContainerEngineKind,
    pub base: String,
    pub ssh_port: u16,
    /// Overlay merged into the generated compose service.
    pub extensions: serde_yaml::Mapping,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            build: String::new(),
            image: String::new(),
            engine: ContainerEngineKind::default(),
            base: DEFAULT_CONTAINER_BASE.to_string(),
            ssh_port: DEFAULT_SSH_PORT,
            extensions: serde_yaml::Mapping::new(),
        }
    }
}

impl ContainerSettings {
    pub fn is_containerized(&self) -> bool {
        !self.build.is_empty() || !self.image.is_empty()
    }

    pub fn is_prebuilt(&self) -> bool {
        !self.image.is_empty()
    }

    /// The image the pipeline runs: the pre-built image if set, else the build name.
    pub fn image_name(&self) -> Option<&str> {
        if !self.image.is_empty() {
            Some(&self.image)
        } else if !self.build.is_empty() {
            Some(&self.build)
        } else {
            None
        }
    }
}

/// In-memory state of one pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineState {
    pub name: String,
    /// Packages in append order.
    pub packages: Vec<PackageDefinition>,
    /// Interceptors by alias.
    pub interceptors: BTreeMap<String, PackageDefinition>,
    pub env: EnvMap,
    pub container: ContainerSettings,
    /// Pipeline hostfile; `None` inherits the global hostfile.
    pub hostfile: Option<Utf8PathBuf>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_loaded_file: Option<Utf8PathBuf>,
}

impl PipelineState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn package(&self, pkg_id: &str) -> Option<&PackageDefinition> {
        self.packages.iter().find(|p| p.pkg_id == pkg_id)
    }

    pub fn package_mut(&mut self, pkg_id: &str) -> Option<&mut PackageDefinition> {
        self.packages.iter_mut().find(|p| p.pkg_id == pkg_id)
    }

    /// Look up an alias among packages, then interceptors.
    pub fn definition(&self, pkg_id: &str) -> Option<&PackageDefinition> {
        self.package(pkg_id).or_else(|| self.interceptors.get(pkg_id))
    }

    pub fn definition_mut(&mut self, pkg_id: &str) -> Option<&mut PackageDefinition> {
        if self.packages.iter().any(|p| p.pkg_id == pkg_id) {
            return self.package_mut(pkg_id);
        }
        self.interceptors.get_mut(pkg_id)
    }

    pub fn contains_id(&self, pkg_id: &str) -> bool {
        self.definition(pkg_id).is_some()
    }

    pub fn package_ids(&self) -> Vec<String> {
        self.packages.iter().map(|p| p.pkg_id.clone()).collect()
    }

    /// Aliases used more than once across packages and interceptors, sorted.
    pub fn duplicate_ids(&self) -> Vec<String> {
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for id in self
            .packages
            .iter()
            .map(|p| p.pkg_id.as_str())
            .chain(self.interceptors.keys().map(String::as_str))
        {
            *seen.entry(id).or_default() += 1;
        }
        seen.into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(id, _)| id.to_string())
            .collect()
    }

    /// Remove a package or interceptor by alias.
    pub fn remove(&mut self, pkg_id: &str) -> Option<PackageDefinition> {
        if let Some(idx) = self.packages.iter().position(|p| p.pkg_id == pkg_id) {
            return Some(self.packages.remove(idx));
        }
        self.interceptors.remove(pkg_id)
    }

    /// Packages followed by interceptors.
    pub fn members(&self) -> impl Iterator<Item = &PackageDefinition> {
        self.packages.iter().chain(self.interceptors.values())
    }
}
