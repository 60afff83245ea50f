use crate::definition::{PackageDefinition, leaf_name};
use crate::pipeline::{
    ContainerSettings, DEFAULT_CONTAINER_BASE, DEFAULT_SSH_PORT, PipelineState,
};
use crate::value::ConfigMap;
use crate::wire::WireError;
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire representation of `pipeline.yaml`.
///
/// The same shape is accepted for external pipeline files, which may also
/// carry an `env` reference and omit `name`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineFileV1 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Only meaningful in external files; never written by `save`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<serde_yaml::Value>,

    #[serde(default)]
    pub pkgs: Vec<PackageEntryV1>,

    #[serde(default)]
    pub interceptors: Vec<PackageEntryV1>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_loaded_file: Option<String>,

    #[serde(default, alias = "container_name")]
    pub container_build: Option<String>,

    #[serde(default)]
    pub container_image: Option<String>,

    #[serde(default)]
    pub container_engine: Option<String>,

    #[serde(default)]
    pub container_base: Option<String>,

    #[serde(default)]
    pub container_ssh_port: Option<u16>,

    #[serde(default, skip_serializing_if = "serde_yaml::Mapping::is_empty")]
    pub container_extensions: serde_yaml::Mapping,

    #[serde(default)]
    pub hostfile: Option<String>,
}

/// One `pkgs`/`interceptors` entry: type, optional alias, flattened config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageEntryV1 {
    pub pkg_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg_name: Option<String>,

    #[serde(flatten)]
    pub config: ConfigMap,
}

impl PackageEntryV1 {
    /// The entry's alias: `pkg_name`, else the type's leaf name.
    pub fn alias(&self) -> String {
        match &self.pkg_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => leaf_name(&self.pkg_type).to_string(),
        }
    }
}

impl From<&PackageDefinition> for PackageEntryV1 {
    fn from(def: &PackageDefinition) -> Self {
        let pkg_name = (def.pkg_id != def.leaf_name()).then(|| def.pkg_id.clone());
        Self {
            pkg_type: def.pkg_type.clone(),
            pkg_name,
            config: def.config.clone(),
        }
    }
}

impl From<&PipelineState> for PipelineFileV1 {
    fn from(state: &PipelineState) -> Self {
        Self {
            name: Some(state.name.clone()),
            env: None,
            pkgs: state.packages.iter().map(PackageEntryV1::from).collect(),
            interceptors: state
                .interceptors
                .values()
                .map(PackageEntryV1::from)
                .collect(),
            created_at: state.created_at.map(|t| t.to_rfc3339()),
            last_loaded_file: state.last_loaded_file.as_ref().map(|p| p.to_string()),
            container_build: Some(state.container.build.clone()),
            container_image: Some(state.container.image.clone()),
            container_engine: Some(state.container.engine.as_str().to_string()),
            container_base: Some(state.container.base.clone()),
            container_ssh_port: Some(state.container.ssh_port),
            container_extensions: state.container.extensions.clone(),
            hostfile: state.hostfile.as_ref().map(|p| p.to_string()),
        }
    }
}

impl PipelineFileV1 {
    /// Container settings with defaults filled in.
    pub fn container_settings(&self) -> Result<ContainerSettings, WireError> {
        let engine = match self.container_engine.as_deref() {
            None | Some("") => Default::default(),
            Some(e) => e.parse().map_err(WireError::InvalidEngine)?,
        };
        Ok(ContainerSettings {
            build: self.container_build.clone().unwrap_or_default(),
            image: self.container_image.clone().unwrap_or_default(),
            engine,
            base: self
                .container_base
                .clone()
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| DEFAULT_CONTAINER_BASE.to_string()),
            ssh_port: self.container_ssh_port.unwrap_or(DEFAULT_SSH_PORT),
            extensions: self.container_extensions.clone(),
        })
    }

    pub fn created_at(&self) -> Result<Option<DateTime<Utc>>, WireError> {
        match &self.created_at {
            None => Ok(None),
            Some(s) => DateTime::parse_from_rfc3339(s)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|_| WireError::InvalidTimestamp(s.clone())),
        }
    }

    /// Convert a persisted file into pipeline state.
    ///
    /// Package types are taken as written; the environment is stored separately
    /// and left empty here.
    pub fn into_state(self, fallback_name: Option<&str>) -> Result<PipelineState, WireError> {
        let name = self
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| fallback_name.map(str::to_string))
            .ok_or(WireError::MissingName)?;

        let container = self.container_settings()?;
        let created_at = self.created_at()?;

        let mut state = PipelineState::new(name.clone());
        for (index, entry) in self.pkgs.iter().enumerate() {
            state.packages.push(entry_to_definition(&name, entry, index)?);
        }
        for (index, entry) in self.interceptors.iter().enumerate() {
            let def = entry_to_definition(&name, entry, index)?;
            state.interceptors.insert(def.pkg_id.clone(), def);
        }
        state.container = container;
        state.created_at = created_at;
        state.last_loaded_file = self.last_loaded_file.map(Utf8PathBuf::from);
        state.hostfile = self
            .hostfile
            .filter(|h| !h.is_empty())
            .map(Utf8PathBuf::from);
        Ok(state)
    }
}

fn entry_to_definition(
    pipeline: &str,
    entry: &PackageEntryV1,
    index: usize,
) -> Result<PackageDefinition, WireError> {
    if entry.pkg_type.trim().is_empty() {
        return Err(WireError::EmptyPackageType { index });
    }
    Ok(PackageDefinition::new(pipeline, entry.pkg_type.clone(), entry.alias())
        .with_config(entry.config.clone()))
}
