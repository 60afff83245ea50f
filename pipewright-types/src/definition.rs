use crate::value::{ConfigMap, ConfigValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a package runs: directly on the hosts, or inside the pipeline image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    #[default]
    Default,
    Container,
}

impl DeployMode {
    pub const ALL: [DeployMode; 2] = [DeployMode::Default, DeployMode::Container];

    pub fn as_str(self) -> &'static str {
        match self {
            DeployMode::Default => "default",
            DeployMode::Container => "container",
        }
    }

    /// Suffix used for delegate type names (`IorContainer`).
    pub fn type_suffix(self) -> &'static str {
        match self {
            DeployMode::Default => "Default",
            DeployMode::Container => "Container",
        }
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(DeployMode::Default),
            "container" => Ok(DeployMode::Container),
            other => Err(format!("unknown deploy mode '{}'", other)),
        }
    }
}

/// Last dotted component of a package type (`builtin.ior` -> `ior`).
pub fn leaf_name(pkg_type: &str) -> &str {
    pkg_type.rsplit('.').next().unwrap_or(pkg_type)
}

/// One package as recorded in a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDefinition {
    /// Repository-qualified type, e.g. `builtin.ior`.
    pub pkg_type: String,
    /// Alias, unique within the pipeline.
    pub pkg_id: String,
    /// `<pipeline>.<pkg_id>`
    pub global_id: String,
    pub config: ConfigMap,
}

impl PackageDefinition {
    pub fn new(pipeline: &str, pkg_type: impl Into<String>, pkg_id: impl Into<String>) -> Self {
        let pkg_id = pkg_id.into();
        Self {
            pkg_type: pkg_type.into(),
            global_id: format!("{}.{}", pipeline, pkg_id),
            pkg_id,
            config: ConfigMap::new(),
        }
    }

    pub fn with_config(mut self, config: ConfigMap) -> Self {
        self.config = config;
        self
    }

    pub fn leaf_name(&self) -> &str {
        leaf_name(&self.pkg_type)
    }

    /// Configured deploy mode; unparseable values fall back to `default`.
    pub fn deploy_mode(&self) -> DeployMode {
        self.config
            .get("deploy_mode")
            .and_then(ConfigValue::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Interceptor aliases listed in this package's `interceptors` option.
    pub fn interceptors(&self) -> Vec<String> {
        self.config
            .get("interceptors")
            .map(ConfigValue::to_string_list)
            .unwrap_or_default()
    }

    /// Re-anchor the definition under another pipeline name.
    pub fn rename_pipeline(&mut self, pipeline: &str) {
        self.global_id = format!("{}.{}", pipeline, self.pkg_id);
    }
}
