//! Configuration file loading for pipewright.
//!
//! Discovers and loads `pipewright.toml` from the installation root.
//! Merges config file settings with CLI arguments (CLI takes precedence).

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use pipewright_types::{ContainerEngineKind, Layout};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "pipewright.toml";

/// Top-level configuration from pipewright.toml.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipewrightConfig {
    /// Pipeline and package configuration (default: `<root>/config`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<Utf8PathBuf>,

    /// Node-local scratch data (default: `<root>/private`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_dir: Option<Utf8PathBuf>,

    /// Data visible to every node (default: `<root>/shared`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_dir: Option<Utf8PathBuf>,

    /// Global hostfile; absent means localhost only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostfile: Option<Utf8PathBuf>,

    /// Repository directories, highest priority first.
    pub repos: Vec<Utf8PathBuf>,

    pub container: ContainerConfig,
}

/// Container defaults for new pipelines.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// `docker` or `podman`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
}

/// Discover the pipewright.toml config file.
///
/// Returns `None` if `root` holds no config file.
pub fn discover_config(root: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = root.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path);
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path);
        None
    }
}

/// Load and parse a pipewright.toml config file.
pub fn load_config(path: &Utf8Path) -> anyhow::Result<PipewrightConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

/// Parse a config file from a string.
pub fn parse_config(contents: &str) -> anyhow::Result<PipewrightConfig> {
    let config: PipewrightConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load config from `root`, or return default if not found.
pub fn load_or_default(root: &Utf8Path) -> anyhow::Result<PipewrightConfig> {
    match discover_config(root) {
        Some(path) => load_config(&path),
        None => Ok(PipewrightConfig::default()),
    }
}

/// Write `config` to `<root>/pipewright.toml`, creating `root`.
pub fn save_config(root: &Utf8Path, config: &PipewrightConfig) -> anyhow::Result<Utf8PathBuf> {
    fs::create_dir_all(root).with_context(|| format!("create {}", root))?;
    let path = root.join(CONFIG_FILE_NAME);
    let text = toml::to_string_pretty(config).context("serialize config")?;
    fs::write(&path, text).with_context(|| format!("write {}", path))?;
    debug!("wrote config file {}", path);
    Ok(path)
}

/// Merged configuration combining the config file and global CLI flags.
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub layout: Layout,
    pub hostfile: Option<Utf8PathBuf>,
    pub repos: Vec<Utf8PathBuf>,
    pub engine: Option<ContainerEngineKind>,
}

/// Merges config file settings with CLI arguments.
pub struct ConfigMerger {
    config: PipewrightConfig,
}

impl ConfigMerger {
    pub fn new(config: PipewrightConfig) -> Self {
        Self { config }
    }

    /// Resolve directories under `root`; `--hostfile` replaces the file's.
    pub fn merge_global_args(
        self,
        root: &Utf8Path,
        cli_hostfile: Option<&Utf8Path>,
    ) -> anyhow::Result<MergedConfig> {
        let mut layout = Layout::under(root);
        if let Some(dir) = self.config.config_dir {
            layout.config_dir = dir;
        }
        if let Some(dir) = self.config.private_dir {
            layout.private_dir = dir;
        }
        if let Some(dir) = self.config.shared_dir {
            layout.shared_dir = dir;
        }

        let engine = match self.config.container.engine.as_deref() {
            None | Some("") => None,
            Some(e) => Some(
                e.parse::<ContainerEngineKind>()
                    .map_err(|err| anyhow::anyhow!("container.engine: {}", err))?,
            ),
        };

        Ok(MergedConfig {
            layout,
            hostfile: cli_hostfile.map(Utf8Path::to_path_buf).or(self.config.hostfile),
            repos: self.config.repos,
            engine,
        })
    }
}

/// Put `repo` at the highest priority.
///
/// An already registered path is an error unless `force`, which moves it to
/// the front instead.
pub fn add_repo(config: &mut PipewrightConfig, repo: Utf8PathBuf, force: bool) -> anyhow::Result<()> {
    if let Some(idx) = config.repos.iter().position(|r| *r == repo) {
        if !force {
            anyhow::bail!("repository already registered: {} (use --force to move it first)", repo);
        }
        config.repos.remove(idx);
    }
    config.repos.insert(0, repo);
    Ok(())
}

/// Drop every repository whose directory name is `name`; returns how many.
pub fn remove_repo(config: &mut PipewrightConfig, name: &str) -> usize {
    let before = config.repos.len();
    config.repos.retain(|r| r.file_name() != Some(name));
    before - config.repos.len()
}
