//! On-disk repositories of declarative packages.
//!
//! A repository directory holds one subdirectory per package:
//!
//! ```text
//! <repo>/<name>/pkg.yaml         base unit, `type: <PascalName>`
//! <repo>/<name>/container.yaml   optional delegate, `type: <PascalName>Container`
//! <repo>/<name>/<files>          templates referenced by the unit
//! ```

use crate::repository::Repository;
use anyhow::{Context, bail};
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use pipewright_package::{
    ConfigOption, Launcher, Package, PackageKind, PackageState, render_template,
};
use pipewright_types::{DeployMode, EnvMap};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub const UNIT_FILE: &str = "pkg.yaml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptLauncher {
    #[default]
    Local,
    Pssh,
    Mpi,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScriptEnv {
    pub set: EnvMap,
    pub prepend: EnvMap,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptTemplate {
    /// Path relative to the package directory.
    pub source: String,
    /// Destination; relative paths land in the instance's shared dir.
    pub dest: String,
}

/// A declarative package unit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptManifest {
    #[serde(rename = "type")]
    pub type_name: String,
    pub kind: PackageKind,
    #[serde(default)]
    pub options: Vec<ConfigOption>,
    #[serde(default)]
    pub launcher: ScriptLauncher,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub stop: Option<String>,
    #[serde(default)]
    pub kill: Option<String>,
    #[serde(default)]
    pub clean: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub env: ScriptEnv,
    /// Dockerfile fragment, `##KEY##` tokens expanded.
    #[serde(default)]
    pub container: String,
    #[serde(default)]
    pub templates: Vec<ScriptTemplate>,
}

impl ScriptManifest {
    pub fn load(path: &Utf8Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("read {}", path))?;
        serde_yaml::from_str(&text).with_context(|| format!("parse {}", path))
    }
}

/// A package implemented by shell commands from a [`ScriptManifest`].
#[derive(Debug, Clone)]
pub struct ScriptPackage {
    manifest: ScriptManifest,
    dir: Utf8PathBuf,
}

impl ScriptPackage {
    pub fn new(manifest: ScriptManifest, dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            manifest,
            dir: dir.into(),
        }
    }

    fn tokens(pkg: &PackageState) -> BTreeMap<String, String> {
        let mut tokens: BTreeMap<String, String> = pkg
            .config
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
        tokens.insert("pkg_id".into(), pkg.pkg_id.clone());
        tokens.insert("global_id".into(), pkg.global_id.clone());
        tokens.insert("config_dir".into(), pkg.dirs.config_dir.to_string());
        tokens.insert("shared_dir".into(), pkg.dirs.shared_dir.to_string());
        tokens.insert("private_dir".into(), pkg.dirs.private_dir.to_string());
        tokens
    }

    fn apply_env(&self, pkg: &PackageState) {
        let tokens = Self::tokens(pkg);
        for (k, v) in &self.manifest.env.set {
            pkg.setenv(k, &render_template(v, &tokens));
        }
        for (k, v) in &self.manifest.env.prepend {
            pkg.prepend_env(k, &render_template(v, &tokens));
        }
    }

    fn launcher(&self, pkg: &PackageState) -> Launcher {
        match self.manifest.launcher {
            ScriptLauncher::Local => Launcher::Local,
            ScriptLauncher::Pssh => Launcher::Pssh,
            ScriptLauncher::Mpi => {
                let get = |key: &str| {
                    pkg.value(key)
                        .and_then(|v| v.as_i64())
                        .and_then(|n| u32::try_from(n).ok())
                        .unwrap_or(1)
                };
                Launcher::Mpi {
                    nprocs: get("nprocs"),
                    ppn: get("ppn"),
                }
            }
        }
    }

    fn run(&self, pkg: &PackageState, cmd: &Option<String>) -> anyhow::Result<String> {
        let Some(cmd) = cmd else {
            return Ok(String::new());
        };
        let cmd = render_template(cmd, &Self::tokens(pkg));
        let opts = pkg.exec_options(self.launcher(pkg))?.collect();
        let out = pkg.exec_checked(&cmd, &opts)?;
        Ok(out.stdout())
    }
}

impl Package for ScriptPackage {
    fn kind(&self) -> PackageKind {
        self.manifest.kind
    }

    fn options(&self) -> Vec<ConfigOption> {
        self.manifest.options.clone()
    }

    fn configure(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        let tokens = Self::tokens(pkg);
        for tpl in &self.manifest.templates {
            let dest = Utf8PathBuf::from(render_template(&tpl.dest, &tokens));
            let dest = if dest.is_absolute() {
                dest
            } else {
                pkg.dirs.shared_dir.join(dest)
            };
            pkg.copy_template_file(&self.dir.join(&tpl.source), &dest, &tokens)?;
        }
        if self.manifest.kind != PackageKind::Interceptor {
            self.apply_env(pkg);
        }
        Ok(())
    }

    fn start(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        self.run(pkg, &self.manifest.start)?;
        pkg.sleep();
        Ok(())
    }

    fn stop(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        self.run(pkg, &self.manifest.stop).map(drop)
    }

    fn kill(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        self.run(pkg, &self.manifest.kill).map(drop)
    }

    fn clean(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        self.run(pkg, &self.manifest.clean).map(drop)
    }

    fn status(&mut self, pkg: &mut PackageState) -> anyhow::Result<String> {
        if self.manifest.status.is_none() {
            return Ok("unknown".to_string());
        }
        Ok(self.run(pkg, &self.manifest.status)?.trim().to_string())
    }

    fn augment_container(&self, pkg: &PackageState) -> anyhow::Result<String> {
        Ok(render_template(
            &self.manifest.container,
            &Self::tokens(pkg),
        ))
    }

    fn modify_env(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        if self.manifest.kind == PackageKind::Interceptor {
            self.apply_env(pkg);
        }
        Ok(())
    }
}

/// A directory of script packages.
#[derive(Debug, Clone)]
pub struct ScriptRepository {
    name: String,
    path: Utf8PathBuf,
}

impl ScriptRepository {
    /// Open a repository; its name is the directory's file name.
    pub fn open(path: impl Into<Utf8PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if !path.is_dir() {
            bail!("repository directory not found: {}", path);
        }
        let name = path
            .file_name()
            .with_context(|| format!("repository path has no name: {}", path))?
            .to_string();
        Ok(Self { name, path })
    }

    fn unit(&self, name: &str, file: &str, type_name: &str) -> anyhow::Result<Box<dyn Package>> {
        let dir = self.path.join(name);
        let manifest = ScriptManifest::load(&dir.join(file))?;
        if manifest.type_name != type_name {
            bail!(
                "{}/{} does not export type {} (found {})",
                dir,
                file,
                type_name,
                manifest.type_name
            );
        }
        debug!(repo = %self.name, name, type_name, "loaded script unit");
        Ok(Box::new(ScriptPackage::new(manifest, dir)))
    }
}

impl Repository for ScriptRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn packages(&self) -> Vec<String> {
        let pattern = format!("{}/*/{}", glob::Pattern::escape(self.path.as_str()), UNIT_FILE);
        let entries = match glob::glob(&pattern) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(repo = %self.name, error = %e, "invalid repository path");
                return Vec::new();
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|p| {
                p.parent()
                    .and_then(|d| d.file_name())
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }

    fn contains(&self, name: &str) -> bool {
        self.path.join(name).join(UNIT_FILE).is_file()
    }

    fn package_dir(&self, name: &str) -> Option<Utf8PathBuf> {
        self.contains(name).then(|| self.path.join(name))
    }

    fn load(&self, name: &str, type_name: &str) -> anyhow::Result<Box<dyn Package>> {
        self.unit(name, UNIT_FILE, type_name)
    }

    fn load_delegate(
        &self,
        name: &str,
        mode: DeployMode,
        type_name: &str,
    ) -> anyhow::Result<Box<dyn Package>> {
        info!(repo = %self.name, name, mode = %mode, "loading delegate unit");
        self.unit(name, &format!("{}.yaml", mode), type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PackageLoader, RepositoryRegistry};
    use pipewright_package::{Exec, ExecOptions, ExecOutput, HostOutput, PipelineContext};
    use pipewright_types::{ConfigMap, Hostfile, Layout, PackageDefinition};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        cmds: Mutex<Vec<(String, Launcher)>>,
    }

    impl Exec for Recorder {
        fn run(&self, cmd: &str, opts: &ExecOptions) -> anyhow::Result<ExecOutput> {
            self.cmds
                .lock()
                .unwrap()
                .push((cmd.to_string(), opts.launcher.clone()));
            Ok(ExecOutput::single(
                "localhost",
                HostOutput {
                    exit_code: Some(0),
                    stdout: "running\n".into(),
                    stderr: String::new(),
                },
            ))
        }
    }

    const HELLO: &str = r###"
type: Hello
kind: application
launcher: mpi
options:
  - name: nprocs
    type: int
    default: 4
  - name: ppn
    type: int
    default: 2
  - name: port
    type: int
    default: 7000
start: "hello --port ##port## --out ##shared_dir##"
status: "hello --status"
env:
  set:
    HELLO_PORT: "##port##"
container: "RUN install-hello ##pkg_id##"
templates:
  - source: hello.conf
    dest: hello.conf
"###;

    fn write_repo(root: &Utf8Path) -> Utf8PathBuf {
        let repo = root.join("lab");
        fs::create_dir_all(repo.join("hello")).unwrap();
        fs::write(repo.join("hello").join(UNIT_FILE), HELLO).unwrap();
        fs::write(repo.join("hello").join("hello.conf"), "port ##port##\n").unwrap();
        fs::create_dir_all(repo.join("notes")).unwrap();
        repo
    }

    #[test]
    fn lists_only_directories_with_units() {
        let tmp = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(tmp.path()).unwrap();
        let repo = ScriptRepository::open(write_repo(root)).unwrap();
        assert_eq!(repo.name(), "lab");
        assert_eq!(repo.packages(), vec!["hello".to_string()]);
        assert_eq!(repo.package_dir("hello"), Some(repo.path().join("hello")));
        assert_eq!(repo.package_dir("notes"), None);
        assert!(!repo.contains("notes"));
    }

    #[test]
    fn script_package_runs_templated_commands() {
        let tmp = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(tmp.path()).unwrap();
        let mut reg = RepositoryRegistry::new();
        reg.push(Box::new(ScriptRepository::open(write_repo(root)).unwrap()));
        let exec = Arc::new(Recorder::default());
        let ctx = PipelineContext {
            pipeline: "p1".into(),
            layout: Layout::under(root.join("home")),
            hostfile: Hostfile::localhost(),
            exec: exec.clone(),
        };
        let def = PackageDefinition::new("p1", "hello", "h1");
        let mut inst = PackageLoader::new(&reg)
            .instantiate(&def, &EnvMap::new(), ctx)
            .unwrap();

        inst.configure(&ConfigMap::new()).unwrap();
        inst.start().unwrap();
        let status = inst.status().unwrap();

        let shared = inst.state().dirs.shared_dir.clone();
        assert_eq!(
            fs::read_to_string(shared.join("hello.conf")).unwrap(),
            "port 7000\n"
        );
        assert_eq!(
            inst.state().env().get("HELLO_PORT").map(String::as_str),
            Some("7000")
        );
        assert_eq!(status, "running");
        assert_eq!(inst.augment_container().unwrap(), "RUN install-hello h1");

        let cmds = exec.cmds.lock().unwrap();
        assert_eq!(
            cmds[0],
            (
                format!("hello --port 7000 --out {}", shared),
                Launcher::Mpi { nprocs: 4, ppn: 2 }
            )
        );
    }

    #[test]
    fn unit_with_wrong_type_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(tmp.path()).unwrap();
        let repo = ScriptRepository::open(write_repo(root)).unwrap();
        let err = repo.load("hello", "Greeting").err().unwrap();
        assert!(err.to_string().contains("does not export type Greeting"));
    }
}
