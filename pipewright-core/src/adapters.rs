//! Default port implementations, plus recording fakes for embedding and tests.

use crate::ports::{CurrentPipelineStore, EngineProvider, EnvironmentSource};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use pipewright_container::{ComposeAction, ContainerEngine};
use pipewright_package::{Exec, ExecOptions, ExecOutput, HostOutput, Launcher};
use pipewright_types::{ContainerEngineKind, EnvMap, Hostfile};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Command execution
// ---------------------------------------------------------------------------

/// Runs commands with `std::process`: `sh -c` locally, `ssh` per remote host,
/// `mpiexec` for MPI launches.
#[derive(Debug, Clone)]
pub struct ShellExec {
    pub ssh: String,
    pub mpiexec: String,
}

impl Default for ShellExec {
    fn default() -> Self {
        Self {
            ssh: "ssh".to_string(),
            mpiexec: "mpiexec".to_string(),
        }
    }
}

/// Single-quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1")
}

impl ShellExec {
    /// `cd`, `env` and the command folded into one remote shell line.
    fn remote_line(cmd: &str, opts: &ExecOptions) -> String {
        let mut line = String::new();
        if let Some(cwd) = &opts.cwd {
            line.push_str(&format!("cd {} && ", shell_quote(cwd.as_str())));
        }
        if !opts.env.is_empty() {
            line.push_str("env ");
            for (k, v) in &opts.env {
                line.push_str(&format!("{}={} ", k, shell_quote(v)));
            }
        }
        line.push_str(&format!("sh -c {}", shell_quote(cmd)));
        line
    }

    fn mpi_line(&self, cmd: &str, nprocs: u32, ppn: u32, opts: &ExecOptions) -> String {
        let mut line = format!("{} -n {} -ppn {}", self.mpiexec, nprocs, ppn);
        if let Some(path) = &opts.hostfile.path
            && !opts.hostfile.is_local()
        {
            line.push_str(&format!(" -f {}", shell_quote(path.as_str())));
        }
        for (k, v) in &opts.env {
            line.push_str(&format!(" -genv {} {}", k, shell_quote(v)));
        }
        line.push(' ');
        line.push_str(cmd);
        line
    }

    fn local_command(cmd: &str, opts: &ExecOptions) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(cmd).envs(&opts.env);
        if let Some(cwd) = &opts.cwd {
            command.current_dir(cwd);
        }
        command
    }

    fn ssh_command(&self, host: &str, cmd: &str, opts: &ExecOptions) -> Command {
        let mut command = Command::new(&self.ssh);
        command
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg(host)
            .arg(Self::remote_line(cmd, opts));
        command
    }

    fn spawn(mut command: Command, opts: &ExecOptions) -> anyhow::Result<HostOutput> {
        debug!(?command, exec_async = opts.exec_async, "spawn");
        if opts.exec_async {
            if opts.hide_output {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
            command.spawn().context("spawn background command")?;
            return Ok(HostOutput::default());
        }
        if opts.collect_output {
            let out = command.output().context("run command")?;
            if !opts.hide_output {
                print!("{}", String::from_utf8_lossy(&out.stdout));
                eprint!("{}", String::from_utf8_lossy(&out.stderr));
            }
            return Ok(HostOutput {
                exit_code: out.status.code(),
                stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        if opts.hide_output {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        let status = command.status().context("run command")?;
        Ok(HostOutput {
            exit_code: status.code(),
            ..HostOutput::default()
        })
    }
}

impl Exec for ShellExec {
    fn run(&self, cmd: &str, opts: &ExecOptions) -> anyhow::Result<ExecOutput> {
        match &opts.launcher {
            Launcher::Local => {
                let out = Self::spawn(Self::local_command(cmd, opts), opts)
                    .with_context(|| format!("exec `{}`", cmd))?;
                Ok(ExecOutput::single("localhost", out))
            }
            Launcher::Pssh => {
                let mut hosts = BTreeMap::new();
                for host in opts.hostfile.targets() {
                    let command = if is_local_host(&host) {
                        Self::local_command(cmd, opts)
                    } else {
                        self.ssh_command(&host, cmd, opts)
                    };
                    let out = Self::spawn(command, opts)
                        .with_context(|| format!("exec `{}` on {}", cmd, host))?;
                    hosts.insert(host, out);
                }
                Ok(ExecOutput { hosts })
            }
            Launcher::Mpi { nprocs, ppn } => {
                let line = self.mpi_line(cmd, *nprocs, *ppn, opts);
                let out = Self::spawn(Self::local_command(&line, opts), opts)
                    .with_context(|| format!("exec `{}`", line))?;
                Ok(ExecOutput::single("localhost", out))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Container engines
// ---------------------------------------------------------------------------

/// Drives the `docker`/`podman` command line through an [`Exec`].
pub struct CliContainerEngine {
    kind: ContainerEngineKind,
    exec: Arc<dyn Exec>,
}

impl CliContainerEngine {
    pub fn new(kind: ContainerEngineKind, exec: Arc<dyn Exec>) -> Self {
        Self { kind, exec }
    }
}

impl ContainerEngine for CliContainerEngine {
    fn build(
        &self,
        dockerfile: &Utf8Path,
        context_dir: &Utf8Path,
        image: &str,
        no_cache: bool,
    ) -> anyhow::Result<()> {
        let mut cmd = format!("{} build", self.kind);
        if no_cache {
            cmd.push_str(" --no-cache");
        }
        cmd.push_str(&format!(
            " -t {} -f {} {}",
            shell_quote(image),
            shell_quote(dockerfile.as_str()),
            shell_quote(context_dir.as_str())
        ));
        info!(engine = %self.kind, image, "building container image");
        self.exec.run(&cmd, &ExecOptions::local())?.ensure_success(&cmd)?;
        Ok(())
    }

    fn compose(
        &self,
        compose_file: &Utf8Path,
        action: ComposeAction,
        hostfile: &Hostfile,
    ) -> anyhow::Result<()> {
        let cmd = format!(
            "{} compose -f {} {}",
            self.kind,
            shell_quote(compose_file.as_str()),
            action.args()
        );
        let opts = if hostfile.is_local() {
            ExecOptions::local()
        } else {
            ExecOptions::pssh(hostfile.clone())
        };
        info!(engine = %self.kind, action = action.args(), hosts = hostfile.len(), "compose");
        self.exec.run(&cmd, &opts)?.ensure_success(&cmd)?;
        Ok(())
    }
}

/// Hands out [`CliContainerEngine`]s sharing one executor.
pub struct CliEngines {
    exec: Arc<dyn Exec>,
}

impl CliEngines {
    pub fn new(exec: Arc<dyn Exec>) -> Self {
        Self { exec }
    }
}

impl EngineProvider for CliEngines {
    fn engine(&self, kind: ContainerEngineKind) -> Box<dyn ContainerEngine + '_> {
        Box::new(CliContainerEngine::new(kind, Arc::clone(&self.exec)))
    }
}

// ---------------------------------------------------------------------------
// Environments and the current-pipeline pointer
// ---------------------------------------------------------------------------

/// Named environments stored as `<dir>/<name>.yaml`.
#[derive(Debug, Clone)]
pub struct FsEnvironments {
    pub dir: Utf8PathBuf,
}

impl FsEnvironments {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, name: &str) -> Utf8PathBuf {
        self.dir.join(format!("{}.yaml", name))
    }
}

impl EnvironmentSource for FsEnvironments {
    fn capture(&self) -> anyhow::Result<EnvMap> {
        Ok(std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect())
    }

    fn load(&self, name: &str) -> anyhow::Result<Option<EnvMap>> {
        let path = self.path(name);
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).with_context(|| format!("read {}", path))?;
        let env = serde_yaml::from_str::<Option<EnvMap>>(&text)
            .with_context(|| format!("parse {}", path))?;
        Ok(Some(env.unwrap_or_default()))
    }

    fn save(&self, name: &str, env: &EnvMap) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| format!("create {}", self.dir))?;
        let path = self.path(name);
        let text = serde_yaml::to_string(env).context("serialize environment")?;
        fs::write(&path, text).with_context(|| format!("write {}", path))
    }

    fn list(&self) -> anyhow::Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = format!("{}/*.yaml", glob::Pattern::escape(self.dir.as_str()));
        let mut names: Vec<String> = glob::glob(&pattern)
            .with_context(|| format!("list {}", self.dir))?
            .filter_map(Result::ok)
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CurrentStateV1 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_pipeline: Option<String>,
}

/// Current-pipeline pointer kept in a small YAML file.
#[derive(Debug, Clone)]
pub struct FsCurrentPipeline {
    pub path: Utf8PathBuf,
}

impl FsCurrentPipeline {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CurrentPipelineStore for FsCurrentPipeline {
    fn get(&self) -> anyhow::Result<Option<String>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let text =
            fs::read_to_string(&self.path).with_context(|| format!("read {}", self.path))?;
        let state: Option<CurrentStateV1> =
            serde_yaml::from_str(&text).with_context(|| format!("parse {}", self.path))?;
        Ok(state
            .and_then(|s| s.current_pipeline)
            .filter(|n| !n.is_empty()))
    }

    fn set(&self, name: Option<&str>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent))?;
        }
        let state = CurrentStateV1 {
            current_pipeline: name.map(str::to_string),
        };
        let text = serde_yaml::to_string(&state).context("serialize state")?;
        fs::write(&self.path, text).with_context(|| format!("write {}", self.path))
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// One recorded [`Exec::run`] call.
#[derive(Debug, Clone)]
pub struct ExecCall {
    pub cmd: String,
    pub opts: ExecOptions,
}

/// Records every command and answers with canned results.
///
/// Commands containing a registered failure pattern exit with 1; commands
/// matching a registered reply print that reply.
#[derive(Debug, Clone, Default)]
pub struct RecordingExec {
    calls: Arc<Mutex<Vec<ExecCall>>>,
    failures: Vec<String>,
    replies: Vec<(String, String)>,
}

impl RecordingExec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, pattern: &str) -> Self {
        self.failures.push(pattern.to_string());
        self
    }

    pub fn reply(mut self, pattern: &str, stdout: &str) -> Self {
        self.replies.push((pattern.to_string(), stdout.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<ExecCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.cmd).collect()
    }
}

impl Exec for RecordingExec {
    fn run(&self, cmd: &str, opts: &ExecOptions) -> anyhow::Result<ExecOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ExecCall {
                cmd: cmd.to_string(),
                opts: opts.clone(),
            });
        }
        let failed = self.failures.iter().any(|p| cmd.contains(p.as_str()));
        let stdout = self
            .replies
            .iter()
            .find(|(p, _)| cmd.contains(p.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        let mut hosts = BTreeMap::new();
        for host in opts.hostfile.targets() {
            hosts.insert(
                host,
                HostOutput {
                    exit_code: (!opts.exec_async).then_some(if failed { 1 } else { 0 }),
                    stdout: stdout.clone(),
                    stderr: String::new(),
                },
            );
        }
        Ok(ExecOutput { hosts })
    }
}

/// One recorded container engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Build {
        engine: ContainerEngineKind,
        image: String,
        no_cache: bool,
    },
    Compose {
        engine: ContainerEngineKind,
        file: Utf8PathBuf,
        action: ComposeAction,
    },
}

/// Records builds and compose actions instead of running them.
#[derive(Debug, Clone, Default)]
pub struct RecordingEngine {
    kind: ContainerEngineKind,
    calls: Arc<Mutex<Vec<EngineCall>>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn builds(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, EngineCall::Build { .. }))
            .count()
    }

    fn record(&self, call: EngineCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl ContainerEngine for RecordingEngine {
    fn build(
        &self,
        _dockerfile: &Utf8Path,
        _context_dir: &Utf8Path,
        image: &str,
        no_cache: bool,
    ) -> anyhow::Result<()> {
        self.record(EngineCall::Build {
            engine: self.kind,
            image: image.to_string(),
            no_cache,
        });
        Ok(())
    }

    fn compose(
        &self,
        compose_file: &Utf8Path,
        action: ComposeAction,
        _hostfile: &Hostfile,
    ) -> anyhow::Result<()> {
        self.record(EngineCall::Compose {
            engine: self.kind,
            file: compose_file.to_path_buf(),
            action,
        });
        Ok(())
    }
}

impl EngineProvider for RecordingEngine {
    fn engine(&self, kind: ContainerEngineKind) -> Box<dyn ContainerEngine + '_> {
        Box::new(RecordingEngine {
            kind,
            calls: Arc::clone(&self.calls),
        })
    }
}

/// Fixed captured environment plus in-memory named environments.
#[derive(Debug, Default)]
pub struct StaticEnvironments {
    captured: EnvMap,
    named: RefCell<BTreeMap<String, EnvMap>>,
}

impl StaticEnvironments {
    pub fn new(captured: EnvMap) -> Self {
        Self {
            captured,
            named: RefCell::new(BTreeMap::new()),
        }
    }
}

impl EnvironmentSource for StaticEnvironments {
    fn capture(&self) -> anyhow::Result<EnvMap> {
        Ok(self.captured.clone())
    }

    fn load(&self, name: &str) -> anyhow::Result<Option<EnvMap>> {
        Ok(self.named.borrow().get(name).cloned())
    }

    fn save(&self, name: &str, env: &EnvMap) -> anyhow::Result<()> {
        self.named.borrow_mut().insert(name.to_string(), env.clone());
        Ok(())
    }

    fn list(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.named.borrow().keys().cloned().collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCurrentPipeline {
    current: RefCell<Option<String>>,
}

impl CurrentPipelineStore for InMemoryCurrentPipeline {
    fn get(&self) -> anyhow::Result<Option<String>> {
        Ok(self.current.borrow().clone())
    }

    fn set(&self, name: Option<&str>) -> anyhow::Result<()> {
        *self.current.borrow_mut() = name.map(str::to_string);
        Ok(())
    }
}
