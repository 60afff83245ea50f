//! Command execution port.

use camino::Utf8PathBuf;
use pipewright_types::{EnvMap, Hostfile};
use std::collections::BTreeMap;

/// How a command is launched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Launcher {
    /// Run once on this machine.
    #[default]
    Local,
    /// Run once on every host of the hostfile.
    Pssh,
    /// Run under `mpiexec` across the hostfile.
    Mpi { nprocs: u32, ppn: u32 },
}

/// Options for one [`Exec::run`] call.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub launcher: Launcher,
    pub env: EnvMap,
    pub hostfile: Hostfile,
    pub cwd: Option<Utf8PathBuf>,
    /// Return without waiting; exit codes are `None`.
    pub exec_async: bool,
    pub collect_output: bool,
    pub hide_output: bool,
}

impl ExecOptions {
    pub fn local() -> Self {
        Self::default()
    }

    pub fn pssh(hostfile: Hostfile) -> Self {
        Self {
            launcher: Launcher::Pssh,
            hostfile,
            ..Self::default()
        }
    }

    pub fn mpi(nprocs: u32, ppn: u32, hostfile: Hostfile) -> Self {
        Self {
            launcher: Launcher::Mpi { nprocs, ppn },
            hostfile,
            ..Self::default()
        }
    }

    pub fn env(mut self, env: EnvMap) -> Self {
        self.env = env;
        self
    }

    pub fn cwd(mut self, cwd: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn background(mut self) -> Self {
        self.exec_async = true;
        self
    }

    pub fn collect(mut self) -> Self {
        self.collect_output = true;
        self
    }

    pub fn hide(mut self, hide: bool) -> Self {
        self.hide_output = hide;
        self
    }
}

/// Result of running a command on one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Per-host results of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub hosts: BTreeMap<String, HostOutput>,
}

impl ExecOutput {
    pub fn single(host: &str, out: HostOutput) -> Self {
        let mut hosts = BTreeMap::new();
        hosts.insert(host.to_string(), out);
        Self { hosts }
    }

    /// True when no host reported a non-zero exit code.
    pub fn success(&self) -> bool {
        self.hosts
            .values()
            .all(|h| h.exit_code.is_none_or(|c| c == 0))
    }

    pub fn failed_hosts(&self) -> Vec<(&str, i32)> {
        self.hosts
            .iter()
            .filter_map(|(host, out)| match out.exit_code {
                Some(code) if code != 0 => Some((host.as_str(), code)),
                _ => None,
            })
            .collect()
    }

    /// Turn non-zero exit codes into an error naming the command and hosts.
    pub fn ensure_success(self, cmd: &str) -> anyhow::Result<Self> {
        if self.success() {
            return Ok(self);
        }
        let failed = self
            .failed_hosts()
            .iter()
            .map(|(h, c)| format!("{} (exit {})", h, c))
            .collect::<Vec<_>>()
            .join(", ");
        anyhow::bail!("command failed on {}: {}", failed, cmd)
    }

    /// Stdout of every host concatenated in host order.
    pub fn stdout(&self) -> String {
        self.hosts
            .values()
            .map(|h| h.stdout.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Runs commands on behalf of packages and the orchestrator.
pub trait Exec: Send + Sync {
    fn run(&self, cmd: &str, opts: &ExecOptions) -> anyhow::Result<ExecOutput>;
}
