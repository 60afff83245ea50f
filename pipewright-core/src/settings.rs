//! The explicit runtime context threaded through every pipeline operation.

use crate::adapters::{CliEngines, FsCurrentPipeline, FsEnvironments, ShellExec};
use crate::ports::{CurrentPipelineStore, EngineProvider, EnvironmentSource};
use anyhow::Context;
use camino::Utf8PathBuf;
use pipewright_catalog::{PackageLoader, RepositoryRegistry};
use pipewright_container::ContainerStore;
use pipewright_package::{Exec, PipelineContext};
use pipewright_types::{Hostfile, Layout, PipelineState, files};
use std::sync::Arc;

/// Directory roots, repositories, the global hostfile and every I/O port.
///
/// Built once at process start; nothing in the orchestrator reads ambient
/// global state.
pub struct Runtime {
    pub layout: Layout,
    pub registry: RepositoryRegistry,
    /// Used when a pipeline names no hostfile of its own.
    pub hostfile: Hostfile,
    pub exec: Arc<dyn Exec>,
    pub engines: Box<dyn EngineProvider>,
    pub environments: Box<dyn EnvironmentSource>,
    pub current: Box<dyn CurrentPipelineStore>,
    /// Host credential directory mounted into pipeline containers.
    pub ssh_dir: Utf8PathBuf,
}

impl Runtime {
    /// Process- and filesystem-backed ports under `layout`.
    pub fn new(layout: Layout, registry: RepositoryRegistry) -> Self {
        let exec: Arc<dyn Exec> = Arc::new(ShellExec::default());
        let ssh_dir = std::env::var("HOME")
            .map(|home| Utf8PathBuf::from(home).join(".ssh"))
            .unwrap_or_else(|_| Utf8PathBuf::from("/root/.ssh"));
        Self {
            engines: Box::new(CliEngines::new(Arc::clone(&exec))),
            environments: Box::new(FsEnvironments::new(layout.environments_dir())),
            current: Box::new(FsCurrentPipeline::new(layout.root.join(files::STATE_FILE))),
            hostfile: Hostfile::localhost(),
            exec,
            registry,
            layout,
            ssh_dir,
        }
    }

    pub fn with_hostfile(mut self, hostfile: Hostfile) -> Self {
        self.hostfile = hostfile;
        self
    }

    /// Replace the executor; the engine CLIs are rebound to it, so call
    /// [`Runtime::with_engines`] afterwards to substitute engines.
    pub fn with_exec(mut self, exec: Arc<dyn Exec>) -> Self {
        self.engines = Box::new(CliEngines::new(Arc::clone(&exec)));
        self.exec = exec;
        self
    }

    pub fn with_engines(mut self, engines: Box<dyn EngineProvider>) -> Self {
        self.engines = engines;
        self
    }

    pub fn with_environments(mut self, environments: Box<dyn EnvironmentSource>) -> Self {
        self.environments = environments;
        self
    }

    pub fn with_current(mut self, current: Box<dyn CurrentPipelineStore>) -> Self {
        self.current = current;
        self
    }

    pub fn with_ssh_dir(mut self, ssh_dir: impl Into<Utf8PathBuf>) -> Self {
        self.ssh_dir = ssh_dir.into();
        self
    }

    pub fn loader(&self) -> PackageLoader<'_> {
        PackageLoader::new(&self.registry)
    }

    pub fn container_store(&self) -> ContainerStore {
        ContainerStore::new(self.layout.containers_dir.clone())
    }

    /// The pipeline's hostfile, else the global one.
    pub fn effective_hostfile(&self, state: &PipelineState) -> anyhow::Result<Hostfile> {
        match &state.hostfile {
            Some(path) => Hostfile::load(path).with_context(|| format!("load hostfile {}", path)),
            None => Ok(self.hostfile.clone()),
        }
    }

    pub fn context(&self, state: &PipelineState) -> anyhow::Result<PipelineContext> {
        Ok(PipelineContext {
            pipeline: state.name.clone(),
            layout: self.layout.clone(),
            hostfile: self.effective_hostfile(state)?,
            exec: Arc::clone(&self.exec),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingExec;
    use camino::Utf8Path;
    use pipewright_types::ContainerEngineKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn engines_follow_a_replaced_executor() {
        let exec = RecordingExec::new();
        let rt = Runtime::new(Layout::under("/r"), RepositoryRegistry::new())
            .with_exec(Arc::new(exec.clone()));
        rt.engines
            .engine(ContainerEngineKind::Podman)
            .build(Utf8Path::new("/r/img.Dockerfile"), Utf8Path::new("/r"), "img", false)
            .unwrap();
        assert_eq!(
            exec.commands(),
            vec!["podman build -t img -f /r/img.Dockerfile /r".to_string()]
        );
    }
}
