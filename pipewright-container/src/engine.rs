use camino::Utf8Path;
use pipewright_types::Hostfile;

/// What to do with a compose file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeAction {
    /// Start detached.
    Up,
    Down,
    Kill,
}

impl ComposeAction {
    pub fn args(self) -> &'static str {
        match self {
            ComposeAction::Up => "up -d",
            ComposeAction::Down => "down",
            ComposeAction::Kill => "kill",
        }
    }
}

/// Container runtime capability (docker or podman).
pub trait ContainerEngine {
    /// Build `image` from `dockerfile` with `context_dir` as build context.
    fn build(
        &self,
        dockerfile: &Utf8Path,
        context_dir: &Utf8Path,
        image: &str,
        no_cache: bool,
    ) -> anyhow::Result<()>;

    /// Run a compose action on every host of `hostfile`.
    fn compose(
        &self,
        compose_file: &Utf8Path,
        action: ComposeAction,
        hostfile: &Hostfile,
    ) -> anyhow::Result<()>;
}
