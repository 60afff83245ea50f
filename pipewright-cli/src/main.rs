use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use pipewright_cli::config::{self, ConfigMerger, MergedConfig, PipewrightConfig};
use pipewright_builtin::builtin_repository;
use pipewright_catalog::{Repository, RepositoryRegistry, ScriptRepository};
use pipewright_core::{ConfigureOutcome, Pipeline, PipelineError, Runtime};
use pipewright_render::{render_container_list, render_pipeline_list};
use pipewright_types::Hostfile;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pipewright",
    version,
    about = "Ordered lifecycle orchestration for HPC application and benchmark pipelines."
)]
struct Cli {
    /// Installation root holding pipewright.toml (default: $HOME/.pipewright).
    #[arg(long, global = true, env = "PIPEWRIGHT_ROOT")]
    root: Option<Utf8PathBuf>,

    /// Hostfile for this invocation, overriding the configured one.
    #[arg(long, global = true)]
    hostfile: Option<Utf8PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write pipewright.toml and create the directory layout.
    Init(InitArgs),
    /// Pipeline operations on the current pipeline.
    #[command(subcommand)]
    Ppl(PplCommand),
    /// Single-package operations within the current pipeline.
    #[command(subcommand)]
    Pkg(PkgCommand),
    /// Manage package repositories.
    #[command(subcommand)]
    Repo(RepoCommand),
    /// Manage named environments.
    #[command(subcommand)]
    Env(EnvCommand),
    /// Inspect recorded container images.
    #[command(subcommand)]
    Container(ContainerCommand),
    /// Manage the global hostfile.
    #[command(subcommand)]
    Hostfile(HostfileCommand),
}

#[derive(Debug, Parser)]
struct InitArgs {
    #[arg(long)]
    config_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    private_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    shared_dir: Option<Utf8PathBuf>,

    /// Overwrite an existing pipewright.toml.
    #[arg(long, default_value_t = false)]
    force: bool,
}

#[derive(Debug, Subcommand)]
enum PplCommand {
    /// Create an empty pipeline and make it current.
    Create { name: String },
    /// Append a package: `append <type> [alias] [key=value ...]`.
    Append {
        pkg_type: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Remove a package or interceptor by alias.
    Rm { pkg_id: String },
    /// Load a pipeline file and make it current.
    Load { path: Utf8PathBuf },
    /// Persist the current pipeline.
    Save,
    /// Make an existing pipeline current.
    Cd { name: String },
    /// Rebuild the container image if needed and reconfigure every package.
    Update {
        /// Force an image rebuild.
        #[arg(long, default_value_t = false)]
        rebuild: bool,
        #[arg(long, default_value_t = false)]
        no_cache: bool,
    },
    /// Reconfigure every package from its saved config.
    Configure,
    Start,
    Stop,
    Kill,
    Clean,
    /// Start, then stop even if start failed: `run [current | yaml <file>]`.
    Run {
        /// `current` (default) or `yaml` to load `pipeline_file` first.
        load_type: Option<String>,
        pipeline_file: Option<Utf8PathBuf>,
    },
    Status,
    /// Clean and delete a pipeline (default: the current one).
    Destroy { name: Option<String> },
    /// List pipelines, marking the current one.
    List,
    /// Print the current pipeline.
    Print,
    /// Print pipeline or package directories.
    Path { pkg_id: Option<String> },
    /// Replace the pipeline environment.
    #[command(subcommand)]
    Env(PplEnvCommand),
}

#[derive(Debug, Subcommand)]
enum PplEnvCommand {
    /// Capture the current shell environment.
    Build,
    /// Copy a named environment.
    Copy { name: String },
    /// Print the pipeline environment as `KEY=value` lines.
    Show,
}

#[derive(Debug, Subcommand)]
#[command(disable_help_subcommand = true)]
enum PkgCommand {
    /// Reconfigure one package with `key=value` overrides.
    Configure {
        pkg_id: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        overrides: Vec<String>,
    },
    /// Print the package's Dockerfile fragment.
    Augment { pkg_id: String },
    Status { pkg_id: String },
    /// Print the option table of a package type.
    Help { pkg_type: String },
    /// Print the README shipped with a package type.
    Readme { pkg_type: String },
}

#[derive(Debug, Subcommand)]
enum RepoCommand {
    /// Register a repository directory at the highest priority.
    Add {
        path: Utf8PathBuf,
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Unregister a repository by name.
    Rm { name: String },
    List,
}

#[derive(Debug, Subcommand)]
enum EnvCommand {
    /// Capture the current shell environment under a name.
    Build { name: String },
    List,
    Show { name: String },
}

#[derive(Debug, Subcommand)]
enum ContainerCommand {
    List,
    /// Forget an image's manifest, Dockerfile and snapshot.
    Remove { image: String },
    /// Rebuild an image from its stored Dockerfile.
    Update {
        image: String,
        #[arg(long, default_value_t = false)]
        no_cache: bool,
    },
}

#[derive(Debug, Subcommand)]
enum HostfileCommand {
    Set { path: Utf8PathBuf },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match real_main() {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

/// 2 for user errors, 1 for runtime failures.
fn exit_code(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<PipelineError>() {
        Some(pe) => pe.exit_code(),
        None if e.is::<UsageError>() => 2,
        None => 1,
    }
}

#[derive(Debug)]
struct UsageError(String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}

fn real_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => default_root()?,
    };
    debug!("installation root {}", root);

    let file_config = config::load_or_default(&root).context("load pipewright.toml config")?;
    match cli.cmd {
        Command::Init(args) => cmd_init(&root, file_config, args),
        Command::Repo(cmd) => cmd_repo(&root, file_config, cmd),
        Command::Hostfile(HostfileCommand::Set { path }) => {
            cmd_hostfile_set(&root, file_config, &path)
        }
        cmd => {
            let merged = ConfigMerger::new(file_config)
                .merge_global_args(&root, cli.hostfile.as_deref())?;
            let rt = runtime(&merged)?;
            match cmd {
                Command::Ppl(cmd) => cmd_ppl(&rt, &merged, cmd),
                Command::Pkg(cmd) => cmd_pkg(&rt, cmd),
                Command::Env(cmd) => cmd_env(&rt, cmd),
                Command::Container(cmd) => cmd_container(&rt, &merged, cmd),
                Command::Init(_) | Command::Repo(_) | Command::Hostfile(_) => Ok(()),
            }
        }
    }
}

fn default_root() -> anyhow::Result<Utf8PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set; pass --root")?;
    Ok(Utf8PathBuf::from(home).join(".pipewright"))
}

/// Build the runtime context once for this process.
fn runtime(merged: &MergedConfig) -> anyhow::Result<Runtime> {
    let mut registry = RepositoryRegistry::new().with_builtin(Box::new(builtin_repository()));
    for path in &merged.repos {
        match ScriptRepository::open(path.clone()) {
            Ok(repo) => registry.push(Box::new(repo)),
            Err(e) => warn!(repo = %path, error = %format!("{e:#}"), "skipping repository"),
        }
    }
    let mut rt = Runtime::new(merged.layout.clone(), registry);
    if let Some(path) = &merged.hostfile {
        let hostfile = Hostfile::load(path).with_context(|| format!("load hostfile {}", path))?;
        rt = rt.with_hostfile(hostfile);
    }
    Ok(rt)
}

// ---- init / repo / hostfile -------------------------------------------------

fn cmd_init(root: &Utf8Path, existing: PipewrightConfig, args: InitArgs) -> anyhow::Result<()> {
    if config::discover_config(root).is_some() && !args.force {
        return Err(UsageError(format!(
            "{} already exists in {}; use --force to overwrite",
            config::CONFIG_FILE_NAME,
            root
        ))
        .into());
    }
    let config = PipewrightConfig {
        config_dir: args.config_dir.or(existing.config_dir),
        private_dir: args.private_dir.or(existing.private_dir),
        shared_dir: args.shared_dir.or(existing.shared_dir),
        ..existing
    };
    let path = config::save_config(root, &config)?;
    let merged = ConfigMerger::new(config).merge_global_args(root, None)?;
    let layout = &merged.layout;
    for dir in [
        &layout.config_dir,
        &layout.private_dir,
        &layout.shared_dir,
        &layout.containers_dir,
    ] {
        fs_err::create_dir_all(dir).with_context(|| format!("create {}", dir))?;
    }
    info!("initialized {}", path);
    println!("{}", path);
    Ok(())
}

fn cmd_repo(root: &Utf8Path, mut config: PipewrightConfig, cmd: RepoCommand) -> anyhow::Result<()> {
    match cmd {
        RepoCommand::Add { path, force } => {
            let path = path
                .canonicalize_utf8()
                .with_context(|| format!("resolve {}", path))?;
            let repo = ScriptRepository::open(path.clone())?;
            config::add_repo(&mut config, path.clone(), force)
                .map_err(|e| UsageError(e.to_string()))?;
            config::save_config(root, &config)?;
            info!(repo = repo.name(), path = %path, packages = repo.packages().len(), "added repository");
        }
        RepoCommand::Rm { name } => {
            if config::remove_repo(&mut config, &name) == 0 {
                return Err(UsageError(format!("no repository named '{}'", name)).into());
            }
            config::save_config(root, &config)?;
            info!(repo = %name, "removed repository");
        }
        RepoCommand::List => {
            for path in &config.repos {
                let name = path.file_name().unwrap_or(path.as_str());
                println!("{}: {}", name, path);
            }
            println!("builtin: <builtin>");
        }
    }
    Ok(())
}

fn cmd_hostfile_set(root: &Utf8Path, mut config: PipewrightConfig, path: &Utf8Path) -> anyhow::Result<()> {
    let path = path
        .canonicalize_utf8()
        .with_context(|| format!("resolve {}", path))?;
    let hostfile = Hostfile::load(&path).with_context(|| format!("load hostfile {}", path))?;
    config.hostfile = Some(path.clone());
    config::save_config(root, &config)?;
    info!(hostfile = %path, hosts = hostfile.len(), "set global hostfile");
    Ok(())
}

// ---- pipelines ---------------------------------------------------------------

/// Split `[alias] [overrides...]`: a leading word without `=` or a sign
/// prefix names the package.
fn split_alias(args: Vec<String>) -> (Option<String>, Vec<String>) {
    let mut iter = args.into_iter().peekable();
    let alias = iter
        .next_if(|a| !a.contains('=') && !a.starts_with(['-', '+']))
        .filter(|a| !a.is_empty());
    (alias, iter.collect())
}

fn report_failures(phase: &str, failed: &[String]) {
    if !failed.is_empty() {
        warn!(phase, ?failed, "some packages failed");
    }
}

fn cmd_ppl(rt: &Runtime, merged: &MergedConfig, cmd: PplCommand) -> anyhow::Result<()> {
    match cmd {
        PplCommand::Create { name } => {
            let mut pipeline = Pipeline::create(rt, &name)?;
            if let Some(engine) = merged.engine {
                let mut state = pipeline.into_state();
                state.container.engine = engine;
                pipeline = Pipeline::from_state(rt, state);
                pipeline.save()?;
            }
            info!(pipeline = %pipeline.name(), "created pipeline");
        }
        PplCommand::Append { pkg_type, args } => {
            let (alias, overrides) = split_alias(args);
            let mut pipeline = Pipeline::current(rt)?;
            pipeline.append(&pkg_type, alias.as_deref(), &overrides)?;
        }
        PplCommand::Rm { pkg_id } => {
            Pipeline::current(rt)?.remove(&pkg_id)?;
        }
        PplCommand::Load { path } => {
            let pipeline = Pipeline::load_file(rt, &path)?;
            println!("{}", pipeline.name());
        }
        PplCommand::Save => Pipeline::current(rt)?.save()?,
        PplCommand::Cd { name } => {
            let pipeline = Pipeline::open(rt, &name)?;
            rt.current.set(Some(pipeline.name()))?;
            info!(pipeline = %name, "switched current pipeline");
        }
        PplCommand::Update { rebuild, no_cache } => {
            Pipeline::current(rt)?.update(rebuild, no_cache)?;
        }
        PplCommand::Configure => Pipeline::current(rt)?.configure_all()?,
        PplCommand::Start => Pipeline::current(rt)?.start()?,
        PplCommand::Stop => report_failures("stop", &Pipeline::current(rt)?.stop()),
        PplCommand::Kill => report_failures("kill", &Pipeline::current(rt)?.kill()),
        PplCommand::Clean => report_failures("clean", &Pipeline::current(rt)?.clean()),
        PplCommand::Run {
            load_type,
            pipeline_file,
        } => run_pipeline(rt, load_type.as_deref(), pipeline_file.as_deref())?,
        PplCommand::Status => print!("{}", Pipeline::current(rt)?.status_report()),
        PplCommand::Destroy { name } => {
            let name = Pipeline::destroy(rt, name.as_deref())?;
            println!("destroyed {}", name);
        }
        PplCommand::List => {
            let (names, current) = Pipeline::list(rt)?;
            print!("{}", render_pipeline_list(&names, current.as_deref()));
        }
        PplCommand::Print => print!("{}", Pipeline::current(rt)?.print()),
        PplCommand::Path { pkg_id } => {
            let pipeline = Pipeline::current(rt)?;
            match pkg_id {
                Some(pkg_id) => {
                    let dirs = pipeline.package_dirs(&pkg_id)?;
                    println!("config: {}", dirs.config_dir);
                    println!("shared: {}", dirs.shared_dir);
                    println!("private: {}", dirs.private_dir);
                }
                None => {
                    let [config, shared, private] = pipeline.pipeline_dirs();
                    println!("config: {}", config);
                    println!("shared: {}", shared);
                    println!("private: {}", private);
                }
            }
        }
        PplCommand::Env(PplEnvCommand::Build) => Pipeline::current(rt)?.env_build()?,
        PplCommand::Env(PplEnvCommand::Copy { name }) => Pipeline::current(rt)?.env_copy(&name)?,
        PplCommand::Env(PplEnvCommand::Show) => {
            for (k, v) in &Pipeline::current(rt)?.state().env {
                println!("{}={}", k, v);
            }
        }
    }
    Ok(())
}

fn run_pipeline(
    rt: &Runtime,
    load_type: Option<&str>,
    pipeline_file: Option<&Utf8Path>,
) -> anyhow::Result<()> {
    let mut pipeline = match (load_type.unwrap_or("current"), pipeline_file) {
        ("current", None) => Pipeline::current(rt)?,
        ("yaml", Some(path)) => Pipeline::load_file(rt, path)?,
        ("current", Some(_)) => {
            return Err(UsageError("ppl run current takes no pipeline file".into()).into());
        }
        ("yaml", None) => {
            return Err(UsageError("ppl run yaml needs a pipeline file".into()).into());
        }
        (other, _) => {
            return Err(UsageError(format!(
                "unknown load type '{}'; expected current or yaml",
                other
            ))
            .into());
        }
    };
    pipeline.run()?;
    Ok(())
}

// ---- packages ----------------------------------------------------------------

fn cmd_pkg(rt: &Runtime, cmd: PkgCommand) -> anyhow::Result<()> {
    match cmd {
        PkgCommand::Configure { pkg_id, overrides } => {
            let mut pipeline = Pipeline::current(rt)?;
            match pipeline.configure_package(&pkg_id, &overrides)? {
                ConfigureOutcome::Configured { config } => {
                    for (k, v) in &config {
                        println!("{}: {}", k, v);
                    }
                }
                ConfigureOutcome::Rejected { error, help } => {
                    print!("{}", help);
                    return Err(UsageError(format!("{} not configured: {}", pkg_id, error)).into());
                }
            }
        }
        PkgCommand::Augment { pkg_id } => {
            println!("{}", Pipeline::current(rt)?.augment_package(&pkg_id)?);
        }
        PkgCommand::Status { pkg_id } => {
            println!("{}", Pipeline::current(rt)?.package_status(&pkg_id)?);
        }
        PkgCommand::Help { pkg_type } => print!("{}", Pipeline::package_help(rt, &pkg_type)?),
        PkgCommand::Readme { pkg_type } => print!("{}", Pipeline::package_readme(rt, &pkg_type)?),
    }
    Ok(())
}

// ---- environments / containers ------------------------------------------------

fn cmd_env(rt: &Runtime, cmd: EnvCommand) -> anyhow::Result<()> {
    match cmd {
        EnvCommand::Build { name } => {
            let env = rt.environments.capture()?;
            rt.environments.save(&name, &env)?;
            info!(env = %name, vars = env.len(), "saved environment");
        }
        EnvCommand::List => {
            for name in rt.environments.list()? {
                println!("{}", name);
            }
        }
        EnvCommand::Show { name } => {
            let env = rt
                .environments
                .load(&name)?
                .ok_or(PipelineError::UnknownEnvironment { name })?;
            for (k, v) in &env {
                println!("{}={}", k, v);
            }
        }
    }
    Ok(())
}

fn cmd_container(rt: &Runtime, merged: &MergedConfig, cmd: ContainerCommand) -> anyhow::Result<()> {
    let store = rt.container_store();
    match cmd {
        ContainerCommand::List => {
            let images = store
                .images()?
                .into_iter()
                .map(|image| {
                    let manifest = store.load_manifest(&image)?;
                    Ok((image, manifest))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            print!("{}", render_container_list(&images));
        }
        ContainerCommand::Remove { image } => {
            if !store.remove(&image)? {
                return Err(UsageError(format!("no container image '{}'", image)).into());
            }
            info!(image = %image, "removed container image");
        }
        ContainerCommand::Update { image, no_cache } => {
            Pipeline::update_image(rt, &image, merged.engine.unwrap_or_default(), no_cache)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn alias_is_a_leading_plain_word() {
        assert_eq!(
            split_alias(strings(&["ior1", "nprocs=4"])),
            (Some("ior1".to_string()), strings(&["nprocs=4"]))
        );
        assert_eq!(
            split_alias(strings(&["nprocs=4", "+fpp"])),
            (None, strings(&["nprocs=4", "+fpp"]))
        );
        assert_eq!(
            split_alias(strings(&["--nprocs", "4"])),
            (None, strings(&["--nprocs", "4"]))
        );
        assert_eq!(split_alias(Vec::new()), (None, Vec::new()));
    }

    #[test]
    fn cli_parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "pipewright", "--root", "/tmp/pw", "ppl", "append", "ior", "ior1", "nprocs=4", "-fpp",
        ])
        .unwrap();
        assert_eq!(cli.root.as_deref(), Some(Utf8Path::new("/tmp/pw")));
        match cli.cmd {
            Command::Ppl(PplCommand::Append { pkg_type, args }) => {
                assert_eq!(pkg_type, "ior");
                assert_eq!(args, strings(&["ior1", "nprocs=4", "-fpp"]));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn run_takes_an_optional_pipeline_file() {
        let cli = Cli::try_parse_from(["pipewright", "ppl", "run", "yaml", "/shared/pipeline.yaml"])
            .unwrap();
        match cli.cmd {
            Command::Ppl(PplCommand::Run {
                load_type,
                pipeline_file,
            }) => {
                assert_eq!(load_type.as_deref(), Some("yaml"));
                assert_eq!(pipeline_file.as_deref(), Some(Utf8Path::new("/shared/pipeline.yaml")));
            }
            other => panic!("unexpected command {other:?}"),
        }
        let cli = Cli::try_parse_from(["pipewright", "ppl", "run"]).unwrap();
        assert!(matches!(
            cli.cmd,
            Command::Ppl(PplCommand::Run {
                load_type: None,
                pipeline_file: None
            })
        ));
    }

    #[test]
    fn usage_errors_exit_with_two() {
        let e = anyhow::Error::from(UsageError("bad".into()));
        assert_eq!(exit_code(&e), 2);
        let e = anyhow::Error::from(PipelineError::NoPipeline);
        assert_eq!(exit_code(&e), 2);
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }
}
