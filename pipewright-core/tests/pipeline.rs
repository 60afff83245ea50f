use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use pipewright_builtin::builtin_repository;
use pipewright_catalog::{RepositoryRegistry, StaticRepository};
use pipewright_container::{ComposeAction, run_args};
use pipewright_core::adapters::{
    EngineCall, InMemoryCurrentPipeline, RecordingEngine, RecordingExec, StaticEnvironments,
};
use pipewright_core::{ConfigureOutcome, Pipeline, PipelineError, Runtime};
use pipewright_package::{
    ConfigOption, ExecOptions, OptionType, Package, PackageKind, PackageState,
};
use pipewright_types::{
    ConfigValue, DeployMode, EnvMap, Layout, PRELOAD_KEY, container_paths, files,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

// ---- test packages ----------------------------------------------------------

/// Records each lifecycle hook as `<phase> <pkg_id>`; fails the phase named by
/// its `fail_on` option.
struct Recorder;

impl Recorder {
    fn hook(pkg: &PackageState, phase: &str) -> anyhow::Result<()> {
        if pkg.str_opt("fail_on") == Some(phase) {
            anyhow::bail!("{} refused to {}", pkg.pkg_id, phase);
        }
        pkg.exec(&format!("{} {}", phase, pkg.pkg_id), &ExecOptions::local())?;
        Ok(())
    }
}

impl Package for Recorder {
    fn kind(&self) -> PackageKind {
        PackageKind::Application
    }

    fn options(&self) -> Vec<ConfigOption> {
        vec![ConfigOption::new("fail_on", OptionType::Str).default("")]
    }

    fn configure(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        Self::hook(pkg, "configure")
    }

    fn start(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        Self::hook(pkg, "start")
    }

    fn stop(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        Self::hook(pkg, "stop")
    }

    fn kill(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        Self::hook(pkg, "kill")
    }

    fn clean(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        Self::hook(pkg, "clean")
    }
}

struct Setter;

impl Package for Setter {
    fn kind(&self) -> PackageKind {
        PackageKind::Service
    }

    fn start(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        pkg.setenv("X", "1");
        Ok(())
    }
}

/// Reports what its environment views contain when started.
struct Observer;

impl Package for Observer {
    fn kind(&self) -> PackageKind {
        PackageKind::Application
    }

    fn start(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        let env = pkg.env();
        let mod_env = pkg.mod_env();
        let get = |m: &EnvMap, k: &str| m.get(k).cloned().unwrap_or_else(|| "-".to_string());
        let line = format!(
            "observe X={} ENV_PRELOAD={} MOD_PRELOAD={}",
            get(&env, "X"),
            get(&env, PRELOAD_KEY),
            get(&mod_env, PRELOAD_KEY)
        );
        pkg.exec(&line, &ExecOptions::local())?;
        Ok(())
    }
}

struct Preload;

impl Package for Preload {
    fn kind(&self) -> PackageKind {
        PackageKind::Interceptor
    }

    fn modify_env(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        pkg.prepend_env(PRELOAD_KEY, "libfoo.so");
        Ok(())
    }
}

struct NeedsInput;

impl Package for NeedsInput {
    fn kind(&self) -> PackageKind {
        PackageKind::Application
    }

    fn options(&self) -> Vec<ConfigOption> {
        vec![ConfigOption::new("input", OptionType::Str).msg("Input file")]
    }
}

fn test_repository() -> StaticRepository {
    StaticRepository::new("test", "/test")
        .register("recorder", "Recorder", || Box::new(Recorder))
        .register("setter", "Setter", || Box::new(Setter))
        .register("observer", "Observer", || Box::new(Observer))
        .register("preload", "Preload", || Box::new(Preload))
        .register("needs_input", "NeedsInput", || Box::new(NeedsInput))
}

// ---- harness ----------------------------------------------------------------

struct Harness {
    _tmp: tempfile::TempDir,
    root: Utf8PathBuf,
    rt: Runtime,
    exec: RecordingExec,
    engine: RecordingEngine,
}

impl Harness {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let mut registry = RepositoryRegistry::new().with_builtin(Box::new(builtin_repository()));
        registry.push(Box::new(test_repository()));

        let mut captured = EnvMap::new();
        captured.insert("PATH".into(), "/usr/bin".into());

        let exec = RecordingExec::new();
        let engine = RecordingEngine::new();
        let rt = Runtime::new(Layout::under(root.join("home")), registry)
            .with_exec(Arc::new(exec.clone()))
            .with_engines(Box::new(engine.clone()))
            .with_environments(Box::new(StaticEnvironments::new(captured)))
            .with_current(Box::new(InMemoryCurrentPipeline::default()))
            .with_ssh_dir("/home/me/.ssh");
        Self {
            _tmp: tmp,
            root,
            rt,
            exec,
            engine,
        }
    }

    fn write(&self, name: &str, text: &str) -> Utf8PathBuf {
        let path = self.root.join(name);
        fs::write(&path, text).unwrap();
        path
    }
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ---- membership -------------------------------------------------------------

#[test]
fn create_makes_pipeline_current() {
    let h = Harness::new();
    let p = Pipeline::create(&h.rt, "bench1").unwrap();
    assert_eq!(h.rt.current.get().unwrap().as_deref(), Some("bench1"));
    assert!(p.pipeline_dirs().iter().all(|d| d.is_dir()));
    assert_eq!(Pipeline::current(&h.rt).unwrap().name(), "bench1");
}

#[test]
fn duplicate_alias_is_rejected_and_pipeline_unchanged() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    p.append("recorder", Some("r1"), &[]).unwrap();
    let before = p.state().clone();

    let err = p.append("setter", Some("r1"), &[]).unwrap_err();
    assert!(matches!(err, PipelineError::IdConflict { ref pkg_id, .. } if pkg_id == "r1"));
    assert_eq!(p.state(), &before);
    assert_eq!(Pipeline::open(&h.rt, "bench1").unwrap().state().packages, before.packages);
}

#[test]
fn append_applies_defaults_and_overrides() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    let def = p.append("ior", Some("ior1"), &args(&["nprocs=4"])).unwrap();
    assert_eq!(def.pkg_type, "builtin.ior");
    assert_eq!(def.global_id, "bench1.ior1");
    assert_eq!(def.config.get("nprocs"), Some(&ConfigValue::Int(4)));
    assert_eq!(def.config.get("ppn"), Some(&ConfigValue::Int(16)));
    assert_eq!(def.config.get("sleep"), Some(&ConfigValue::Int(0)));
}

#[test]
fn missing_required_option_fails_append() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    let err = p.append("needs_input", None, &[]).unwrap_err();
    match err {
        PipelineError::MissingRequiredConfig { pkg_id, options } => {
            assert_eq!(pkg_id, "needs_input");
            assert_eq!(options, vec!["input".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(p.state().packages.is_empty());
    p.append("needs_input", None, &args(&["input=/data/in.bp"]))
        .unwrap();
}

#[test]
fn unknown_package_and_bad_override_are_user_errors() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    let err = p.append("nope", None, &[]).unwrap_err();
    assert!(matches!(err, PipelineError::PackageNotFound { .. }));
    assert_eq!(err.exit_code(), 2);

    let err = p.append("ior", None, &args(&["nprocs=many"])).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConfig { .. }));
}

#[test]
fn interceptors_are_kept_apart_from_packages() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    p.append("preload", Some("pre"), &[]).unwrap();
    assert!(p.state().packages.is_empty());
    assert!(p.state().interceptors.contains_key("pre"));

    let err = p.append("recorder", Some("pre"), &[]).unwrap_err();
    assert!(matches!(err, PipelineError::IdConflict { .. }));
}

#[test]
fn bench1_remove_leaves_no_packages() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    p.append("ior", Some("ior1"), &args(&["nprocs=4"])).unwrap();
    assert!(p.remove("ior1").unwrap().is_some());
    assert!(p.state().packages.is_empty());
    assert_eq!(p.status_report(), "Pipeline: bench1\nNo packages in pipeline.\n");

    assert!(p.remove("ior1").unwrap().is_none());
}

// ---- lifecycle --------------------------------------------------------------

#[test]
fn environment_flows_to_later_packages() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    p.append("setter", Some("a"), &[]).unwrap();
    p.append("observer", Some("b"), &[]).unwrap();
    p.start().unwrap();

    assert_eq!(
        h.exec.commands(),
        vec!["observe X=1 ENV_PRELOAD=- MOD_PRELOAD=-".to_string()]
    );
    assert_eq!(p.state().env.get("X").map(String::as_str), Some("1"));
}

#[test]
fn interceptor_edits_the_target_preload_only() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    p.append("preload", Some("pre"), &[]).unwrap();
    p.append("observer", Some("obs"), &args(&["interceptors=[pre, missing]"]))
        .unwrap();
    p.start().unwrap();

    let cmds = h.exec.commands();
    assert_eq!(cmds.len(), 1);
    assert!(cmds[0].contains("ENV_PRELOAD=-"));
    assert!(cmds[0].contains("MOD_PRELOAD=libfoo.so"));
    assert!(!p.state().env.contains_key(PRELOAD_KEY));
}

#[test]
fn start_stops_at_first_failure() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    p.append("recorder", Some("a"), &[]).unwrap();
    p.append("recorder", Some("b"), &args(&["fail_on=start"]))
        .unwrap();
    p.append("recorder", Some("c"), &[]).unwrap();

    let err = p.start().unwrap_err();
    assert!(matches!(err, PipelineError::Lifecycle { ref pkg_id, .. } if pkg_id == "b"));
    assert_eq!(h.exec.commands(), vec!["start a".to_string()]);
}

#[test]
fn stop_is_best_effort_in_reverse_order() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    p.append("recorder", Some("a"), &[]).unwrap();
    p.append("recorder", Some("b"), &args(&["fail_on=stop"]))
        .unwrap();
    p.append("recorder", Some("c"), &[]).unwrap();

    let failed = p.stop();
    assert_eq!(failed, vec!["b".to_string()]);
    assert_eq!(
        h.exec.commands(),
        vec!["stop c".to_string(), "stop a".to_string()]
    );
}

#[test]
fn kill_reverses_and_clean_keeps_order() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    p.append("recorder", Some("a"), &[]).unwrap();
    p.append("recorder", Some("b"), &[]).unwrap();

    assert!(p.kill().is_empty());
    assert!(p.clean().is_empty());
    assert_eq!(
        h.exec.commands(),
        args(&["kill b", "kill a", "clean a", "clean b"])
    );
}

#[test]
fn run_stops_even_when_start_fails() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    p.append("recorder", Some("a"), &[]).unwrap();
    p.append("recorder", Some("b"), &args(&["fail_on=start"]))
        .unwrap();

    assert!(p.run().is_err());
    assert_eq!(
        h.exec.commands(),
        args(&["start a", "stop b", "stop a"])
    );
}

#[test]
fn status_collects_every_package() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    p.append("recorder", Some("a"), &[]).unwrap();
    p.append("ior", Some("ior1"), &[]).unwrap();
    assert_eq!(
        p.status_report(),
        "Pipeline: bench1\nPackages:\n  a: unknown\n  ior1: unknown\n"
    );
}

// ---- configuration ----------------------------------------------------------

#[test]
fn configure_package_writes_config_back() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    p.append("ior", Some("ior1"), &[]).unwrap();

    let outcome = p.configure_package("ior1", &args(&["nprocs=8"])).unwrap();
    assert!(matches!(outcome, ConfigureOutcome::Configured { .. }));
    let reloaded = Pipeline::open(&h.rt, "bench1").unwrap();
    assert_eq!(
        reloaded.state().package("ior1").unwrap().config.get("nprocs"),
        Some(&ConfigValue::Int(8))
    );
}

#[test]
fn rejected_configuration_keeps_previous_state() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    p.append("recorder", Some("r"), &[]).unwrap();
    let before = p.state().clone();

    let outcome = p.configure_package("r", &args(&["fail_on=configure"])).unwrap();
    match outcome {
        ConfigureOutcome::Rejected { error, help } => {
            assert!(error.contains("refused to configure"));
            assert!(help.starts_with("Options for test.recorder:"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(p.state(), &before);

    let outcome = p.configure_package("r", &args(&["bogus=1"])).unwrap();
    assert!(matches!(outcome, ConfigureOutcome::Rejected { .. }));

    let err = p.configure_package("ghost", &[]).unwrap_err();
    assert!(matches!(err, PipelineError::UnknownPackage { .. }));
}

#[test]
fn update_reconfigures_interceptors_then_packages() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    p.append("recorder", Some("a"), &[]).unwrap();
    p.append("recorder", Some("b"), &[]).unwrap();
    p.update(false, false).unwrap();
    assert_eq!(h.exec.commands(), args(&["configure a", "configure b"]));
}

// ---- environments -----------------------------------------------------------

#[test]
fn env_build_and_copy_replace_the_pipeline_environment() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    p.env_build().unwrap();
    assert_eq!(p.state().env.get("PATH").map(String::as_str), Some("/usr/bin"));

    let err = p.env_copy("gpu").unwrap_err();
    assert!(matches!(err, PipelineError::UnknownEnvironment { .. }));

    let mut gpu = EnvMap::new();
    gpu.insert("CUDA_HOME".into(), "/opt/cuda".into());
    h.rt.environments.save("gpu", &gpu).unwrap();
    p.env_copy("gpu").unwrap();
    assert_eq!(Pipeline::open(&h.rt, "bench1").unwrap().state().env, gpu);
}

// ---- loading files ----------------------------------------------------------

#[test]
fn load_file_resolves_types_and_overlays_defaults() {
    let h = Harness::new();
    let path = h.write(
        "bench.yaml",
        "name: bench1\npkgs:\n  - pkg_type: ior\n    pkg_name: ior1\n    nprocs: 4\n  - pkg_type: test.recorder\n",
    );
    let p = Pipeline::load_file(&h.rt, &path).unwrap();
    let state = p.state();
    assert_eq!(state.package_ids(), args(&["ior1", "recorder"]));
    let ior = state.package("ior1").unwrap();
    assert_eq!(ior.pkg_type, "builtin.ior");
    assert_eq!(ior.config.get("nprocs"), Some(&ConfigValue::Int(4)));
    assert_eq!(ior.config.get("ppn"), Some(&ConfigValue::Int(16)));
    assert!(state.created_at.is_some());
    assert!(state.last_loaded_file.as_ref().unwrap().is_absolute());
    assert_eq!(state.env.get("PATH").map(String::as_str), Some("/usr/bin"));
    assert_eq!(h.rt.current.get().unwrap().as_deref(), Some("bench1"));
}

#[test]
fn load_file_name_falls_back_to_stem() {
    let h = Harness::new();
    let path = h.write("nightly.yaml", "pkgs: []\n");
    assert_eq!(Pipeline::load_file(&h.rt, &path).unwrap().name(), "nightly");
}

#[test]
fn named_environment_is_built_when_missing() {
    let h = Harness::new();
    let path = h.write("p.yaml", "name: p\nenv: gpu\npkgs: []\n");
    assert_eq!(h.rt.environments.load("gpu").unwrap(), None);
    let p = Pipeline::load_file(&h.rt, &path).unwrap();
    let built = h.rt.environments.load("gpu").unwrap().unwrap();
    assert_eq!(p.state().env, built);
}

#[test]
fn inline_environment_maps_are_rejected() {
    let h = Harness::new();
    let path = h.write("p.yaml", "name: p\nenv:\n  PATH: /bin\n");
    let err = Pipeline::load_file(&h.rt, &path).err().unwrap();
    match err {
        PipelineError::InvalidPipelineFile { reason, .. } => {
            assert!(reason.contains("Inline environment dictionaries are not supported"))
        }
        other => panic!("unexpected error: {other}"),
    }

    let path = h.write("q.yaml", "name: q\nenv: [a, b]\n");
    let err = Pipeline::load_file(&h.rt, &path).err().unwrap();
    assert!(matches!(err, PipelineError::InvalidPipelineFile { .. }));
}

#[test]
fn load_file_rejects_alias_shared_with_interceptor() {
    let h = Harness::new();
    let path = h.write(
        "p.yaml",
        "name: p\npkgs:\n  - pkg_type: test.observer\n    pkg_name: x\ninterceptors:\n  - pkg_type: test.preload\n    pkg_name: x\n",
    );
    let err = Pipeline::load_file(&h.rt, &path).err().unwrap();
    assert!(matches!(err, PipelineError::IdConflict { ref pkg_id, .. } if pkg_id == "x"));
}

#[test]
fn loaded_interceptors_apply_on_start() {
    let h = Harness::new();
    let path = h.write(
        "p.yaml",
        "name: p\npkgs:\n  - pkg_type: test.observer\n    interceptors: [pre]\ninterceptors:\n  - pkg_type: test.preload\n    pkg_name: pre\n",
    );
    let mut p = Pipeline::load_file(&h.rt, &path).unwrap();
    p.start().unwrap();
    assert!(h.exec.commands()[0].contains("MOD_PRELOAD=libfoo.so"));
}

// ---- containers -------------------------------------------------------------

const CONTAINER_FILE: &str = "name: boxed\ncontainer_build: boxed-img\ncontainer_engine: docker\npkgs:\n  - pkg_type: ior\n    deploy_mode: container\n";

#[test]
fn containerized_load_builds_once_per_change() {
    let h = Harness::new();
    let path = h.write("boxed.yaml", CONTAINER_FILE);
    let p = Pipeline::load_file(&h.rt, &path).unwrap();
    assert_eq!(h.engine.builds(), 1);

    let store = h.rt.container_store();
    let dockerfile = store.read_dockerfile("boxed-img").unwrap().unwrap();
    assert!(dockerfile.starts_with("FROM "));
    assert!(dockerfile.contains("# Package: builtin.ior (deploy_mode: container)"));
    assert!(p.compose_file().is_file());

    let inner = fs::read_to_string(p.container_pipeline_file()).unwrap();
    assert!(!inner.contains("deploy_mode"));
    assert!(!inner.contains("boxed-img"));

    Pipeline::load_file(&h.rt, &path).unwrap();
    assert_eq!(h.engine.builds(), 1);
}

#[test]
fn containerized_start_and_stop_use_compose() {
    let h = Harness::new();
    let path = h.write("boxed.yaml", CONTAINER_FILE);
    let mut p = Pipeline::load_file(&h.rt, &path).unwrap();
    p.start().unwrap();
    assert!(p.stop().is_empty());
    let actions: Vec<ComposeAction> = h
        .engine
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            EngineCall::Compose { action, .. } => Some(action),
            _ => None,
        })
        .collect();
    assert_eq!(actions, vec![ComposeAction::Up, ComposeAction::Down]);
    assert!(h.exec.commands().is_empty());
}

#[test]
fn forced_rebuild_on_update() {
    let h = Harness::new();
    let path = h.write("boxed.yaml", CONTAINER_FILE);
    let mut p = Pipeline::load_file(&h.rt, &path).unwrap();
    p.update(true, true).unwrap();
    let last = h.engine.calls().into_iter().last().unwrap();
    assert!(matches!(last, EngineCall::Build { no_cache: true, .. }));
    assert_eq!(h.engine.builds(), 2);
}

#[test]
fn configuring_deploy_mode_attaches_package_to_image() {
    let h = Harness::new();
    let path = h.write(
        "mixed.yaml",
        "name: mixed\ncontainer_build: mixed-img\npkgs:\n  - pkg_type: ior\n",
    );
    let mut p = Pipeline::load_file(&h.rt, &path).unwrap();
    assert_eq!(h.engine.builds(), 1);
    let store = h.rt.container_store();
    assert!(store.load_manifest("mixed-img").unwrap().is_empty());

    let outcome = p
        .configure_package("ior", &args(&["deploy_mode=container"]))
        .unwrap();
    assert!(matches!(outcome, ConfigureOutcome::Configured { .. }));
    assert_eq!(
        store.load_manifest("mixed-img").unwrap().get("builtin.ior"),
        Some(&DeployMode::Container)
    );
    assert_eq!(h.engine.builds(), 2);

    p.configure_package("ior", &args(&["nprocs=8"])).unwrap();
    assert_eq!(h.engine.builds(), 2);
}

#[test]
fn pipelines_sharing_an_image_keep_each_others_registrations() {
    let h = Harness::new();
    let alpha = h.write(
        "alpha.yaml",
        "name: alpha\ncontainer_build: shared-img\npkgs:\n  - pkg_type: ior\n    deploy_mode: container\n",
    );
    let beta = h.write(
        "beta.yaml",
        "name: beta\ncontainer_build: shared-img\npkgs:\n  - pkg_type: ior\n",
    );
    Pipeline::load_file(&h.rt, &alpha).unwrap();
    let mut b = Pipeline::load_file(&h.rt, &beta).unwrap();
    b.update(false, false).unwrap();

    let store = h.rt.container_store();
    assert_eq!(
        store.load_manifest("shared-img").unwrap().get("builtin.ior"),
        Some(&DeployMode::Container)
    );
    Pipeline::open(&h.rt, "alpha").unwrap().update(false, false).unwrap();
    assert_eq!(h.engine.builds(), 1);
}

#[test]
fn compose_entrypoint_runs_the_mounted_pipeline_file() {
    let h = Harness::new();
    let path = h.write("boxed.yaml", CONTAINER_FILE);
    let p = Pipeline::load_file(&h.rt, &path).unwrap();

    let compose = fs::read_to_string(p.compose_file()).unwrap();
    let run = format!(
        "pipewright {}",
        run_args(container_paths::PIPELINE_FILE).join(" ")
    );
    assert!(compose.contains(&run), "{compose}");
    assert_eq!(
        Utf8Path::new(container_paths::SHARED).join(files::PIPELINE_FILE),
        container_paths::PIPELINE_FILE
    );

    let inner = Harness::new();
    let mut q = Pipeline::load_file(&inner.rt, &p.container_pipeline_file()).unwrap();
    assert!(!q.state().container.is_containerized());
    q.run().unwrap();
    assert_eq!(inner.engine.builds(), 0);
    assert!(!inner.exec.commands().is_empty());
}

// ---- destroy ----------------------------------------------------------------

#[test]
fn destroy_cleans_removes_and_clears_current() {
    let h = Harness::new();
    let mut p = Pipeline::create(&h.rt, "bench1").unwrap();
    p.append("recorder", Some("a"), &args(&["fail_on=clean"]))
        .unwrap();
    let dirs = p.pipeline_dirs();

    assert_eq!(Pipeline::destroy(&h.rt, None).unwrap(), "bench1");
    assert!(dirs.iter().all(|d| !d.exists()));
    assert_eq!(h.rt.current.get().unwrap(), None);

    let err = Pipeline::destroy(&h.rt, Some("bench1")).unwrap_err();
    assert!(matches!(err, PipelineError::UnknownPipeline { .. }));
    assert!(matches!(
        Pipeline::destroy(&h.rt, None).unwrap_err(),
        PipelineError::NoPipeline
    ));
}

#[test]
fn list_marks_current() {
    let h = Harness::new();
    Pipeline::create(&h.rt, "a").unwrap();
    Pipeline::create(&h.rt, "b").unwrap();
    let (names, current) = Pipeline::list(&h.rt).unwrap();
    assert_eq!(names, args(&["a", "b"]));
    assert_eq!(current.as_deref(), Some("b"));
}
