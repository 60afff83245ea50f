use crate::context::PipelineContext;
use crate::exec::{ExecOptions, ExecOutput, Launcher};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use pipewright_types::env::split_env;
use pipewright_types::layout::PackageDirs;
use pipewright_types::{ConfigMap, ConfigValue, EnvMap, Hostfile, PRELOAD_KEY, PackageDefinition};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info};

/// An environment view that can be aliased between instances.
pub type SharedEnv = Rc<RefCell<EnvMap>>;

const SYSTEM_LIB_DIRS: &[&str] = &[
    "/usr/lib",
    "/usr/local/lib",
    "/usr/lib64",
    "/usr/local/lib64",
    "/lib",
    "/lib64",
];

/// Per-instance data handed to every [`Package`](crate::Package) hook.
#[derive(Debug)]
pub struct PackageState {
    pub pkg_type: String,
    pub pkg_id: String,
    pub global_id: String,
    pub config: ConfigMap,
    /// Environment without the preload variable.
    pub env: SharedEnv,
    /// `env` plus the preload variable when set.
    pub mod_env: SharedEnv,
    pub dirs: PackageDirs,
    pub ctx: PipelineContext,
}

impl PackageState {
    /// Seed a fresh instance from a definition and the pipeline environment.
    pub fn new(def: &PackageDefinition, pipeline_env: &EnvMap, ctx: PipelineContext) -> Self {
        let (env, mod_env) = split_env(pipeline_env);
        Self {
            pkg_type: def.pkg_type.clone(),
            pkg_id: def.pkg_id.clone(),
            global_id: def.global_id.clone(),
            config: def.config.clone(),
            env: Rc::new(RefCell::new(env)),
            mod_env: Rc::new(RefCell::new(mod_env)),
            dirs: ctx.layout.package_dirs(&ctx.pipeline, &def.pkg_id),
            ctx,
        }
    }

    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        for dir in self.dirs.all() {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir))?;
        }
        Ok(())
    }

    // ---- environment ------------------------------------------------------

    /// Set a variable. The preload key only goes to `mod_env`.
    pub fn setenv(&self, key: &str, val: &str) {
        if key != PRELOAD_KEY {
            self.env.borrow_mut().insert(key.to_string(), val.to_string());
        }
        self.mod_env
            .borrow_mut()
            .insert(key.to_string(), val.to_string());
    }

    /// Prepend `val` to a colon-separated variable.
    pub fn prepend_env(&self, key: &str, val: &str) {
        let current = if key == PRELOAD_KEY {
            self.mod_env.borrow().get(key).cloned()
        } else {
            self.env.borrow().get(key).cloned()
        };
        let joined = match current {
            Some(cur) if !cur.is_empty() => format!("{}:{}", val, cur),
            _ => val.to_string(),
        };
        self.setenv(key, &joined);
    }

    /// Merge variables into `env`, then rebuild `mod_env` from it.
    pub fn track_env(&self, vars: &EnvMap) {
        {
            let mut env = self.env.borrow_mut();
            for (k, v) in vars.iter().filter(|(k, _)| k.as_str() != PRELOAD_KEY) {
                env.insert(k.clone(), v.clone());
            }
        }
        let mut mod_env = self.env.borrow().clone();
        if let Some(preload) = vars.get(PRELOAD_KEY) {
            mod_env.insert(PRELOAD_KEY.to_string(), preload.clone());
        }
        *self.mod_env.borrow_mut() = mod_env;
    }

    pub fn env(&self) -> EnvMap {
        self.env.borrow().clone()
    }

    pub fn mod_env(&self) -> EnvMap {
        self.mod_env.borrow().clone()
    }

    /// Point this instance's `env`/`mod_env` at `target`'s stores.
    ///
    /// After this call mutations through either instance are visible to both.
    pub fn alias_env_of(&mut self, target: &PackageState) {
        self.env = Rc::clone(&target.env);
        self.mod_env = Rc::clone(&target.mod_env);
    }

    pub fn shares_env_with(&self, other: &PackageState) -> bool {
        Rc::ptr_eq(&self.env, &other.env) && Rc::ptr_eq(&self.mod_env, &other.mod_env)
    }

    // ---- config -------------------------------------------------------------

    pub fn value(&self, key: &str) -> Option<&ConfigValue> {
        self.config.get(key)
    }

    /// Non-empty string option.
    pub fn str_opt(&self, key: &str) -> Option<&str> {
        self.value(key)
            .and_then(ConfigValue::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn require_str(&self, key: &str) -> anyhow::Result<String> {
        self.str_opt(key)
            .map(str::to_string)
            .with_context(|| format!("{}: option '{}' is required", self.pkg_id, key))
    }

    pub fn int(&self, key: &str) -> anyhow::Result<i64> {
        self.value(key)
            .and_then(ConfigValue::as_i64)
            .with_context(|| format!("{}: option '{}' must be an integer", self.pkg_id, key))
    }

    pub fn flag(&self, key: &str) -> bool {
        self.value(key)
            .and_then(ConfigValue::as_bool)
            .unwrap_or(false)
    }

    // ---- execution ----------------------------------------------------------

    /// The package hostfile if set, else the pipeline's (or global) hostfile.
    pub fn hostfile(&self) -> anyhow::Result<Hostfile> {
        match self.str_opt("hostfile") {
            Some(path) => Hostfile::load(Utf8Path::new(path))
                .with_context(|| format!("load hostfile {}", path)),
            None => Ok(self.ctx.hostfile.clone()),
        }
    }

    /// Options carrying `mod_env`, the effective hostfile and `hide_output`.
    pub fn exec_options(&self, launcher: Launcher) -> anyhow::Result<ExecOptions> {
        Ok(ExecOptions {
            launcher,
            env: self.mod_env(),
            hostfile: self.hostfile()?,
            hide_output: self.flag("hide_output"),
            ..ExecOptions::default()
        })
    }

    pub fn exec(&self, cmd: &str, opts: &ExecOptions) -> anyhow::Result<ExecOutput> {
        debug!(pkg_id = %self.pkg_id, cmd, "exec");
        self.ctx.exec.run(cmd, opts)
    }

    /// Run and fail on any non-zero exit code.
    pub fn exec_checked(&self, cmd: &str, opts: &ExecOptions) -> anyhow::Result<ExecOutput> {
        self.exec(cmd, opts)?.ensure_success(cmd)
    }

    // ---- files --------------------------------------------------------------

    /// Copy `src` to `dst`, replacing every `##KEY##` token.
    pub fn copy_template_file(
        &self,
        src: &Utf8Path,
        dst: &Utf8Path,
        replacements: &BTreeMap<String, String>,
    ) -> anyhow::Result<()> {
        let template =
            fs::read_to_string(src).with_context(|| format!("read template {}", src))?;
        self.write_template(&template, dst, replacements)?;
        info!(pkg_id = %self.pkg_id, src = %src, dst = %dst, replacements = replacements.len(), "copied template");
        Ok(())
    }

    /// Like [`copy_template_file`](Self::copy_template_file) with in-memory template text.
    pub fn write_template(
        &self,
        template: &str,
        dst: &Utf8Path,
        replacements: &BTreeMap<String, String>,
    ) -> anyhow::Result<()> {
        let rendered = render_template(template, replacements);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent))?;
        }
        fs::write(dst, rendered).with_context(|| format!("write {}", dst))
    }

    /// Sleep for the configured `sleep` seconds.
    pub fn sleep(&self) {
        let secs = self
            .value("sleep")
            .and_then(ConfigValue::as_i64)
            .unwrap_or(0);
        if secs > 0 {
            info!(pkg_id = %self.pkg_id, secs, "sleeping");
            std::thread::sleep(Duration::from_secs(secs as u64));
        }
    }

    /// Locate a shared library through `LD_LIBRARY_PATH` and the system dirs.
    pub fn find_library(&self, name: &str) -> Option<Utf8PathBuf> {
        let candidates = [
            format!("lib{}.so", name),
            format!("{}.so", name),
            format!("lib{}.a", name),
            name.to_string(),
        ];

        let mut search: Vec<String> = Vec::new();
        for path in [
            self.mod_env.borrow().get("LD_LIBRARY_PATH").cloned(),
            self.env.borrow().get("LD_LIBRARY_PATH").cloned(),
            std::env::var("LD_LIBRARY_PATH").ok(),
        ]
        .into_iter()
        .flatten()
        {
            search.extend(path.split(':').map(str::to_string));
        }
        search.extend(SYSTEM_LIB_DIRS.iter().map(|s| s.to_string()));

        search
            .iter()
            .filter(|dir| !dir.is_empty())
            .flat_map(|dir| candidates.iter().map(move |c| Utf8Path::new(dir).join(c)))
            .find(|p| p.is_file())
    }
}

/// Replace `##KEY##` tokens.
pub fn render_template(template: &str, replacements: &BTreeMap<String, String>) -> String {
    replacements
        .iter()
        .fold(template.to_string(), |acc, (k, v)| {
            acc.replace(&format!("##{}##", k), v)
        })
}
