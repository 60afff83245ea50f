use std::collections::BTreeMap;

/// Environment variables threaded through a pipeline run.
pub type EnvMap = BTreeMap<String, String>;

/// The dynamic-library preload variable.
///
/// Never stored in a package's plain `env`; only `mod_env` carries it.
pub const PRELOAD_KEY: &str = "LD_PRELOAD";

/// Split a pipeline environment into the `(env, mod_env)` pair a package sees.
///
/// `env` drops [`PRELOAD_KEY`]; `mod_env` is `env` plus the preload value when present.
pub fn split_env(pipeline_env: &EnvMap) -> (EnvMap, EnvMap) {
    let mut env = pipeline_env.clone();
    let preload = env.remove(PRELOAD_KEY);
    let mut mod_env = env.clone();
    if let Some(preload) = preload {
        mod_env.insert(PRELOAD_KEY.to_string(), preload);
    }
    (env, mod_env)
}
