//! Reading and writing `pipeline.yaml` and `environment.yaml`.

use crate::error::PipelineError;
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use pipewright_types::wire::PipelineFileV1;
use pipewright_types::{EnvMap, Layout, PipelineState, files};
use tracing::debug;

pub fn pipeline_file(layout: &Layout, name: &str) -> Utf8PathBuf {
    layout.pipeline_config_dir(name).join(files::PIPELINE_FILE)
}

pub fn environment_file(layout: &Layout, name: &str) -> Utf8PathBuf {
    layout.pipeline_config_dir(name).join(files::ENVIRONMENT_FILE)
}

/// Create the config, shared and private directories of a pipeline.
pub fn ensure_pipeline_dirs(layout: &Layout, name: &str) -> anyhow::Result<()> {
    for dir in layout.pipeline_dirs(name) {
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir))?;
    }
    Ok(())
}

/// Persist the pipeline and its environment as two files.
pub fn save_state(layout: &Layout, state: &PipelineState) -> anyhow::Result<()> {
    ensure_pipeline_dirs(layout, &state.name)?;

    let path = pipeline_file(layout, &state.name);
    let text = serde_yaml::to_string(&PipelineFileV1::from(state))
        .context("serialize pipeline")?;
    fs::write(&path, text).with_context(|| format!("write {}", path))?;

    let env_path = environment_file(layout, &state.name);
    let text = serde_yaml::to_string(&state.env).context("serialize environment")?;
    fs::write(&env_path, text).with_context(|| format!("write {}", env_path))?;

    debug!(pipeline = %state.name, path = %path, "saved pipeline");
    Ok(())
}

/// Parse any pipeline file into its wire form.
pub fn read_pipeline_file(path: &Utf8Path) -> Result<PipelineFileV1, PipelineError> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path))?;
    if text.trim().is_empty() {
        return Ok(PipelineFileV1::default());
    }
    serde_yaml::from_str(&text).map_err(|e| PipelineError::InvalidPipelineFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn read_env(path: &Utf8Path) -> anyhow::Result<EnvMap> {
    if !path.is_file() {
        return Ok(EnvMap::new());
    }
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path))?;
    let env: Option<EnvMap> =
        serde_yaml::from_str(&text).with_context(|| format!("parse {}", path))?;
    Ok(env.unwrap_or_default())
}

/// Re-read a pipeline from its own persisted files.
pub fn load_state(layout: &Layout, name: &str) -> Result<PipelineState, PipelineError> {
    let path = pipeline_file(layout, name);
    if !path.is_file() {
        return Err(PipelineError::UnknownPipeline {
            name: name.to_string(),
        });
    }
    let file = read_pipeline_file(&path)?;
    let mut state = file
        .into_state(Some(name))
        .map_err(|e| PipelineError::InvalidPipelineFile {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    state.env = read_env(&environment_file(layout, name))?;
    Ok(state)
}

/// Names of every persisted pipeline, sorted.
pub fn list_pipelines(layout: &Layout) -> anyhow::Result<Vec<String>> {
    let dir = layout.pipelines_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("list {}", dir))? {
        let entry = entry.with_context(|| format!("list {}", dir))?;
        let path = entry.path();
        if path.join(files::PIPELINE_FILE).is_file()
            && let Some(name) = path.file_name().and_then(|n| n.to_str())
        {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Remove every directory of a pipeline; returns whether any existed.
pub fn remove_pipeline_dirs(layout: &Layout, name: &str) -> anyhow::Result<bool> {
    let mut removed = false;
    for dir in layout.pipeline_dirs(name) {
        if dir.is_dir() {
            fs::remove_dir_all(&dir).with_context(|| format!("remove {}", dir))?;
            removed = true;
        }
    }
    Ok(removed)
}
