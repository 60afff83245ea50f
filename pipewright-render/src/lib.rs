//! Plain-text reports printed by the CLI.

use pipewright_package::ConfigSchema;
use pipewright_types::wire::ContainerManifestV1;
use pipewright_types::{ConfigMap, PipelineState};

/// One line of a status report: alias and status text or error.
pub type StatusLine = (String, Result<String, String>);

pub fn render_status(pipeline: &str, lines: &[StatusLine]) -> String {
    let mut out = format!("Pipeline: {}\n", pipeline);
    if lines.is_empty() {
        out.push_str("No packages in pipeline.\n");
        return out;
    }
    out.push_str("Packages:\n");
    for (pkg_id, status) in lines {
        match status {
            Ok(s) => out.push_str(&format!("  {}: {}\n", pkg_id, s)),
            Err(e) => out.push_str(&format!("  {}: error ({})\n", pkg_id, e)),
        }
    }
    out
}

fn render_config(out: &mut String, config: &ConfigMap, indent: &str) {
    for (k, v) in config {
        out.push_str(&format!("{}{}: {}\n", indent, k, v));
    }
}

/// Human summary of a pipeline.
pub fn render_pipeline(state: &PipelineState) -> String {
    let mut out = format!("Pipeline: {}\n", state.name);
    if let Some(created) = state.created_at {
        out.push_str(&format!("Created: {}\n", created.to_rfc3339()));
    }
    if let Some(file) = &state.last_loaded_file {
        out.push_str(&format!("Loaded from: {}\n", file));
    }
    match &state.hostfile {
        Some(path) => out.push_str(&format!("Hostfile: {}\n", path)),
        None => out.push_str("Hostfile: (global)\n"),
    }
    if let Some(image) = state.container.image_name() {
        out.push_str(&format!(
            "Container: {} ({}, base {})\n",
            image, state.container.engine, state.container.base
        ));
    }

    if state.packages.is_empty() {
        out.push_str("No packages in pipeline.\n");
    } else {
        out.push_str("Packages:\n");
        for def in &state.packages {
            out.push_str(&format!("  {} ({})\n", def.pkg_id, def.pkg_type));
            render_config(&mut out, &def.config, "    ");
        }
    }

    if !state.interceptors.is_empty() {
        out.push_str("Interceptors:\n");
        for (alias, def) in &state.interceptors {
            out.push_str(&format!("  {} ({})\n", alias, def.pkg_type));
            render_config(&mut out, &def.config, "    ");
        }
    }

    if !state.env.is_empty() {
        out.push_str(&format!("Environment: {} variables\n", state.env.len()));
    }
    out
}

/// Option table of a package type.
pub fn render_schema_help(pkg_type: &str, schema: &ConfigSchema) -> String {
    let mut out = format!("Options for {}:\n", pkg_type);
    for opt in schema.options() {
        let default = if opt.is_required() {
            "(required)".to_string()
        } else {
            format!("[default: {}]", opt.default)
        };
        out.push_str(&format!(
            "  {:<16} {:<5} {}",
            opt.name,
            opt.kind.as_str(),
            default
        ));
        if !opt.choices.is_empty() {
            let choices: Vec<String> = opt.choices.iter().map(|c| c.to_string()).collect();
            out.push_str(&format!(" {{{}}}", choices.join(", ")));
        }
        if !opt.msg.is_empty() {
            out.push_str(&format!("  {}", opt.msg));
        }
        out.push('\n');
    }
    out
}

pub fn render_pipeline_list(names: &[String], current: Option<&str>) -> String {
    if names.is_empty() {
        return "No pipelines.\n".to_string();
    }
    let mut out = String::new();
    for name in names {
        let mark = if Some(name.as_str()) == current { "*" } else { " " };
        out.push_str(&format!("{} {}\n", mark, name));
    }
    out
}

pub fn render_container_list(images: &[(String, ContainerManifestV1)]) -> String {
    if images.is_empty() {
        return "No container images.\n".to_string();
    }
    let mut out = String::new();
    for (image, manifest) in images {
        out.push_str(&format!("{}\n", image));
        for (pkg_type, mode) in manifest {
            out.push_str(&format!("  {} ({})\n", pkg_type, mode));
        }
    }
    out
}
