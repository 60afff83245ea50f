//! Compose file generation.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use pipewright_types::container_paths;
use serde_yaml::{Mapping, Value};

/// What the generated service needs to know about its pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeInput {
    pub pipeline: String,
    pub image: String,
    pub ssh_port: u16,
    pub private_dir: Utf8PathBuf,
    pub shared_dir: Utf8PathBuf,
    /// Host directory with SSH credentials, mounted read-only.
    pub ssh_dir: Utf8PathBuf,
    pub hostfile: Option<Utf8PathBuf>,
    pub extensions: Mapping,
}

/// Arguments after the binary name that run `pipeline_file` inside a
/// container.
pub fn run_args(pipeline_file: &str) -> Vec<String> {
    ["ppl", "run", "yaml", pipeline_file]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn entrypoint_script(ssh_port: u16) -> String {
    format!(
        "mkdir -p /root/.ssh && \
cp -r {ssh_host}/. /root/.ssh/ 2>/dev/null; \
chmod 700 /root/.ssh && chmod 600 /root/.ssh/* 2>/dev/null; \
sed -i 's/^#\\?Port .*/Port {port}/' /etc/ssh/sshd_config && \
/usr/sbin/sshd -p {port}; \
pipewright {run}; EXIT_CODE=$?; pkill sshd; exit $EXIT_CODE",
        ssh_host = container_paths::SSH_HOST,
        port = ssh_port,
        run = run_args(container_paths::PIPELINE_FILE).join(" "),
    )
}

fn strings<I: IntoIterator<Item = String>>(items: I) -> Value {
    Value::Sequence(items.into_iter().map(Value::String).collect())
}

/// The compose document for a containerized pipeline.
///
/// The service always references the already-built image; it never carries a
/// build directive.
pub fn compose_document(input: &ComposeInput) -> Value {
    let mut volumes = vec![
        format!("{}:{}", input.private_dir, container_paths::PRIVATE),
        format!("{}:{}", input.shared_dir, container_paths::SHARED),
        format!("{}:{}:ro", input.ssh_dir, container_paths::SSH_HOST),
    ];
    if let Some(hostfile) = &input.hostfile {
        volumes.push(format!("{}:{}:ro", hostfile, container_paths::HOSTFILE));
    }

    let mut service = Mapping::new();
    service.insert(
        "container_name".into(),
        format!("{}_container", input.pipeline).into(),
    );
    service.insert("image".into(), input.image.clone().into());
    service.insert(
        "entrypoint".into(),
        strings(["/bin/bash".to_string(), "-c".to_string()]),
    );
    service.insert("command".into(), strings([entrypoint_script(input.ssh_port)]));
    service.insert("network_mode".into(), "host".into());
    service.insert("ipc".into(), "host".into());
    service.insert("volumes".into(), strings(volumes));

    let mut merged = Value::Mapping(service);
    merge_overlay(&mut merged, &Value::Mapping(input.extensions.clone()));

    let mut services = Mapping::new();
    services.insert(input.pipeline.clone().into(), merged);
    let mut doc = Mapping::new();
    doc.insert("services".into(), Value::Mapping(services));
    Value::Mapping(doc)
}

/// Recursively apply `overlay` onto `base`.
///
/// Maps merge key by key, sequences are extended, anything else replaces.
pub fn merge_overlay(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (k, v) in overlay {
                match base.get_mut(k) {
                    Some(existing) => merge_overlay(existing, v),
                    None => {
                        base.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (Value::Sequence(base), Value::Sequence(overlay)) => {
            base.extend(overlay.iter().cloned());
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Write the compose document to `path`.
pub fn write_compose(path: &Utf8Path, input: &ComposeInput) -> anyhow::Result<()> {
    let text = serde_yaml::to_string(&compose_document(input)).context("serialize compose file")?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent))?;
    }
    fs::write(path, text).with_context(|| format!("write {}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn input() -> ComposeInput {
        ComposeInput {
            pipeline: "bench1".into(),
            image: "bench1-img".into(),
            ssh_port: 2222,
            private_dir: "/priv/bench1".into(),
            shared_dir: "/shared/bench1".into(),
            ssh_dir: "/home/me/.ssh".into(),
            hostfile: None,
            extensions: Mapping::new(),
        }
    }

    fn service(doc: &Value) -> &Value {
        &doc["services"]["bench1"]
    }

    #[test]
    fn service_references_image_on_host_namespaces() {
        let doc = compose_document(&input());
        let svc = service(&doc);
        assert_eq!(svc["image"], Value::from("bench1-img"));
        assert_eq!(svc["container_name"], Value::from("bench1_container"));
        assert_eq!(svc["network_mode"], Value::from("host"));
        assert_eq!(svc["ipc"], Value::from("host"));
        assert!(svc.get("build").is_none());
        assert_eq!(svc["volumes"].as_sequence().unwrap().len(), 3);
        let cmd = svc["command"][0].as_str().unwrap();
        assert!(cmd.contains("Port 2222"));
        assert!(cmd.contains("pipewright ppl run yaml /root/.pipewright/shared/pipeline.yaml"));
    }

    #[test]
    fn hostfile_is_mounted_read_only() {
        let mut inp = input();
        inp.hostfile = Some("/etc/hosts.txt".into());
        let doc = compose_document(&inp);
        let volumes = service(&doc)["volumes"].as_sequence().unwrap();
        assert_eq!(
            volumes.last().unwrap(),
            &Value::from("/etc/hosts.txt:/root/.pipewright/hostfile:ro")
        );
    }

    #[test]
    fn extensions_merge_recursively() {
        let mut inp = input();
        inp.extensions = serde_yaml::from_str(
            "volumes: [/data:/data]\nnetwork_mode: bridge\ndeploy:\n  resources:\n    limits: {cpus: '2'}\n",
        )
        .unwrap();
        let doc = compose_document(&inp);
        let svc = service(&doc);
        assert_eq!(svc["volumes"].as_sequence().unwrap().len(), 4);
        assert_eq!(svc["network_mode"], Value::from("bridge"));
        assert_eq!(svc["deploy"]["resources"]["limits"]["cpus"], Value::from("2"));
    }

    #[test]
    fn merge_overlay_recurses_into_nested_maps() {
        let mut base: Value = serde_yaml::from_str("a: {x: 1, y: [1]}\nb: 2\n").unwrap();
        let overlay: Value = serde_yaml::from_str("a: {y: [2], z: 3}\nb: 5\n").unwrap();
        merge_overlay(&mut base, &overlay);
        let expected: Value = serde_yaml::from_str("a: {x: 1, y: [1, 2], z: 3}\nb: 5\n").unwrap();
        assert_eq!(base, expected);
    }
}
