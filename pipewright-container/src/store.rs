use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use pipewright_types::wire::{ContainerManifestV1, SnapshotV1};
use tracing::debug;

/// Files describing container images, one set per image name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStore {
    dir: Utf8PathBuf,
}

impl ContainerStore {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn manifest_path(&self, image: &str) -> Utf8PathBuf {
        self.dir.join(format!("{}.yaml", image))
    }

    pub fn dockerfile_path(&self, image: &str) -> Utf8PathBuf {
        self.dir.join(format!("{}.Dockerfile", image))
    }

    pub fn snapshot_path(&self, image: &str) -> Utf8PathBuf {
        self.dir.join(format!("{}.manifest", image))
    }

    /// The manifest of `image`, empty when none was recorded.
    pub fn load_manifest(&self, image: &str) -> anyhow::Result<ContainerManifestV1> {
        let path = self.manifest_path(image);
        if !path.is_file() {
            return Ok(ContainerManifestV1::new());
        }
        let text = fs::read_to_string(&path).with_context(|| format!("read {}", path))?;
        if text.trim().is_empty() {
            return Ok(ContainerManifestV1::new());
        }
        serde_yaml::from_str(&text).with_context(|| format!("parse {}", path))
    }

    pub fn save_manifest(&self, image: &str, manifest: &ContainerManifestV1) -> anyhow::Result<()> {
        let path = self.manifest_path(image);
        let text = serde_yaml::to_string(manifest).context("serialize container manifest")?;
        self.write(&path, &text)
    }

    pub fn load_snapshot(&self, image: &str) -> anyhow::Result<Option<SnapshotV1>> {
        let path = self.snapshot_path(image);
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).with_context(|| format!("read {}", path))?;
        match serde_json::from_str(&text) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                debug!(path = %path, error = %e, "ignoring unreadable snapshot");
                Ok(None)
            }
        }
    }

    pub fn save_snapshot(&self, image: &str, snapshot: &SnapshotV1) -> anyhow::Result<()> {
        let path = self.snapshot_path(image);
        let text = serde_json::to_string_pretty(snapshot).context("serialize snapshot")?;
        self.write(&path, &text)
    }

    pub fn dockerfile_exists(&self, image: &str) -> bool {
        self.dockerfile_path(image).is_file()
    }

    pub fn read_dockerfile(&self, image: &str) -> anyhow::Result<Option<String>> {
        let path = self.dockerfile_path(image);
        if !path.is_file() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .with_context(|| format!("read {}", path))
    }

    pub fn write_dockerfile(&self, image: &str, contents: &str) -> anyhow::Result<()> {
        self.write(&self.dockerfile_path(image), contents)
    }

    /// Image names with a manifest, sorted.
    pub fn images(&self) -> anyhow::Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = format!("{}/*.yaml", glob::Pattern::escape(self.dir.as_str()));
        let mut images: Vec<String> = glob::glob(&pattern)
            .with_context(|| format!("list {}", self.dir))?
            .filter_map(Result::ok)
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        images.sort();
        Ok(images)
    }

    /// Delete every file of `image`; returns whether anything existed.
    pub fn remove(&self, image: &str) -> anyhow::Result<bool> {
        let mut removed = false;
        for path in [
            self.manifest_path(image),
            self.dockerfile_path(image),
            self.snapshot_path(image),
        ] {
            if path.is_file() {
                fs::remove_file(&path).with_context(|| format!("remove {}", path))?;
                removed = true;
            }
        }
        Ok(removed)
    }

    fn write(&self, path: &Utf8Path, contents: &str) -> anyhow::Result<()> {
        let parent = path.parent().unwrap_or(&self.dir);
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent))?;
        fs::write(path, contents).with_context(|| format!("write {}", path))
    }
}
