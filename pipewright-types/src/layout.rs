use camino::{Utf8Path, Utf8PathBuf};

/// Directory roots of an installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: Utf8PathBuf,
    pub config_dir: Utf8PathBuf,
    pub private_dir: Utf8PathBuf,
    pub shared_dir: Utf8PathBuf,
    pub containers_dir: Utf8PathBuf,
}

/// The three per-package directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDirs {
    pub config_dir: Utf8PathBuf,
    pub shared_dir: Utf8PathBuf,
    pub private_dir: Utf8PathBuf,
}

impl PackageDirs {
    pub fn all(&self) -> [&Utf8Path; 3] {
        [&self.config_dir, &self.shared_dir, &self.private_dir]
    }
}

impl Layout {
    /// Default layout with every directory under `root`.
    pub fn under(root: impl Into<Utf8PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_dir: root.join("config"),
            private_dir: root.join("private"),
            shared_dir: root.join("shared"),
            containers_dir: root.join("containers"),
            root,
        }
    }

    pub fn pipelines_dir(&self) -> Utf8PathBuf {
        self.config_dir.join("pipelines")
    }

    pub fn environments_dir(&self) -> Utf8PathBuf {
        self.config_dir.join("env")
    }

    pub fn pipeline_config_dir(&self, pipeline: &str) -> Utf8PathBuf {
        self.pipelines_dir().join(pipeline)
    }

    pub fn pipeline_shared_dir(&self, pipeline: &str) -> Utf8PathBuf {
        self.shared_dir.join(pipeline)
    }

    pub fn pipeline_private_dir(&self, pipeline: &str) -> Utf8PathBuf {
        self.private_dir.join(pipeline)
    }

    pub fn pipeline_dirs(&self, pipeline: &str) -> [Utf8PathBuf; 3] {
        [
            self.pipeline_config_dir(pipeline),
            self.pipeline_shared_dir(pipeline),
            self.pipeline_private_dir(pipeline),
        ]
    }

    pub fn package_dirs(&self, pipeline: &str, pkg_id: &str) -> PackageDirs {
        PackageDirs {
            config_dir: self
                .pipeline_config_dir(pipeline)
                .join("packages")
                .join(pkg_id),
            shared_dir: self.pipeline_shared_dir(pipeline).join(pkg_id),
            private_dir: self.pipeline_private_dir(pipeline).join(pkg_id),
        }
    }
}
