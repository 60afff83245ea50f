//! Manifest bookkeeping and rebuild decisions for one image.

use crate::engine::ContainerEngine;
use crate::error::ContainerError;
use crate::store::ContainerStore;
use pipewright_types::DeployMode;
use pipewright_types::wire::{ContainerManifestV1, SnapshotV1};
use tracing::{debug, info};

/// One package as seen by the image: its type, mode and Dockerfile fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerMember {
    pub pkg_type: String,
    pub deploy_mode: DeployMode,
    pub fragment: String,
}

impl ContainerMember {
    pub fn new(pkg_type: impl Into<String>, deploy_mode: DeployMode, fragment: impl Into<String>) -> Self {
        Self {
            pkg_type: pkg_type.into(),
            deploy_mode,
            fragment: fragment.into(),
        }
    }
}

/// Result of a load-time (batch) pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// The member list differs from the last recorded snapshot.
    pub changed: bool,
    pub rebuilt: bool,
}

/// Keeps one image's manifest, Dockerfile and snapshot in step with its packages.
pub struct ContainerBuildCoordinator<'a> {
    store: &'a ContainerStore,
    engine: &'a dyn ContainerEngine,
    image: String,
    base: String,
}

impl<'a> ContainerBuildCoordinator<'a> {
    pub fn new(
        store: &'a ContainerStore,
        engine: &'a dyn ContainerEngine,
        image: impl Into<String>,
        base: impl Into<String>,
    ) -> Self {
        Self {
            store,
            engine,
            image: image.into(),
            base: base.into(),
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    fn header(&self) -> String {
        format!("FROM {}\nARG DEBIAN_FRONTEND=noninteractive\n", self.base)
    }

    fn section(member: &ContainerMember) -> String {
        format!(
            "\n# Package: {} (deploy_mode: {})\n{}\n",
            member.pkg_type,
            member.deploy_mode,
            member.fragment.trim_end()
        )
    }

    /// Record a package in the image.
    ///
    /// Returns `true` when the manifest changed. A type already present with
    /// the same mode is left alone; with another mode it is a conflict.
    pub fn register_package(&self, member: &ContainerMember) -> Result<bool, ContainerError> {
        let mut manifest = self.store.load_manifest(&self.image)?;
        if let Some(installed) = manifest.get(&member.pkg_type) {
            if *installed == member.deploy_mode {
                info!(image = %self.image, pkg_type = %member.pkg_type, "already installed");
                return Ok(false);
            }
            return Err(ContainerError::Conflict {
                pkg_type: member.pkg_type.clone(),
                installed: *installed,
                requested: member.deploy_mode,
            });
        }

        let mut dockerfile = match self.store.read_dockerfile(&self.image)? {
            Some(existing) => existing,
            None => self.header(),
        };
        dockerfile.push_str(&Self::section(member));
        self.store.write_dockerfile(&self.image, &dockerfile)?;

        manifest.insert(member.pkg_type.clone(), member.deploy_mode);
        self.store.save_manifest(&self.image, &manifest)?;
        info!(
            image = %self.image,
            pkg_type = %member.pkg_type,
            deploy_mode = %member.deploy_mode,
            "registered package in image"
        );
        Ok(true)
    }

    /// Register every container-mode member and build if any was new.
    ///
    /// Returns whether the image was rebuilt.
    pub fn build_if_needed(
        &self,
        members: &[ContainerMember],
        no_cache: bool,
    ) -> Result<bool, ContainerError> {
        let mut changed = false;
        for member in members
            .iter()
            .filter(|m| m.deploy_mode == DeployMode::Container)
        {
            changed |= self.register_package(member)?;
        }
        if changed && self.store.dockerfile_exists(&self.image) {
            self.build(no_cache)?;
            return Ok(true);
        }
        debug!(image = %self.image, changed, "no rebuild needed");
        Ok(false)
    }

    /// Single-package attach: a new registration always rebuilds.
    pub fn register_incremental(
        &self,
        member: &ContainerMember,
        no_cache: bool,
    ) -> Result<bool, ContainerError> {
        if !self.register_package(member)? {
            return Ok(false);
        }
        self.build(no_cache)?;
        Ok(true)
    }

    /// Load-time pass over the whole pipeline.
    ///
    /// Regenerates the Dockerfile from `packages` and `interceptors` and
    /// rebuilds only when the member snapshot differs from the recorded one.
    /// Container-mode members are merged into the image manifest; default-mode
    /// members only contribute their fragment, so other pipelines sharing the
    /// image keep their registrations. Pre-built images are never built.
    pub fn batch(
        &self,
        packages: &[ContainerMember],
        interceptors: &[ContainerMember],
        prebuilt: bool,
        no_cache: bool,
    ) -> Result<BatchOutcome, ContainerError> {
        let snapshot = SnapshotV1::new(
            packages.iter().map(|m| m.pkg_type.clone()),
            interceptors.iter().map(|m| m.pkg_type.clone()),
            self.base.clone(),
        );
        let previous = self.store.load_snapshot(&self.image)?;
        let changed = previous.as_ref() != Some(&snapshot);

        let mut manifest = self.store.load_manifest(&self.image)?;
        let mut written = ContainerManifestV1::new();
        let mut dockerfile = self.header();
        for member in packages.iter().chain(interceptors) {
            if member.deploy_mode == DeployMode::Container {
                match manifest.get(&member.pkg_type) {
                    Some(installed) if *installed != member.deploy_mode => {
                        return Err(ContainerError::Conflict {
                            pkg_type: member.pkg_type.clone(),
                            installed: *installed,
                            requested: member.deploy_mode,
                        });
                    }
                    Some(_) => {}
                    None => {
                        manifest.insert(member.pkg_type.clone(), member.deploy_mode);
                    }
                }
            }
            if written.insert(member.pkg_type.clone(), member.deploy_mode).is_some() {
                continue;
            }
            if !member.fragment.trim().is_empty() {
                dockerfile.push_str(&Self::section(member));
            }
        }

        if !prebuilt {
            self.store.write_dockerfile(&self.image, &dockerfile)?;
        }
        self.store.save_manifest(&self.image, &manifest)?;
        self.store.save_snapshot(&self.image, &snapshot)?;

        let rebuilt = changed && !prebuilt;
        if rebuilt {
            self.build(no_cache)?;
        } else {
            info!(image = %self.image, changed, prebuilt, "skipping image build");
        }
        Ok(BatchOutcome { changed, rebuilt })
    }

    /// Build the image from its Dockerfile.
    pub fn build(&self, no_cache: bool) -> Result<(), ContainerError> {
        let dockerfile = self.store.dockerfile_path(&self.image);
        if !dockerfile.is_file() {
            return Err(ContainerError::MissingDockerfile { path: dockerfile });
        }
        info!(image = %self.image, no_cache, "building image");
        self.engine
            .build(&dockerfile, self.store.dir(), &self.image, no_cache)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ComposeAction;
    use camino::Utf8Path;
    use pipewright_types::Hostfile;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    #[derive(Default)]
    struct CountingEngine {
        builds: RefCell<Vec<(String, bool)>>,
    }

    impl ContainerEngine for CountingEngine {
        fn build(
            &self,
            _dockerfile: &Utf8Path,
            _context_dir: &Utf8Path,
            image: &str,
            no_cache: bool,
        ) -> anyhow::Result<()> {
            self.builds.borrow_mut().push((image.to_string(), no_cache));
            Ok(())
        }

        fn compose(
            &self,
            _compose_file: &Utf8Path,
            _action: ComposeAction,
            _hostfile: &Hostfile,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn store(tmp: &tempfile::TempDir) -> ContainerStore {
        ContainerStore::new(Utf8Path::from_path(tmp.path()).unwrap().join("containers"))
    }

    #[test]
    fn first_registration_writes_header_and_section() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let engine = CountingEngine::default();
        let coord = ContainerBuildCoordinator::new(&store, &engine, "img", "ubuntu:24.04");

        let added = coord
            .register_package(&ContainerMember::new("builtin.ior", DeployMode::Container, "RUN make ior"))
            .unwrap();

        assert!(added);
        assert_eq!(
            store.read_dockerfile("img").unwrap().unwrap(),
            "FROM ubuntu:24.04\nARG DEBIAN_FRONTEND=noninteractive\n\n# Package: builtin.ior (deploy_mode: container)\nRUN make ior\n"
        );
        assert_eq!(
            store.load_manifest("img").unwrap().get("builtin.ior"),
            Some(&DeployMode::Container)
        );
    }

    #[test]
    fn same_mode_twice_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let engine = CountingEngine::default();
        let coord = ContainerBuildCoordinator::new(&store, &engine, "img", "base");
        let member = ContainerMember::new("X", DeployMode::Default, "RUN x");

        assert!(coord.register_package(&member).unwrap());
        let dockerfile = store.read_dockerfile("img").unwrap();
        let manifest = store.load_manifest("img").unwrap();

        assert!(!coord.register_package(&member).unwrap());
        assert_eq!(store.read_dockerfile("img").unwrap(), dockerfile);
        assert_eq!(store.load_manifest("img").unwrap(), manifest);
    }

    #[test]
    fn different_mode_is_a_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let engine = CountingEngine::default();
        let coord = ContainerBuildCoordinator::new(&store, &engine, "img", "base");

        coord
            .register_package(&ContainerMember::new("X", DeployMode::Default, ""))
            .unwrap();
        let err = coord
            .register_package(&ContainerMember::new("X", DeployMode::Container, ""))
            .unwrap_err();

        match err {
            ContainerError::Conflict {
                pkg_type,
                installed,
                requested,
            } => {
                assert_eq!(pkg_type, "X");
                assert_eq!(installed, DeployMode::Default);
                assert_eq!(requested, DeployMode::Container);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn build_if_needed_only_considers_container_members() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let engine = CountingEngine::default();
        let coord = ContainerBuildCoordinator::new(&store, &engine, "img", "base");
        let members = vec![
            ContainerMember::new("a", DeployMode::Default, "RUN a"),
            ContainerMember::new("b", DeployMode::Container, "RUN b"),
        ];

        assert!(coord.build_if_needed(&members, false).unwrap());
        assert!(!coord.build_if_needed(&members, false).unwrap());
        assert_eq!(engine.builds.borrow().len(), 1);
        assert!(!store.load_manifest("img").unwrap().contains_key("a"));
    }

    #[test]
    fn incremental_rebuilds_on_every_new_registration() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let engine = CountingEngine::default();
        let coord = ContainerBuildCoordinator::new(&store, &engine, "img", "base");

        let a = ContainerMember::new("a", DeployMode::Container, "RUN a");
        let b = ContainerMember::new("b", DeployMode::Container, "RUN b");
        assert!(coord.register_incremental(&a, true).unwrap());
        assert!(coord.register_incremental(&b, true).unwrap());
        assert!(!coord.register_incremental(&a, true).unwrap());
        assert_eq!(
            *engine.builds.borrow(),
            vec![("img".to_string(), true), ("img".to_string(), true)]
        );
    }

    #[test]
    fn batch_rebuilds_only_when_snapshot_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let engine = CountingEngine::default();
        let coord = ContainerBuildCoordinator::new(&store, &engine, "img", "base");
        let pkgs = vec![
            ContainerMember::new("builtin.ior", DeployMode::Container, "RUN ior"),
            ContainerMember::new("builtin.redis", DeployMode::Container, ""),
        ];
        let icpts = vec![ContainerMember::new("builtin.darshan", DeployMode::Default, "RUN darshan")];

        let first = coord.batch(&pkgs, &icpts, false, false).unwrap();
        assert_eq!(first, BatchOutcome { changed: true, rebuilt: true });

        let reordered: Vec<_> = pkgs.iter().rev().cloned().collect();
        let second = coord.batch(&reordered, &icpts, false, false).unwrap();
        assert_eq!(second, BatchOutcome { changed: false, rebuilt: false });
        assert_eq!(engine.builds.borrow().len(), 1);

        let dockerfile = store.read_dockerfile("img").unwrap().unwrap();
        assert!(dockerfile.contains("# Package: builtin.darshan (deploy_mode: default)"));
        assert!(!dockerfile.contains("builtin.redis"));
        assert_eq!(
            store.load_snapshot("img").unwrap().unwrap().packages,
            vec!["builtin.ior".to_string(), "builtin.redis".to_string()]
        );
    }

    #[test]
    fn batch_keeps_registrations_of_other_pipelines() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let engine = CountingEngine::default();
        let coord = ContainerBuildCoordinator::new(&store, &engine, "shared-img", "base");

        let first = vec![ContainerMember::new("builtin.ior", DeployMode::Container, "RUN ior")];
        coord.batch(&first, &[], false, false).unwrap();

        let second = vec![
            ContainerMember::new("builtin.ior", DeployMode::Default, "RUN ior"),
            ContainerMember::new("builtin.redis", DeployMode::Default, "RUN redis"),
        ];
        coord.batch(&second, &[], false, false).unwrap();

        let manifest = store.load_manifest("shared-img").unwrap();
        assert_eq!(manifest.get("builtin.ior"), Some(&DeployMode::Container));
        assert!(!manifest.contains_key("builtin.redis"));
    }

    #[test]
    fn batch_rejects_a_container_member_installed_in_another_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let engine = CountingEngine::default();
        let coord = ContainerBuildCoordinator::new(&store, &engine, "shared-img", "base");
        coord
            .register_package(&ContainerMember::new("builtin.ior", DeployMode::Default, ""))
            .unwrap();

        let pkgs = vec![ContainerMember::new("builtin.ior", DeployMode::Container, "RUN ior")];
        let err = coord.batch(&pkgs, &[], false, false).unwrap_err();
        assert!(matches!(err, ContainerError::Conflict { .. }));
    }

    #[test]
    fn batch_never_builds_prebuilt_images() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let engine = CountingEngine::default();
        let coord = ContainerBuildCoordinator::new(&store, &engine, "registry/app:1", "base");
        let pkgs = vec![ContainerMember::new("builtin.ior", DeployMode::Container, "RUN ior")];

        let outcome = coord.batch(&pkgs, &[], true, false).unwrap();
        assert_eq!(outcome, BatchOutcome { changed: true, rebuilt: false });
        assert!(engine.builds.borrow().is_empty());
    }
}
