use anyhow::bail;
use camino::{Utf8Path, Utf8PathBuf};
use pipewright_package::Package;
use pipewright_types::DeployMode;
use std::collections::BTreeMap;

/// Constructor of a package implementation.
pub type PackageFactory = fn() -> Box<dyn Package>;

/// A named source of package implementations.
pub trait Repository {
    fn name(&self) -> &str;

    fn path(&self) -> &Utf8Path;

    /// Leaf names of the packages this repository provides, sorted.
    fn packages(&self) -> Vec<String>;

    fn contains(&self, name: &str) -> bool {
        self.packages().iter().any(|p| p == name)
    }

    /// On-disk directory of `name`, for repositories backed by one.
    fn package_dir(&self, _name: &str) -> Option<Utf8PathBuf> {
        None
    }

    /// Load the implementation of `name`; it must export `type_name`.
    fn load(&self, name: &str, type_name: &str) -> anyhow::Result<Box<dyn Package>>;

    /// Load the `mode` delegate of `name` from its sibling unit.
    fn load_delegate(
        &self,
        name: &str,
        mode: DeployMode,
        type_name: &str,
    ) -> anyhow::Result<Box<dyn Package>>;
}

struct Unit {
    type_name: &'static str,
    factory: PackageFactory,
    delegates: BTreeMap<DeployMode, (&'static str, PackageFactory)>,
}

/// Repository of compiled-in packages.
pub struct StaticRepository {
    name: String,
    path: Utf8PathBuf,
    units: BTreeMap<String, Unit>,
}

impl StaticRepository {
    pub fn new(name: impl Into<String>, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            units: BTreeMap::new(),
        }
    }

    pub fn register(mut self, name: &str, type_name: &'static str, factory: PackageFactory) -> Self {
        self.units.insert(
            name.to_string(),
            Unit {
                type_name,
                factory,
                delegates: BTreeMap::new(),
            },
        );
        self
    }

    /// Register a deploy-mode delegate for an already registered package.
    pub fn register_delegate(
        mut self,
        name: &str,
        mode: DeployMode,
        type_name: &'static str,
        factory: PackageFactory,
    ) -> Self {
        if let Some(unit) = self.units.get_mut(name) {
            unit.delegates.insert(mode, (type_name, factory));
        }
        self
    }
}

impl Repository for StaticRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn packages(&self) -> Vec<String> {
        self.units.keys().cloned().collect()
    }

    fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    fn load(&self, name: &str, type_name: &str) -> anyhow::Result<Box<dyn Package>> {
        let Some(unit) = self.units.get(name) else {
            bail!("no source unit '{}' in repository '{}'", name, self.name);
        };
        if unit.type_name != type_name {
            bail!(
                "unit '{}' does not export type {} (found {})",
                name,
                type_name,
                unit.type_name
            );
        }
        Ok((unit.factory)())
    }

    fn load_delegate(
        &self,
        name: &str,
        mode: DeployMode,
        type_name: &str,
    ) -> anyhow::Result<Box<dyn Package>> {
        let Some(unit) = self.units.get(name) else {
            bail!("no source unit '{}' in repository '{}'", name, self.name);
        };
        let Some((found, factory)) = unit.delegates.get(&mode) else {
            bail!("no '{}' unit for '{}' (expected type {})", mode, name, type_name);
        };
        if *found != type_name {
            bail!(
                "unit '{}.{}' does not export type {} (found {})",
                name,
                mode,
                type_name,
                found
            );
        }
        Ok(factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_package::PackageKind;

    struct Noop;

    impl Package for Noop {
        fn kind(&self) -> PackageKind {
            PackageKind::Application
        }
    }

    fn noop() -> Box<dyn Package> {
        Box::new(Noop)
    }

    #[test]
    fn load_checks_exported_type_name() {
        let repo = StaticRepository::new("site", "/site").register("hello", "Hello", noop);
        assert!(repo.load("hello", "Hello").is_ok());
        let err = repo.load("hello", "Greeting").err().unwrap();
        assert!(err.to_string().contains("does not export type Greeting"));
    }

    #[test]
    fn missing_delegate_is_an_error() {
        let repo = StaticRepository::new("site", "/site")
            .register("hello", "Hello", noop)
            .register_delegate("hello", DeployMode::Container, "HelloContainer", noop);
        assert!(
            repo.load_delegate("hello", DeployMode::Container, "HelloContainer")
                .is_ok()
        );
        assert!(
            repo.load_delegate("hello", DeployMode::Default, "HelloDefault")
                .is_err()
        );
    }
}
