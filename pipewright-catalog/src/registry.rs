use crate::error::CatalogError;
use crate::repository::Repository;
use tracing::debug;

/// Ordered repositories plus the builtin repository as last resort.
#[derive(Default)]
pub struct RepositoryRegistry {
    repos: Vec<Box<dyn Repository>>,
    builtin: Option<Box<dyn Repository>>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin(mut self, builtin: Box<dyn Repository>) -> Self {
        self.builtin = Some(builtin);
        self
    }

    /// Add a repository below every repository already registered.
    pub fn push(&mut self, repo: Box<dyn Repository>) {
        self.repos.push(repo);
    }

    /// Registered repositories in priority order, then builtin.
    pub fn repositories(&self) -> impl Iterator<Item = &dyn Repository> {
        self.repos
            .iter()
            .chain(self.builtin.iter())
            .map(|r| r.as_ref())
    }

    pub fn repository(&self, name: &str) -> Option<&dyn Repository> {
        self.repositories().find(|r| r.name() == name)
    }

    /// Resolve a bare or qualified spec to `(repo, name)`.
    pub fn resolve(&self, spec: &str) -> Result<(String, String), CatalogError> {
        if let Some((repo, name)) = spec.split_once('.') {
            return Ok((repo.to_string(), name.to_string()));
        }
        let found = self
            .repos
            .iter()
            .find(|r| r.contains(spec))
            .or_else(|| self.builtin.as_ref().filter(|b| b.contains(spec)));
        match found {
            Some(repo) => {
                debug!(spec, repo = repo.name(), "resolved package");
                Ok((repo.name().to_string(), spec.to_string()))
            }
            None => Err(CatalogError::PackageNotFound {
                spec: spec.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::StaticRepository;
    use pipewright_package::{Package, PackageKind};

    struct Noop;

    impl Package for Noop {
        fn kind(&self) -> PackageKind {
            PackageKind::Application
        }
    }

    fn noop() -> Box<dyn Package> {
        Box::new(Noop)
    }

    fn registry() -> RepositoryRegistry {
        let mut reg = RepositoryRegistry::new().with_builtin(Box::new(
            StaticRepository::new("builtin", "/builtin")
                .register("ior", "Ior", noop)
                .register("redis", "Redis", noop),
        ));
        reg.push(Box::new(
            StaticRepository::new("site", "/site").register("ior", "Ior", noop),
        ));
        reg.push(Box::new(
            StaticRepository::new("lab", "/lab").register("redis", "Redis", noop),
        ));
        reg
    }

    #[test]
    fn first_registered_repo_wins() {
        let reg = registry();
        assert_eq!(reg.resolve("ior").unwrap(), ("site".into(), "ior".into()));
        assert_eq!(reg.resolve("redis").unwrap(), ("lab".into(), "redis".into()));
    }

    #[test]
    fn qualified_spec_is_split() {
        assert_eq!(
            registry().resolve("builtin.ior").unwrap(),
            ("builtin".into(), "ior".into())
        );
    }

    #[test]
    fn builtin_is_last_resort() {
        let reg = RepositoryRegistry::new().with_builtin(Box::new(
            StaticRepository::new("builtin", "/builtin").register("ior", "Ior", noop),
        ));
        assert_eq!(reg.resolve("ior").unwrap().0, "builtin");
        assert!(matches!(
            reg.resolve("nope"),
            Err(CatalogError::PackageNotFound { .. })
        ));
    }
}
