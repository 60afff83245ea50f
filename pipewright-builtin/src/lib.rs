//! Packages compiled into pipewright.
//!
//! [`builtin_repository`] is registered as the last-resort repository, so a
//! bare `ior` resolves here unless a user repository shadows it.

mod packages;

use pipewright_catalog::StaticRepository;

pub use packages::BUILTIN_REPO;

/// The builtin repository with every shipped package and delegate.
pub fn builtin_repository() -> StaticRepository {
    packages::register(StaticRepository::new(BUILTIN_REPO, "<builtin>"))
}
