use crate::schema::ConfigOption;
use crate::state::PackageState;
use serde::Deserialize;
use std::fmt;

/// Package variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    /// Long-running; stopped explicitly.
    Service,
    /// Runs to completion.
    Application,
    /// Modifies another package's environment before it starts.
    Interceptor,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PackageKind::Service => "service",
            PackageKind::Application => "application",
            PackageKind::Interceptor => "interceptor",
        })
    }
}

/// A pluggable unit with a uniform lifecycle.
///
/// Every hook receives the instance's [`PackageState`]. Hooks a package does
/// not implement are no-ops.
pub trait Package {
    fn kind(&self) -> PackageKind;

    /// Package-specific options; the common suffix is appended by the loader.
    fn options(&self) -> Vec<ConfigOption> {
        Vec::new()
    }

    fn init(&mut self, _pkg: &mut PackageState) -> anyhow::Result<()> {
        Ok(())
    }

    /// Validate `pkg.config` and write any derived files.
    fn configure(&mut self, _pkg: &mut PackageState) -> anyhow::Result<()> {
        Ok(())
    }

    fn start(&mut self, _pkg: &mut PackageState) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop(&mut self, _pkg: &mut PackageState) -> anyhow::Result<()> {
        Ok(())
    }

    fn kill(&mut self, _pkg: &mut PackageState) -> anyhow::Result<()> {
        Ok(())
    }

    fn clean(&mut self, _pkg: &mut PackageState) -> anyhow::Result<()> {
        Ok(())
    }

    fn status(&mut self, _pkg: &mut PackageState) -> anyhow::Result<String> {
        Ok("unknown".to_string())
    }

    /// Dockerfile commands installing this package, or empty.
    fn augment_container(&self, _pkg: &PackageState) -> anyhow::Result<String> {
        Ok(String::new())
    }

    /// Interceptors only: mutate `pkg.mod_env` before the target starts.
    fn modify_env(&mut self, _pkg: &mut PackageState) -> anyhow::Result<()> {
        Ok(())
    }
}
