use anyhow::Context;
use camino::Utf8PathBuf;
use fs_err as fs;
use pipewright_package::{ConfigOption, OptionType, Package, PackageKind, PackageState};
use pipewright_types::PRELOAD_KEY;
use tracing::info;

/// I/O characterization through the darshan runtime library.
pub struct Darshan;

impl Darshan {
    fn log_dir(pkg: &PackageState) -> Utf8PathBuf {
        match pkg.str_opt("log_dir") {
            Some(dir) => dir.into(),
            None => pkg.dirs.private_dir.join("darshan-logs"),
        }
    }
}

impl Package for Darshan {
    fn kind(&self) -> PackageKind {
        PackageKind::Interceptor
    }

    fn options(&self) -> Vec<ConfigOption> {
        vec![
            ConfigOption::new("log_dir", OptionType::Str)
                .msg("Where darshan writes its logs (empty uses the private dir)")
                .default(""),
            ConfigOption::new("library", OptionType::Str)
                .msg("Runtime library to preload")
                .default("darshan"),
        ]
    }

    fn configure(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        let dir = Self::log_dir(pkg);
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir))?;
        pkg.config.insert("log_dir".into(), dir.as_str().into());
        Ok(())
    }

    fn modify_env(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        let library = pkg.str_opt("library").unwrap_or("darshan").to_string();
        let path = pkg
            .find_library(&library)
            .with_context(|| format!("{}: could not find library {}", pkg.pkg_id, library))?;
        pkg.prepend_env(PRELOAD_KEY, path.as_str());
        pkg.setenv("DARSHAN_LOG_DIR_PATH", Self::log_dir(pkg).as_str());
        info!(pkg_id = %pkg.pkg_id, library = %path, "preloading darshan");
        Ok(())
    }
}
