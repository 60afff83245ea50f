use pipewright_package::{
    ConfigOption, ExecOptions, Launcher, OptionType, Package, PackageKind, PackageState,
};
use std::collections::BTreeMap;
use tracing::info;

const REDIS_CONF: &str = include_str!("../../templates/redis.conf");

/// A redis server on every host of the hostfile.
pub struct Redis;

impl Redis {
    fn conf_path(pkg: &PackageState) -> camino::Utf8PathBuf {
        pkg.dirs.shared_dir.join("redis.conf")
    }

    fn port(pkg: &PackageState) -> anyhow::Result<i64> {
        pkg.int("port")
    }
}

impl Package for Redis {
    fn kind(&self) -> PackageKind {
        PackageKind::Service
    }

    fn options(&self) -> Vec<ConfigOption> {
        vec![
            ConfigOption::new("port", OptionType::Int)
                .msg("Port the server listens on")
                .default(6379),
        ]
    }

    fn configure(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        let mut tokens = BTreeMap::new();
        tokens.insert("PKG_ID".to_string(), pkg.pkg_id.clone());
        tokens.insert("PORT".to_string(), Self::port(pkg)?.to_string());
        tokens.insert("DIR".to_string(), pkg.dirs.private_dir.to_string());
        pkg.write_template(REDIS_CONF, &Self::conf_path(pkg), &tokens)?;
        pkg.setenv("REDIS_PORT", &Self::port(pkg)?.to_string());
        Ok(())
    }

    fn start(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        let opts = pkg.exec_options(Launcher::Pssh)?.background();
        pkg.exec(&format!("redis-server {}", Self::conf_path(pkg)), &opts)?;
        pkg.sleep();
        Ok(())
    }

    fn stop(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        let opts = pkg.exec_options(Launcher::Pssh)?;
        pkg.exec(
            &format!("redis-cli -p {} shutdown nosave", Self::port(pkg)?),
            &opts,
        )?;
        Ok(())
    }

    fn kill(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        let opts = ExecOptions::pssh(pkg.hostfile()?);
        pkg.exec("pkill -9 redis-server", &opts)?;
        Ok(())
    }

    fn clean(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        info!(pkg_id = %pkg.pkg_id, dir = %pkg.dirs.private_dir, "removing redis data");
        let opts = ExecOptions::pssh(pkg.hostfile()?);
        pkg.exec(&format!("rm -rf {}/*.rdb", pkg.dirs.private_dir), &opts)?;
        Ok(())
    }

    fn status(&mut self, pkg: &mut PackageState) -> anyhow::Result<String> {
        let opts = pkg.exec_options(Launcher::Local)?.collect().hide(true);
        let out = pkg.exec(&format!("redis-cli -p {} ping", Self::port(pkg)?), &opts)?;
        Ok(if out.stdout().contains("PONG") {
            "running".to_string()
        } else {
            "stopped".to_string()
        })
    }
}
