use anyhow::Context;
use camino::Utf8Path;
use fs_err as fs;
use pipewright_package::{
    ConfigOption, ExecOptions, Launcher, OptionType, Package, PackageKind, PackageState,
};
use tracing::info;

const IOR_DOCKERFILE: &str = "\
RUN apt-get update && apt-get install -y --no-install-recommends \\
    autoconf automake build-essential git libopenmpi-dev openmpi-bin \\
    && rm -rf /var/lib/apt/lists/*
RUN git clone --depth 1 https://github.com/hpc/ior.git /opt/ior \\
    && cd /opt/ior && ./bootstrap && ./configure --prefix=/usr/local \\
    && make -j8 && make install";

/// The IOR parallel I/O benchmark.
pub struct Ior;

impl Ior {
    fn command(pkg: &PackageState) -> anyhow::Result<String> {
        let mut cmd = vec!["ior".to_string(), "-k".to_string()];
        if pkg.flag("write") {
            cmd.push("-w".into());
        }
        if pkg.flag("read") {
            cmd.push("-r".into());
        }
        cmd.push(format!("-t {}", pkg.require_str("xfer")?));
        cmd.push(format!("-b {}", pkg.require_str("block")?));
        cmd.push(format!("-a {}", pkg.require_str("api")?.to_uppercase()));
        cmd.push(format!("-o {}", pkg.require_str("out")?));
        if pkg.flag("fpp") {
            cmd.push("-F".into());
        }
        if pkg.flag("direct") {
            cmd.push("-O useO_DIRECT=1".into());
        }
        if let Some(log) = pkg.str_opt("log") {
            cmd.push(format!("2>&1 | tee {}", log));
        }
        Ok(cmd.join(" "))
    }
}

impl Package for Ior {
    fn kind(&self) -> PackageKind {
        PackageKind::Application
    }

    fn options(&self) -> Vec<ConfigOption> {
        vec![
            ConfigOption::new("nprocs", OptionType::Int)
                .msg("Number of processes")
                .default(1),
            ConfigOption::new("ppn", OptionType::Int)
                .msg("Processes per node")
                .default(16),
            ConfigOption::new("write", OptionType::Bool)
                .msg("Perform a write workload")
                .default(true),
            ConfigOption::new("read", OptionType::Bool)
                .msg("Perform a read workload")
                .default(false),
            ConfigOption::new("xfer", OptionType::Str)
                .msg("Size of each transfer")
                .default("1m"),
            ConfigOption::new("block", OptionType::Str)
                .msg("Amount of data each process moves")
                .default("32m"),
            ConfigOption::new("api", OptionType::Str)
                .msg("I/O interface")
                .default("posix")
                .choices(["posix", "mpiio", "hdf5"]),
            ConfigOption::new("fpp", OptionType::Bool)
                .msg("One file per process")
                .default(false),
            ConfigOption::new("direct", OptionType::Bool)
                .msg("Use O_DIRECT")
                .default(false),
            ConfigOption::new("out", OptionType::Str)
                .msg("Path of the output file")
                .default("/tmp/ior.bin"),
            ConfigOption::new("log", OptionType::Str)
                .msg("Where to write IOR's report (empty disables)")
                .default(""),
        ]
    }

    fn configure(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        let out = pkg.require_str("out")?;
        if let Some(parent) = Utf8Path::new(&out).parent().filter(|p| !p.as_str().is_empty()) {
            let opts = ExecOptions::pssh(pkg.hostfile()?);
            pkg.exec(&format!("mkdir -p {}", parent), &opts)?;
        }
        if let Some(log) = pkg.str_opt("log")
            && let Some(parent) = Utf8Path::new(log).parent().filter(|p| !p.as_str().is_empty())
        {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent))?;
        }
        Ok(())
    }

    fn start(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        let cmd = Self::command(pkg)?;
        let nprocs = u32::try_from(pkg.int("nprocs")?)?;
        let ppn = u32::try_from(pkg.int("ppn")?)?;
        let opts = pkg.exec_options(Launcher::Mpi { nprocs, ppn })?;
        pkg.exec_checked(&cmd, &opts)?;
        pkg.sleep();
        Ok(())
    }

    fn clean(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        let out = pkg.require_str("out")?;
        info!(pkg_id = %pkg.pkg_id, path = %out, "removing ior output");
        let opts = ExecOptions::pssh(pkg.hostfile()?);
        pkg.exec(&format!("rm -rf {}*", out), &opts)?;
        Ok(())
    }

    fn augment_container(&self, _pkg: &PackageState) -> anyhow::Result<String> {
        Ok(IOR_DOCKERFILE.to_string())
    }
}

/// IOR when the pipeline runs inside its container.
///
/// The container entrypoint runs the pipeline with `deploy_mode` stripped,
/// so the host side only reports state.
pub struct IorContainer;

impl Package for IorContainer {
    fn kind(&self) -> PackageKind {
        PackageKind::Application
    }

    fn start(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        info!(pkg_id = %pkg.pkg_id, "ior runs inside the pipeline container");
        Ok(())
    }

    fn status(&mut self, _pkg: &mut PackageState) -> anyhow::Result<String> {
        Ok("containerized".to_string())
    }
}
