use anyhow::bail;
use pipewright_package::{
    ConfigOption, ExecOptions, Launcher, OptionType, Package, PackageKind, PackageState,
};
use tracing::info;

/// Probability distribution analysis of Gray-Scott output.
pub struct Adios2PdfCalc;

impl Adios2PdfCalc {
    fn command(pkg: &PackageState) -> anyhow::Result<String> {
        let mut cmd = format!(
            "pdf_calc {} {} {}",
            pkg.require_str("input_file")?,
            pkg.require_str("output_file")?,
            pkg.int("nbins")?
        );
        let inputdata = pkg
            .str_opt("output_inputdata")
            .unwrap_or("NO")
            .to_uppercase();
        if inputdata == "YES" {
            cmd.push(' ');
            cmd.push_str(&inputdata);
        }
        Ok(cmd)
    }
}

impl Package for Adios2PdfCalc {
    fn kind(&self) -> PackageKind {
        PackageKind::Application
    }

    fn options(&self) -> Vec<ConfigOption> {
        vec![
            ConfigOption::new("nprocs", OptionType::Int)
                .msg("Number of processes to spawn")
                .default(2),
            ConfigOption::new("ppn", OptionType::Int)
                .msg("Processes per node")
                .default(16),
            ConfigOption::new("input_file", OptionType::Str)
                .msg("Input file from Gray-Scott simulation"),
            ConfigOption::new("output_file", OptionType::Str)
                .msg("Output file for PDF analysis results"),
            ConfigOption::new("nbins", OptionType::Int)
                .msg("Number of bins for PDF calculation")
                .default(1000),
            ConfigOption::new("output_inputdata", OptionType::Str)
                .msg("Write original variables in output (YES/NO)")
                .default("NO"),
        ]
    }

    fn configure(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        for key in ["input_file", "output_file"] {
            if pkg.str_opt(key).is_none() {
                bail!("{} parameter is required for pdf_calc", key);
            }
        }
        Ok(())
    }

    fn start(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        let cmd = Self::command(pkg)?;
        let nprocs = u32::try_from(pkg.int("nprocs")?)?;
        let ppn = u32::try_from(pkg.int("ppn")?)?;
        let opts = pkg.exec_options(Launcher::Mpi { nprocs, ppn })?;
        pkg.exec_checked(&cmd, &opts)?;
        Ok(())
    }

    fn clean(&mut self, pkg: &mut PackageState) -> anyhow::Result<()> {
        if let Some(out) = pkg.str_opt("output_file") {
            info!(pkg_id = %pkg.pkg_id, path = out, "removing output");
            let opts = ExecOptions::pssh(pkg.hostfile()?);
            pkg.exec(&format!("rm -rf {}", out), &opts)?;
        }
        Ok(())
    }
}
