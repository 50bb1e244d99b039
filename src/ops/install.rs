//! Implementation of `cmakeup install`.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::ops::errors::{require_dir, ReturnCodeError};
use crate::ops::toolchain::{Toolchain, ToolchainOptions};
use crate::util::{GlobalContext, ProcessBuilder};

/// Options for the install command.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Generated project directory (default `<build>/cmake`)
    pub project_dir: Option<PathBuf>,

    /// Build configuration for multi-config generators
    pub config: Option<String>,

    /// Override of CMAKE_INSTALL_PREFIX
    pub prefix: Option<PathBuf>,

    /// Pass `--verbose` to cmake
    pub verbose: bool,

    pub toolchain: ToolchainOptions,
}

/// Install a built project.
pub fn install(ctx: &GlobalContext, opts: &InstallOptions) -> Result<()> {
    let project_dir = opts
        .project_dir
        .as_deref()
        .map(|p| ctx.resolve(p))
        .unwrap_or_else(|| ctx.default_project_dir());
    require_dir("project directory", &project_dir)?;

    let toolchain = Toolchain::resolve(ctx, &opts.toolchain)?;
    toolchain.provision()?;

    let cmd = install_command(&toolchain, opts, &project_dir)?;
    let code = cmd.run()?;
    ReturnCodeError::check(&cmd, code)?;
    Ok(())
}

/// `cmake --install <project> [--config C] [--prefix P] [--verbose] <options>`.
pub fn install_command(
    toolchain: &Toolchain,
    opts: &InstallOptions,
    project_dir: &Path,
) -> Result<ProcessBuilder> {
    let mut cmd = toolchain
        .command("cmake")?
        .arg("--install")
        .arg(project_dir);
    if let Some(ref config) = opts.config {
        cmd = cmd.arg("--config").arg(config);
    }
    if let Some(ref prefix) = opts.prefix {
        cmd = cmd.arg("--prefix").arg(prefix);
    }
    if opts.verbose {
        cmd = cmd.arg("--verbose");
    }
    Ok(cmd.options(toolchain.options()))
}
