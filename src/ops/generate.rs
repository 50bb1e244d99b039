//! Implementation of `cmakeup generate`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::ops::errors::{ConfigError, ReturnCodeError};
use crate::ops::toolchain::{Toolchain, ToolchainOptions};
use crate::util::{GlobalContext, ProcessBuilder};

/// Options for the generate command.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Directory containing the top-level CMakeLists.txt
    pub source_path: PathBuf,

    /// Directory the project files are generated into (default `<build>/cmake`)
    pub project_dir: Option<PathBuf>,

    /// CMake generator, e.g. "Ninja"
    pub generator: Option<String>,

    /// Deprecated spelling of `project_dir`
    pub target_path: Option<PathBuf>,

    pub toolchain: ToolchainOptions,
}

/// Generate the CMake project files.
pub fn generate(ctx: &GlobalContext, opts: &GenerateOptions) -> Result<()> {
    let (source, project_dir) = validate(ctx, opts)?;
    let toolchain = Toolchain::resolve(ctx, &opts.toolchain)?;
    toolchain.provision()?;

    std::fs::create_dir_all(&project_dir)
        .with_context(|| format!("failed to create directory: {}", project_dir.display()))?;

    let cmd = generate_command(&toolchain, opts, &source, &project_dir)?;
    let code = cmd.run()?;
    ReturnCodeError::check(&cmd, code)?;
    Ok(())
}

fn validate(ctx: &GlobalContext, opts: &GenerateOptions) -> Result<(PathBuf, PathBuf), ConfigError> {
    if opts.target_path.is_some() {
        return Err(ConfigError::Renamed {
            old: "--target-path",
            new: "--project-dir",
        });
    }
    let source = ctx.resolve(&opts.source_path);
    if !source.exists() {
        return Err(ConfigError::Missing {
            what: "source path",
            path: source,
        });
    }
    let project_dir = opts
        .project_dir
        .as_deref()
        .map(|p| ctx.resolve(p))
        .unwrap_or_else(|| ctx.default_project_dir());
    Ok((source, project_dir))
}

/// `cmake [-G generator] <options> <source>`, run in the project directory.
pub fn generate_command(
    toolchain: &Toolchain,
    opts: &GenerateOptions,
    source: &Path,
    project_dir: &Path,
) -> Result<ProcessBuilder> {
    let mut cmd = toolchain.command("cmake")?.cwd(project_dir);
    // A blank generator leaves the choice to cmake.
    if let Some(generator) = opts.generator.as_deref().filter(|g| !g.trim().is_empty()) {
        cmd = cmd.arg("-G").arg(generator);
    }
    Ok(cmd.options(toolchain.options()).arg(source))
}
