//! Toolchain resolution shared by the cmake and ctest goals.
//!
//! Every goal decides whether to use downloaded binaries, locates the
//! `cmake`/`ctest` executable, and builds the child environment from the
//! current process environment plus overrides.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;

use crate::core::platform::{Environment, Platform};
use crate::core::release::{ReleaseCoordinate, DEFAULT_CMAKE_VERSION};
use crate::ops::errors::ConfigError;
use crate::ops::get_binaries::provision;
use crate::util::{GlobalContext, ProcessBuilder};

/// Toolchain options shared by every goal.
///
/// Unset fields fall back to the configuration files.
#[derive(Debug, Clone, Default)]
pub struct ToolchainOptions {
    /// Download prebuilt binaries (default: whether the platform has any)
    pub download: Option<bool>,

    /// Directory containing cmake/ctest, ignored when downloading
    pub cmake_dir: Option<PathBuf>,

    /// CMake version to download
    pub version: Option<String>,

    /// Overrides for existing environment variables
    pub environment: BTreeMap<String, String>,

    /// Extra options appended to the command line
    pub options: Vec<String>,
}

/// A resolved toolchain, ready to build subprocess invocations.
#[derive(Debug, Clone)]
pub struct Toolchain {
    platform: Platform,
    download: bool,
    version: String,
    cmake_dir: Option<PathBuf>,
    build_dir: PathBuf,
    binaries_dir: PathBuf,
    environment: Environment,
    options: Vec<String>,
}

impl Toolchain {
    /// Merge command-line options over configuration and capture the environment.
    pub fn resolve(ctx: &GlobalContext, opts: &ToolchainOptions) -> Result<Self> {
        Self::resolve_with_env(ctx, opts, Environment::inherit(&ctx.platform()))
    }

    /// Like [`Toolchain::resolve`] but starting from an explicit environment.
    pub fn resolve_with_env(
        ctx: &GlobalContext,
        opts: &ToolchainOptions,
        mut environment: Environment,
    ) -> Result<Self> {
        let platform = ctx.platform();
        let config = &ctx.config().cmake;

        let download = opts
            .download
            .or(config.download)
            .unwrap_or_else(|| platform.has_prebuilt_binaries());
        let version = opts
            .version
            .clone()
            .or_else(|| config.version.clone())
            .unwrap_or_else(|| DEFAULT_CMAKE_VERSION.to_string());
        let cmake_dir = opts
            .cmake_dir
            .clone()
            .or_else(|| config.dir.clone())
            .map(|d| ctx.resolve(&d));

        let mut overrides = config.environment.clone();
        overrides.extend(opts.environment.clone());
        platform.override_environment(&overrides, &mut environment);

        let mut options = config.options.clone();
        options.extend(opts.options.iter().cloned());
        options.retain(|o| !o.is_empty());

        Ok(Toolchain {
            platform,
            download,
            version,
            cmake_dir,
            build_dir: ctx.build_dir(),
            binaries_dir: ctx.binaries_dir(),
            environment,
            options,
        })
    }

    pub fn is_download(&self) -> bool {
        self.download
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Non-empty user options, in order.
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Download and unpack the binaries when downloading is enabled.
    pub fn provision(&self) -> Result<()> {
        if !self.download {
            return Ok(());
        }
        let release = ReleaseCoordinate::new(&self.version, self.platform.classifier())?;
        provision(&release, &self.build_dir, &self.binaries_dir)
    }

    /// Path of a toolchain executable such as `cmake` or `ctest`.
    pub fn executable(&self, name: &str) -> Result<PathBuf> {
        let file = self.platform.executable_name(name);
        if self.download {
            return Ok(self.binaries_dir.join("bin").join(file));
        }
        if let Some(ref dir) = self.cmake_dir {
            return Ok(dir.join(file));
        }
        let path = self.environment.get("PATH").ok_or(ConfigError::NoPath)?;
        Ok(self.platform.executable_on_path(name, path)?)
    }

    /// A process builder for `name` carrying the child environment.
    pub fn command(&self, name: &str) -> Result<ProcessBuilder> {
        let program = self.executable(name)?;
        tracing::debug!("Environment: {:?}", self.environment);
        Ok(ProcessBuilder::new(program).environment(self.environment.clone()))
    }
}
