//! Global context for cmakeup operations.
//!
//! Provides centralized access to configuration, paths, and the host platform.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::platform::Platform;
use crate::util::config::{global_config_path, load_config, project_config_path, Config};

/// Default build directory, relative to the project root.
pub const DEFAULT_BUILD_DIR: &str = "target";

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory (the project root)
    cwd: PathBuf,

    /// Platform the toolchain runs on
    platform: Platform,

    /// Merged global and project configuration
    config: Config,

    /// Build directory override from the command line
    build_dir: Option<PathBuf>,
}

impl GlobalContext {
    /// Create a new GlobalContext for the current directory and host platform.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Self::with_cwd(cwd)
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let platform = Platform::detected()?;
        let config = load_config(
            global_config_path().as_deref(),
            &project_config_path(&cwd),
        );
        Ok(GlobalContext {
            cwd,
            platform,
            config,
            build_dir: None,
        })
    }

    /// Create a GlobalContext with explicit parts and no config files.
    pub fn from_parts(cwd: PathBuf, platform: Platform, config: Config) -> Self {
        GlobalContext {
            cwd,
            platform,
            config,
            build_dir: None,
        }
    }

    /// Override the build directory.
    pub fn with_build_dir(mut self, build_dir: Option<PathBuf>) -> Self {
        self.build_dir = build_dir;
        self
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The build directory: command line, then config, then `target`.
    ///
    /// Relative paths resolve against the working directory.
    pub fn build_dir(&self) -> PathBuf {
        let dir = self
            .build_dir
            .clone()
            .or_else(|| self.config.build.directory.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILD_DIR));
        self.resolve(&dir)
    }

    /// Where provisioned binaries are unpacked.
    pub fn binaries_dir(&self) -> PathBuf {
        self.build_dir().join("dependency").join("cmake")
    }

    /// Default CMake project (binary) directory.
    pub fn default_project_dir(&self) -> PathBuf {
        self.build_dir().join("cmake")
    }

    /// Directory the JUnit report is written to.
    pub fn reports_dir(&self) -> PathBuf {
        self.build_dir().join("surefire-reports")
    }

    /// Resolve a path against the working directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}
