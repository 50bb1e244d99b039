//! Configuration file support for cmakeup.
//!
//! cmakeup reads two configuration file locations:
//! - Global: `~/.cmakeup/config.toml` - User-wide defaults
//! - Project: `.cmakeup/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// cmakeup configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build directory settings
    pub build: BuildConfig,

    /// CMake toolchain settings
    pub cmake: CmakeConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Build output directory, relative to the project root (default `target`)
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CmakeConfig {
    /// Download prebuilt binaries instead of using an installed CMake
    pub download: Option<bool>,

    /// Directory containing an installed cmake/ctest
    pub dir: Option<PathBuf>,

    /// CMake version to provision, e.g. `3.27.4` or `3.27.4-1`
    pub version: Option<String>,

    /// Overrides for variables already present in the child environment
    pub environment: BTreeMap<String, String>,

    /// Extra options passed to every cmake/ctest invocation
    pub options: Vec<String>,
}

impl Config {
    /// Load config from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load config from a file, or return defaults if the file is missing or broken.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.directory.is_some() {
            self.build.directory = other.build.directory;
        }

        if other.cmake.download.is_some() {
            self.cmake.download = other.cmake.download;
        }
        if other.cmake.dir.is_some() {
            self.cmake.dir = other.cmake.dir;
        }
        if other.cmake.version.is_some() {
            self.cmake.version = other.cmake.version;
        }
        self.cmake.environment.extend(other.cmake.environment);
        if !other.cmake.options.is_empty() {
            self.cmake.options = other.cmake.options;
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.cmakeup/config.toml)
/// 2. Global config (~/.cmakeup/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path));
    }

    config.merge(Config::load_or_default(project_path));

    config
}

/// Get the global cmakeup directory (~/.cmakeup/).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".cmakeup"))
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|d| d.join("config.toml"))
}

/// Get the project config file path.
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".cmakeup").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.build.directory.is_none());
        assert!(config.cmake.download.is_none());
        assert!(config.cmake.environment.is_empty());
        assert!(config.cmake.options.is_empty());
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[build]
directory = "out"

[cmake]
download = false
dir = "/opt/cmake/bin"
version = "3.27.4-1"
options = ["-DCMAKE_BUILD_TYPE=Release", "-Wno-dev"]

[cmake.environment]
PATH = "/opt/tools"
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.build.directory, Some(PathBuf::from("out")));
        assert_eq!(config.cmake.download, Some(false));
        assert_eq!(config.cmake.dir, Some(PathBuf::from("/opt/cmake/bin")));
        assert_eq!(config.cmake.version.as_deref(), Some("3.27.4-1"));
        assert_eq!(config.cmake.options.len(), 2);
        assert_eq!(config.cmake.environment["PATH"], "/opt/tools");
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        base.cmake.version = Some("3.26.0".to_string());
        base.cmake.download = Some(true);
        base.cmake
            .environment
            .insert("PATH".to_string(), "/global".to_string());

        let mut project = Config::default();
        project.cmake.version = Some("3.27.4".to_string());
        project
            .cmake
            .environment
            .insert("CC".to_string(), "clang".to_string());

        base.merge(project);

        assert_eq!(base.cmake.version.as_deref(), Some("3.27.4"));
        assert_eq!(base.cmake.download, Some(true)); // Not overridden
        assert_eq!(base.cmake.environment.len(), 2);
    }

    #[test]
    fn test_broken_config_falls_back_to_default() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "[cmake\nversion = ").unwrap();

        let config = Config::load_or_default(&config_path);
        assert!(config.cmake.version.is_none());
    }

    #[test]
    fn test_load_config_precedence() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global.toml");
        let project = project_config_path(tmp.path());
        std::fs::create_dir_all(project.parent().unwrap()).unwrap();

        std::fs::write(&global, "[build]\ndirectory = \"global\"\n[cmake]\ndownload = false\n")
            .unwrap();
        std::fs::write(&project, "[build]\ndirectory = \"local\"\n").unwrap();

        let config = load_config(Some(&global), &project);
        assert_eq!(config.build.directory, Some(PathBuf::from("local")));
        assert_eq!(config.cmake.download, Some(false));
    }
}
