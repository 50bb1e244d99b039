//! Host platform detection and platform-specific conventions.
//!
//! A [`Platform`] wraps a [`Classifier`], the short `os-arch` identifier that
//! selects which CMake release archive to fetch, and answers the questions
//! whose answers differ between operating systems: executable suffixes, PATH
//! separators, POSIX permission support and environment key case rules.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

/// Errors raised while identifying a platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("\"classifier\" must be one of {}\nActual: {actual}", Classifier::valid_list())]
    UnsupportedClassifier { actual: String },

    #[error(
        "unsupported platform: os={os}, arch={arch}\nsupported classifiers: {}",
        Classifier::valid_list()
    )]
    UnsupportedPlatform { os: String, arch: String },

    #[error("no CMake binaries are published for {0}")]
    NoBinaries(Classifier),

    #[error("`{name}` not found on PATH: {path}")]
    ExecutableNotFound { name: String, path: String },
}

/// A release platform identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classifier {
    WindowsX86_32,
    WindowsX86_64,
    LinuxX86_32,
    LinuxX86_64,
    LinuxArm32,
    MacX86_64,
}

impl Classifier {
    /// Every classifier, in display order.
    pub const ALL: [Classifier; 6] = [
        Classifier::WindowsX86_32,
        Classifier::WindowsX86_64,
        Classifier::LinuxX86_32,
        Classifier::LinuxX86_64,
        Classifier::LinuxArm32,
        Classifier::MacX86_64,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Classifier::WindowsX86_32 => "windows-x86_32",
            Classifier::WindowsX86_64 => "windows-x86_64",
            Classifier::LinuxX86_32 => "linux-x86_32",
            Classifier::LinuxX86_64 => "linux-x86_64",
            Classifier::LinuxArm32 => "linux-arm_32",
            Classifier::MacX86_64 => "mac-x86_64",
        }
    }

    /// Map `std::env::consts::{OS, ARCH}` style names to a classifier.
    pub fn from_os_arch(os: &str, arch: &str) -> Result<Self, PlatformError> {
        let classifier = match (os, arch) {
            ("windows", "x86") => Classifier::WindowsX86_32,
            ("windows", "x86_64") => Classifier::WindowsX86_64,
            ("linux", "x86") => Classifier::LinuxX86_32,
            ("linux", "x86_64") => Classifier::LinuxX86_64,
            ("linux", "arm") => Classifier::LinuxArm32,
            ("macos", "x86_64") => Classifier::MacX86_64,
            _ => {
                return Err(PlatformError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
            }
        };
        Ok(classifier)
    }

    /// Suffix of the cmake.org release archive for this classifier.
    pub fn download_suffix(&self) -> Result<&'static str, PlatformError> {
        match self {
            Classifier::WindowsX86_32 => Ok("win32-x86.zip"),
            Classifier::WindowsX86_64 => Ok("win64-x64.zip"),
            Classifier::LinuxX86_64 => Ok("Linux-x86_64.tar.gz"),
            Classifier::MacX86_64 => Ok("Darwin-x86_64.tar.gz"),
            Classifier::LinuxX86_32 | Classifier::LinuxArm32 => {
                Err(PlatformError::NoBinaries(*self))
            }
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Classifier::WindowsX86_32 | Classifier::WindowsX86_64)
    }

    fn valid_list() -> String {
        let names: Vec<&str> = Self::ALL.iter().map(|c| c.as_str()).collect();
        format!("[{}]", names.join(", "))
    }
}

impl fmt::Display for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classifier {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| PlatformError::UnsupportedClassifier {
                actual: s.to_string(),
            })
    }
}

/// A snapshot of process environment variables.
///
/// Lookups honour the owning platform's key case rules, so on Windows
/// `path` and `Path` name the same variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
    case_insensitive: bool,
}

impl Environment {
    /// An empty environment following `platform`'s key rules.
    pub fn empty(platform: &Platform) -> Self {
        Environment {
            vars: BTreeMap::new(),
            case_insensitive: platform.is_environment_case_insensitive(),
        }
    }

    /// Capture the current process environment.
    ///
    /// Variables that are not valid unicode are dropped.
    pub fn inherit(platform: &Platform) -> Self {
        let mut env = Self::empty(platform);
        env.vars.extend(std::env::vars_os().filter_map(|(key, value)| {
            match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (key, _) => {
                    tracing::debug!("Dropping non-unicode environment variable {:?}", key);
                    None
                }
            }
        }));
        env
    }

    /// Find the key as it is actually spelled in this environment.
    pub fn existing_key(&self, key: &str) -> Option<&str> {
        if self.case_insensitive {
            self.vars
                .keys()
                .find(|k| k.eq_ignore_ascii_case(key))
                .map(String::as_str)
        } else {
            self.vars.get_key_value(key).map(|(k, _)| k.as_str())
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = self.existing_key(key)?;
        self.vars.get(key).map(String::as_str)
    }

    /// Set a variable, reusing the existing spelling of the key if present.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let key = self
            .existing_key(key)
            .map(str::to_string)
            .unwrap_or_else(|| key.to_string());
        self.vars.insert(key, value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.existing_key(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The platform the toolchain runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    classifier: Classifier,
}

impl Platform {
    pub fn new(classifier: Classifier) -> Self {
        Platform { classifier }
    }

    /// Detect the host platform.
    pub fn detected() -> Result<Self, PlatformError> {
        let classifier =
            Classifier::from_os_arch(std::env::consts::OS, std::env::consts::ARCH)?;
        Ok(Platform { classifier })
    }

    pub fn classifier(&self) -> Classifier {
        self.classifier
    }

    /// Whether cmake.org publishes a binary archive for this platform.
    ///
    /// This is the default for downloading binaries; elsewhere `cmake` is
    /// expected to be installed already.
    pub fn has_prebuilt_binaries(&self) -> bool {
        self.classifier.download_suffix().is_ok()
    }

    pub fn executable_suffix(&self) -> &'static str {
        if self.classifier.is_windows() {
            ".exe"
        } else {
            ""
        }
    }

    pub fn path_separator(&self) -> char {
        if self.classifier.is_windows() {
            ';'
        } else {
            ':'
        }
    }

    pub fn supports_posix_permissions(&self) -> bool {
        !self.classifier.is_windows()
    }

    pub fn is_environment_case_insensitive(&self) -> bool {
        self.classifier.is_windows()
    }

    /// File name of an executable on this platform.
    pub fn executable_name(&self, name: &str) -> String {
        format!("{}{}", name, self.executable_suffix())
    }

    /// Locate `name` in a PATH-style search string.
    pub fn executable_on_path(&self, name: &str, path: &str) -> Result<PathBuf, PlatformError> {
        let filename = self.executable_name(name);
        let found = path
            .split(self.path_separator())
            .filter(|dir| !dir.is_empty())
            .map(|dir| Path::new(dir).join(&filename))
            .find(|candidate| is_executable(candidate));

        match found {
            Some(candidate) => Ok(candidate),
            None => {
                // Defer to `which` for PATHEXT and symlink handling the simple
                // scan above does not cover.
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                which::which_in(name, Some(path), cwd).map_err(|_| {
                    PlatformError::ExecutableNotFound {
                        name: filename,
                        path: path.to_string(),
                    }
                })
            }
        }
    }

    /// Replace the values of variables that already exist in `env`.
    ///
    /// Keys are matched case-insensitively on platforms whose environment is
    /// case-insensitive. Keys that do not exist in `env` are ignored.
    pub fn override_environment(&self, overrides: &BTreeMap<String, String>, env: &mut Environment) {
        for (key, value) in overrides {
            match env.existing_key(key).map(str::to_string) {
                Some(existing) => {
                    tracing::debug!("overriding environment variable {}", existing);
                    env.vars.insert(existing, value.clone());
                }
                None => {
                    tracing::debug!("environment variable {} is not set, ignoring override", key);
                }
            }
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.classifier.fmt(f)
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
