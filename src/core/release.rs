//! CMake release coordinates.
//!
//! A [`ReleaseCoordinate`] pins a CMake version and a [`Classifier`] and
//! derives the cmake.org download URL and the archive file name from them.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::core::platform::Classifier;

/// Base URL of the upstream release mirror.
pub const DOWNLOAD_BASE_URL: &str = "https://cmake.org/files";

/// CMake version provisioned when none is configured.
pub const DEFAULT_CMAKE_VERSION: &str = "3.27.4";

static PROJECT_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)-.+").expect("valid regex"));
static PLAIN_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)+$").expect("valid regex"));
static MAJOR_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d*\.\d*").expect("valid regex"));

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("version may not be empty")]
    Empty,

    #[error("unexpected version format: {0}")]
    Format(String),
}

/// Extract the CMake version from a packaging version.
///
/// Packaging versions append a revision to the CMake version
/// (`3.27.4-1` is the first packaging of CMake `3.27.4`). A bare CMake
/// version is accepted as is.
pub fn cmake_version(version: &str) -> Result<String, VersionError> {
    if version.is_empty() {
        return Err(VersionError::Empty);
    }
    if let Some(caps) = PROJECT_VERSION.captures(version) {
        let cmake = &caps[1];
        if cmake.is_empty() {
            return Err(VersionError::Format(version.to_string()));
        }
        return Ok(cmake.to_string());
    }
    if PLAIN_VERSION.is_match(version) {
        return Ok(version.to_string());
    }
    Err(VersionError::Format(version.to_string()))
}

/// The `major.minor` prefix of a version, used in the mirror's directory layout.
pub fn major_version(version: &str) -> Result<String, VersionError> {
    if version.is_empty() {
        return Err(VersionError::Empty);
    }
    match MAJOR_VERSION.find(version) {
        Some(m) if m.as_str() != "." => Ok(m.as_str().to_string()),
        _ => Err(VersionError::Format(version.to_string())),
    }
}

/// A specific CMake release for a specific platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseCoordinate {
    version: String,
    classifier: Classifier,
    suffix: &'static str,
    url: Url,
}

impl ReleaseCoordinate {
    /// Build a coordinate from a packaging or CMake version.
    ///
    /// Fails fast for classifiers without published binaries.
    pub fn new(version: &str, classifier: Classifier) -> anyhow::Result<Self> {
        let suffix = classifier.download_suffix()?;
        let version = cmake_version(version)?;
        let major = major_version(&version)?;
        let raw = format!(
            "{}/v{}/cmake-{}-{}",
            DOWNLOAD_BASE_URL, major, version, suffix
        );
        let url = Url::parse(&raw)?;
        Ok(ReleaseCoordinate {
            version,
            classifier,
            suffix,
            url,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn classifier(&self) -> Classifier {
        self.classifier
    }

    pub fn suffix(&self) -> &'static str {
        self.suffix
    }

    /// Name of the release archive, e.g. `cmake-3.27.4-Linux-x86_64.tar.gz`.
    pub fn archive_name(&self) -> String {
        format!("cmake-{}-{}", self.version, self.suffix)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for ReleaseCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmake {} ({})", self.version, self.classifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmake_version_from_project_version() {
        assert_eq!(cmake_version("3.27.4-1").unwrap(), "3.27.4");
        assert_eq!(cmake_version("3.27.4-b2-SNAPSHOT").unwrap(), "3.27.4");
        assert_eq!(cmake_version("3.27.4").unwrap(), "3.27.4");
    }

    #[test]
    fn test_cmake_version_rejects_garbage() {
        assert!(matches!(cmake_version(""), Err(VersionError::Empty)));
        assert!(matches!(cmake_version("latest"), Err(VersionError::Format(_))));
        assert!(matches!(cmake_version("-1"), Err(VersionError::Format(_))));
    }

    #[test]
    fn test_major_version() {
        assert_eq!(major_version("3.27.4").unwrap(), "3.27");
        assert_eq!(major_version("3.5").unwrap(), "3.5");
        assert!(major_version("abc").is_err());
    }

    #[test]
    fn test_release_url() {
        let release = ReleaseCoordinate::new("3.27.4-1", Classifier::LinuxX86_64).unwrap();
        assert_eq!(release.version(), "3.27.4");
        assert_eq!(release.archive_name(), "cmake-3.27.4-Linux-x86_64.tar.gz");
        assert_eq!(
            release.url().as_str(),
            "https://cmake.org/files/v3.27/cmake-3.27.4-Linux-x86_64.tar.gz"
        );

        let windows = ReleaseCoordinate::new("3.27.4-1", Classifier::WindowsX86_64).unwrap();
        assert_eq!(windows.suffix(), "win64-x64.zip");
    }

    #[test]
    fn test_release_fails_fast_without_binaries() {
        assert!(ReleaseCoordinate::new("3.27.4-1", Classifier::LinuxArm32).is_err());
        assert!(ReleaseCoordinate::new("3.27.4-1", Classifier::LinuxX86_32).is_err());
    }
}
