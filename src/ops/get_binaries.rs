//! Implementation of `cmakeup get-binaries`.
//!
//! Downloads the CMake release for a classifier into the build directory,
//! unpacks it and normalizes the layout so that `bin/` sits directly under
//! `<build>/dependency/cmake`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use url::Url;

use crate::core::platform::{Classifier, Platform};
use crate::core::release::{ReleaseCoordinate, DEFAULT_CMAKE_VERSION};
use crate::sources::{download, normalize, Extractor};
use crate::util::fs::remove_dir_all_with_retry;
use crate::util::GlobalContext;

/// Options for the get-binaries command.
#[derive(Debug, Clone, Default)]
pub struct GetBinariesOptions {
    /// CMake or packaging version (falls back to config, then the default)
    pub version: Option<String>,

    /// Target classifier (falls back to the host platform)
    pub classifier: Option<Classifier>,
}

/// Provision CMake binaries into the build directory.
pub fn get_binaries(ctx: &GlobalContext, opts: &GetBinariesOptions) -> Result<PathBuf> {
    let classifier = opts
        .classifier
        .unwrap_or_else(|| ctx.platform().classifier());
    let version = opts
        .version
        .as_deref()
        .or(ctx.config().cmake.version.as_deref())
        .unwrap_or(DEFAULT_CMAKE_VERSION);
    let release = ReleaseCoordinate::new(version, classifier)?;
    let target = ctx.binaries_dir();
    provision(&release, &ctx.build_dir(), &target)?;
    Ok(target)
}

/// Download, extract and normalize `release` into `target`.
///
/// The archive is cached in `download_dir`; nothing happens if `target`
/// already contains `bin/`.
pub fn provision(release: &ReleaseCoordinate, download_dir: &Path, target: &Path) -> Result<()> {
    tracing::debug!("Provisioning {}", release);
    fetch_and_unpack(
        release.url(),
        Platform::new(release.classifier()),
        download_dir,
        target,
    )
}

pub(crate) fn fetch_and_unpack(
    url: &Url,
    platform: Platform,
    download_dir: &Path,
    target: &Path,
) -> Result<()> {
    if target.join("bin").is_dir() {
        tracing::debug!("CMake binaries up to date in {}", target.display());
        return Ok(());
    }

    let archive = download(url, download_dir)?;

    // A previous extraction may have been interrupted.
    remove_dir_all_with_retry(target)
        .with_context(|| format!("failed to clean {}", target.display()))?;

    tracing::info!("Extracting {} to {}", archive.display(), target.display());
    Extractor::new(platform).extract(&archive, target)?;
    normalize(target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::Classifier;
    use crate::util::config::Config;
    use httpmock::prelude::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn release_tarball() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in [
            ("cmake-3.27.4-Linux-x86_64/bin/cmake", &b"cmake"[..]),
            ("cmake-3.27.4-Linux-x86_64/bin/ctest", &b"ctest"[..]),
            ("cmake-3.27.4-Linux-x86_64/share/cmake-3.27/a.cmake", &b"a"[..]),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append(&header, data).unwrap();
        }
        let tar = builder.into_inner().unwrap();
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&tar).unwrap();
        gz.finish().unwrap()
    }

    #[test]
    fn test_fetch_and_unpack_normalizes_layout() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v3.27/cmake-3.27.4-Linux-x86_64.tar.gz");
            then.status(200).body(release_tarball());
        });
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("dependency/cmake");
        let url = Url::parse(&server.url("/v3.27/cmake-3.27.4-Linux-x86_64.tar.gz")).unwrap();
        let platform = Platform::new(Classifier::LinuxX86_64);

        fetch_and_unpack(&url, platform, tmp.path(), &target).unwrap();
        fetch_and_unpack(&url, platform, tmp.path(), &target).unwrap();

        mock.assert_hits(1);
        assert_eq!(fs::read(target.join("bin/cmake")).unwrap(), b"cmake");
        assert!(target.join("share/cmake-3.27/a.cmake").is_file());
        assert!(tmp.path().join("cmake-3.27.4-Linux-x86_64.tar.gz").is_file());
    }

    #[test]
    fn test_reextracts_when_bin_is_missing() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/cmake.tar.gz");
            then.status(200).body(release_tarball());
        });
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("dependency/cmake");
        fs::create_dir_all(target.join("leftover")).unwrap();
        let url = Url::parse(&server.url("/cmake.tar.gz")).unwrap();

        fetch_and_unpack(&url, Platform::new(Classifier::LinuxX86_64), tmp.path(), &target)
            .unwrap();

        assert!(!target.join("leftover").exists());
        assert!(target.join("bin/ctest").is_file());
    }

    #[test]
    fn test_get_binaries_rejects_classifier_without_binaries() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::from_parts(
            tmp.path().to_path_buf(),
            Platform::new(Classifier::LinuxX86_64),
            Config::default(),
        );
        let opts = GetBinariesOptions {
            version: Some("3.27.4-1".to_string()),
            classifier: Some(Classifier::LinuxArm32),
        };

        assert!(get_binaries(&ctx, &opts).is_err());
        assert!(!ctx.build_dir().exists());
    }
}
