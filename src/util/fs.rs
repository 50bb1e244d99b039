//! Filesystem utilities.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use walkdir::WalkDir;

/// Maximum number of times a locked directory is retried before giving up.
pub const MAX_DELETE_RETRIES: u32 = 30;

/// Error returned by [`remove_dir_all_with_retry`].
#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("failed to delete {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is still locked after {attempts} attempts: {source}", path.display())]
    RetriesExhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },
}

/// Backoff schedule for deleting directories whose files are still held open.
///
/// Windows keeps file handles alive for a short time after the owning
/// process exits, which makes the parent directory fail to delete with
/// "directory not empty".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: MAX_DELETE_RETRIES,
            base: Duration::from_millis(10),
            cap: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Remove a single directory, retrying while it reports "directory not empty".
pub fn remove_dir_with_retry<F>(
    dir: &Path,
    policy: &RetryPolicy,
    mut remove: F,
) -> std::result::Result<(), DeleteError>
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let mut attempt = 0;
    loop {
        match remove(dir) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => {
                if attempt >= policy.max_retries {
                    return Err(DeleteError::RetriesExhausted {
                        path: dir.to_path_buf(),
                        attempts: attempt + 1,
                        source: e,
                    });
                }
                tracing::info!(
                    "{} is locked... Sleeping before retry [{}/{}]",
                    dir.display(),
                    attempt + 1,
                    policy.max_retries
                );
                std::thread::sleep(policy.delay(attempt));
                attempt += 1;
            }
            Err(e) => {
                return Err(DeleteError::Io {
                    path: dir.to_path_buf(),
                    source: e,
                })
            }
        }
    }
}

/// Recursively delete `path` if it exists.
///
/// Files are removed first, then directories bottom-up, each directory
/// retried per [`RetryPolicy::default`]. Not safe against another process
/// writing into the tree concurrently.
pub fn remove_dir_all_with_retry(path: &Path) -> std::result::Result<(), DeleteError> {
    remove_tree(path, &RetryPolicy::default())
}

fn remove_tree(path: &Path, policy: &RetryPolicy) -> std::result::Result<(), DeleteError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(DeleteError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    if !meta.is_dir() {
        return remove_file_if_exists(path);
    }

    // contents_first yields children before their parent directory.
    for entry in WalkDir::new(path).contents_first(true) {
        let entry = entry.map_err(|e| {
            let at = e.path().unwrap_or(path).to_path_buf();
            DeleteError::Io {
                path: at,
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("filesystem loop")),
            }
        })?;
        if entry.file_type().is_dir() {
            remove_dir_with_retry(entry.path(), policy, |dir| fs::remove_dir(dir))?;
        } else {
            remove_file_if_exists(entry.path())?;
        }
    }
    Ok(())
}

fn remove_file_if_exists(path: &Path) -> std::result::Result<(), DeleteError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DeleteError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Recursively copy a directory, preserving file permissions and symlinks.
///
/// `src` and `dst` may live on different filesystems.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;

    // Directory modes are applied last so read-only directories can be filled.
    let mut dir_modes = Vec::new();
    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("failed to read directory: {}", src.display()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("{} is outside {}", entry.path().display(), src.display()))?;
        let target = dst.join(relative);
        let ty = entry.file_type();

        if ty.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create directory: {}", target.display()))?;
            dir_modes.push((target, entry.metadata()?.permissions()));
        } else if ty.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
        }
    }

    for (dir, perms) in dir_modes.into_iter().rev() {
        fs::set_permissions(&dir, perms)
            .with_context(|| format!("failed to set permissions: {}", dir.display()))?;
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let link = fs::read_link(src)
        .with_context(|| format!("failed to read symlink: {}", src.display()))?;
    if fs::symlink_metadata(dst).is_ok() {
        fs::remove_file(dst)
            .with_context(|| format!("failed to replace: {}", dst.display()))?;
    }
    std::os::unix::fs::symlink(&link, dst)
        .with_context(|| format!("failed to create symlink: {}", dst.display()))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)
        .map(|_| ())
        .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))
}

/// Move a file or directory with a single rename.
pub fn move_path(src: &Path, dst: &Path) -> Result<()> {
    if fs::symlink_metadata(dst).is_ok() {
        anyhow::bail!(
            "cannot move {} to {}: destination already exists",
            src.display(),
            dst.display()
        );
    }
    fs::rename(src, dst)
        .with_context(|| format!("failed to move {} to {}", src.display(), dst.display()))
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read the first line of a file, without its line terminator.
pub fn read_first_line(path: &Path) -> Result<Option<String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read file: {}", path.display()))?;
    Ok(contents
        .lines()
        .next()
        .map(|line| line.trim_end_matches('\r').to_string()))
}
