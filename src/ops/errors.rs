//! Goal error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::release::VersionError;
use crate::util::ProcessBuilder;

/// Invalid goal input, detected before any subprocess is started.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("The \"{old}\" parameter has been renamed. Please use \"{new}\" instead.")]
    Renamed { old: &'static str, new: &'static str },

    #[error("{what} does not exist: {}", path.display())]
    Missing { what: &'static str, path: PathBuf },

    #[error("{what} isn't a directory: {}", path.display())]
    NotADirectory { what: &'static str, path: PathBuf },

    #[error("PATH is not set in the child process environment")]
    NoPath,

    #[error(transparent)]
    Version(#[from] VersionError),
}

/// A toolchain subprocess finished unsuccessfully.
#[derive(Debug, Error)]
#[error("`{command}` failed with return code: {code}")]
pub struct ReturnCodeError {
    pub command: String,
    pub code: i32,
}

impl ReturnCodeError {
    pub fn check(command: &ProcessBuilder, code: i32) -> Result<(), ReturnCodeError> {
        if code == 0 {
            return Ok(());
        }
        Err(ReturnCodeError {
            command: command.display_command(),
            code,
        })
    }
}

/// Require `path` to be an existing directory.
pub fn require_dir(what: &'static str, path: &std::path::Path) -> Result<(), ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Missing {
            what,
            path: path.to_path_buf(),
        });
    }
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory {
            what,
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
