//! Flattening of extracted release trees.
//!
//! Release archives wrap everything in a versioned directory such as
//! `cmake-3.27.4-Linux-x86_64/`, and the macOS bundle nests deeper still
//! (`CMake.app/Contents/bin`). Normalization hoists the directory that
//! contains `bin` so that `bin` sits directly under the extraction target.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use walkdir::WalkDir;

use crate::util::fs::{move_path, remove_dir_all_with_retry};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Could not find \"bin\" in: {}", root.display())]
    NoBin { root: PathBuf },

    #[error("cannot hoist {}: destination already exists", path.display())]
    Collision { path: PathBuf },
}

/// Depth-first, name-ordered search for a directory named `bin`.
pub fn find_bin(root: &Path) -> Result<Option<PathBuf>> {
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("failed to walk directory: {}", root.display()))?;
        if entry.file_type().is_dir() && entry.file_name() == "bin" {
            return Ok(Some(entry.into_path()));
        }
    }
    Ok(None)
}

/// Rearrange `root` so that the directory containing `bin` becomes `root`.
pub fn normalize(root: &Path) -> Result<()> {
    let bin = find_bin(root)?.ok_or_else(|| NormalizeError::NoBin {
        root: root.to_path_buf(),
    })?;
    let true_root = bin
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    if true_root == root {
        return Ok(());
    }

    let relative = true_root
        .strip_prefix(root)
        .context("bin directory outside of extraction root")?
        .to_path_buf();
    let mut chain = relative.components().map(|c| c.as_os_str().to_os_string());
    let Some(outermost) = chain.next() else {
        return Ok(());
    };
    let nested: Vec<_> = chain.collect();

    // Move the outermost wrapper aside so none of its children can collide
    // with the wrapper's own name once hoisted.
    let aside = unused_name(root, &outermost.to_string_lossy())?;
    fs::rename(root.join(&outermost), &aside)
        .with_context(|| format!("failed to move {}", root.join(&outermost).display()))?;
    tracing::debug!(
        "Hoisting {} to {}",
        true_root.display(),
        root.display()
    );

    let moved_root = nested.iter().fold(aside.clone(), |p, c| p.join(c));
    hoist_children(&moved_root, root, None)?;

    // Siblings of the wrappers along the chain live on under the root.
    let mut wrapper = aside.clone();
    for next in &nested {
        hoist_children(&wrapper, root, Some(next.as_os_str()))?;
        wrapper.push(next);
    }

    remove_dir_all_with_retry(&aside)?;
    Ok(())
}

fn hoist_children(from: &Path, root: &Path, keep: Option<&std::ffi::OsStr>) -> Result<()> {
    let entries =
        fs::read_dir(from).with_context(|| format!("failed to read directory: {}", from.display()))?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if keep == Some(name.as_os_str()) {
            continue;
        }
        let dest = root.join(&name);
        if fs::symlink_metadata(&dest).is_ok() {
            return Err(NormalizeError::Collision { path: dest }.into());
        }
        move_path(&entry.path(), &dest)?;
    }
    Ok(())
}

fn unused_name(root: &Path, base: &str) -> Result<PathBuf> {
    for n in 0u32.. {
        let candidate = root.join(format!(".{}.normalize{}", base, n));
        if fs::symlink_metadata(&candidate).is_err() {
            return Ok(candidate);
        }
    }
    anyhow::bail!("no free name for {} in {}", base, root.display())
}
