//! Release downloads.

use std::fs;
use std::io::{self, BufWriter, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tempfile::NamedTempFile;
use url::Url;

use crate::sources::archive::BUFFER_SIZE;

/// The file name a URL downloads to: its last non-empty path segment.
pub fn file_name_from_url(url: &Url) -> Option<&str> {
    url.path_segments()?.rev().find(|s| !s.is_empty())
}

/// Download `url` into `dir`, unless a file of the same name is already there.
///
/// The body streams into a temporary file next to the destination and is
/// only moved into place once complete, so an interrupted download never
/// leaves a truncated archive that would pass for a cached one.
pub fn download(url: &Url, dir: &Path) -> Result<PathBuf> {
    let name = file_name_from_url(url)
        .with_context(|| format!("cannot derive a file name from {}", url))?;
    let dest = dir.join(name);
    if dest.exists() {
        tracing::debug!("Using cached {}", dest.display());
        return Ok(dest);
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory: {}", dir.display()))?;

    tracing::info!("Downloading {}", url);
    let mut response = reqwest::blocking::get(url.clone())
        .with_context(|| format!("failed to download {}", url))?;
    if !response.status().is_success() {
        bail!("failed to download {}: HTTP {}", url, response.status());
    }

    let progress = progress_bar(response.content_length(), name);
    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
    {
        let mut out = BufWriter::with_capacity(BUFFER_SIZE, temp.as_file_mut());
        copy_with_progress(&mut response, &mut out, &progress)
            .with_context(|| format!("failed to download {}", url))?;
        out.flush()
            .with_context(|| format!("failed to write {}", dest.display()))?;
    }
    progress.finish_and_clear();

    temp.persist(&dest)
        .with_context(|| format!("failed to write {}", dest.display()))?;
    tracing::debug!("Downloaded {}", dest.display());
    Ok(dest)
}

fn copy_with_progress<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    progress: &ProgressBar,
) -> io::Result<u64> {
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
        progress.inc(n as u64);
    }
}

fn progress_bar(length: Option<u64>, name: &str) -> ProgressBar {
    if !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = match length {
        Some(len) => {
            let pb = ProgressBar::new(len);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb
        }
        None => ProgressBar::new_spinner(),
    };
    pb.set_message(name.to_string());
    pb
}
