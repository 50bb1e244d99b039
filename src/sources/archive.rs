//! Generic archive extraction.
//!
//! Release archives arrive as a compression layer wrapped around an archive
//! (`.tar.gz`) or as a bare archive (`.zip`). [`Extractor::extract`] sniffs
//! the file signature, peels off compression layers one at a time into a
//! staging directory, and unpacks the innermost archive.
//!
//! Formats are a closed set, see [`ArchiveFormat`]. Compressors are tried
//! before archivers, mirroring how nested files are unwrapped from the
//! outside in.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tempfile::TempDir;
use thiserror::Error;

use crate::core::platform::Platform;
use crate::util::fs::{copy_dir_all, ensure_dir, remove_dir_all_with_retry};

/// Size of the buffer used to stream entry data to disk.
pub const BUFFER_SIZE: usize = 10 * 1024;

/// Bytes needed to recognise every supported signature (tar's magic sits at 257).
const SNIFF_LEN: usize = 512;

/// Mode applied to directories whose entry carries no Unix mode.
pub const DEFAULT_DIR_MODE: u32 = 0o755;
/// Mode applied to files whose entry carries no Unix mode.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

static EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.]+(\.[[:alnum:]]+)$").expect("valid regex"));

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("could not uncompress: {} (unrecognized format)", path.display())]
    Unrecognized { path: PathBuf },

    #[error("archive entry escapes destination directory: {entry}")]
    UnsafeEntry { entry: String },
}

/// A supported compression or archive format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Gzip,
    Bzip2,
    Xz,
    Zip,
    Tar,
    Ar,
}

impl ArchiveFormat {
    /// True for single-stream compressors, false for multi-entry archives.
    pub fn is_compressor(&self) -> bool {
        matches!(
            self,
            ArchiveFormat::Gzip | ArchiveFormat::Bzip2 | ArchiveFormat::Xz
        )
    }

    /// Whether entries of this format carry Unix permission bits.
    pub fn carries_unix_mode(&self) -> bool {
        !self.is_compressor()
    }

    pub fn detect_compressor(header: &[u8]) -> Option<Self> {
        if header.starts_with(&[0x1f, 0x8b]) {
            Some(ArchiveFormat::Gzip)
        } else if header.starts_with(b"BZh") {
            Some(ArchiveFormat::Bzip2)
        } else if header.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(ArchiveFormat::Xz)
        } else {
            None
        }
    }

    pub fn detect_archiver(header: &[u8]) -> Option<Self> {
        if header.starts_with(b"PK\x03\x04") || header.starts_with(b"PK\x05\x06") {
            Some(ArchiveFormat::Zip)
        } else if header.starts_with(b"!<arch>\n") {
            Some(ArchiveFormat::Ar)
        } else if is_tar_header(header) {
            Some(ArchiveFormat::Tar)
        } else {
            None
        }
    }

    /// Sniff the format of a file: compressors first, then archivers.
    pub fn sniff(path: &Path) -> Result<Option<Self>> {
        let mut file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut header = Vec::with_capacity(SNIFF_LEN);
        Read::by_ref(&mut file)
            .take(SNIFF_LEN as u64)
            .read_to_end(&mut header)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Self::detect_compressor(&header).or_else(|| Self::detect_archiver(&header)))
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchiveFormat::Gzip => "gzip",
            ArchiveFormat::Bzip2 => "bzip2",
            ArchiveFormat::Xz => "xz",
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Ar => "ar",
        };
        f.write_str(name)
    }
}

/// ustar/GNU magic, or failing that a valid v7 header checksum.
fn is_tar_header(header: &[u8]) -> bool {
    if header.len() < SNIFF_LEN {
        return false;
    }
    if &header[257..262] == b"ustar" {
        return true;
    }
    let stored = std::str::from_utf8(&header[148..156])
        .ok()
        .map(|s| s.trim_matches(|c: char| c == '\0' || c == ' '))
        .and_then(|s| u32::from_str_radix(s, 8).ok());
    let Some(stored) = stored else {
        return false;
    };
    let computed: u32 = header
        .iter()
        .enumerate()
        .map(|(i, b)| if (148..156).contains(&i) { b' ' as u32 } else { *b as u32 })
        .sum();
    header[0] != 0 && stored == computed
}

/// Read/write/execute bits for one permission class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionBits {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl PermissionBits {
    fn from_digit(digit: u32) -> Self {
        PermissionBits {
            read: digit & 0o4 != 0,
            write: digit & 0o2 != 0,
            execute: digit & 0o1 != 0,
        }
    }

    fn to_digit(self) -> u32 {
        (self.read as u32) << 2 | (self.write as u32) << 1 | self.execute as u32
    }
}

/// POSIX permissions decoded from an archive entry's Unix mode.
///
/// File type and setuid/setgid/sticky bits are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosixMode {
    pub owner: PermissionBits,
    pub group: PermissionBits,
    pub other: PermissionBits,
}

impl PosixMode {
    pub fn from_mode(mode: u32) -> Self {
        PosixMode {
            owner: PermissionBits::from_digit((mode >> 6) & 0o7),
            group: PermissionBits::from_digit((mode >> 3) & 0o7),
            other: PermissionBits::from_digit(mode & 0o7),
        }
    }

    pub fn to_mode(self) -> u32 {
        self.owner.to_digit() << 6 | self.group.to_digit() << 3 | self.other.to_digit()
    }
}

impl fmt::Display for PosixMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bits in [self.owner, self.group, self.other] {
            let r = if bits.read { 'r' } else { '-' };
            let w = if bits.write { 'w' } else { '-' };
            let x = if bits.execute { 'x' } else { '-' };
            write!(f, "{}{}{}", r, w, x)?;
        }
        Ok(())
    }
}

/// Returns a filename extension, e.g. `.gz` for `foo.tar.gz`.
///
/// Hidden files such as `.hidden` have no extension.
pub fn file_extension(filename: &str) -> &str {
    EXTENSION
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or("")
}

/// Unpacks archives for a given target platform.
#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    platform: Platform,
}

impl Extractor {
    pub fn new(platform: Platform) -> Self {
        Extractor { platform }
    }

    /// Extract `source` into the directory `target`.
    pub fn extract(&self, source: &Path, target: &Path) -> Result<()> {
        let format = ArchiveFormat::sniff(source)?.ok_or_else(|| ArchiveError::Unrecognized {
            path: source.to_path_buf(),
        })?;
        tracing::debug!("{} is a {} file", source.display(), format);

        if format.is_compressor() {
            self.extract_compressed(source, target, format)
        } else {
            self.extract_archive(source, target, format)
                .with_context(|| format!("could not uncompress: {}", source.display()))
        }
    }

    fn extract_compressed(&self, source: &Path, target: &Path, format: ArchiveFormat) -> Result<()> {
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ArchiveError::Unrecognized {
                path: source.to_path_buf(),
            })?;
        let extension = file_extension(&filename);
        let stem = &filename[..filename.len() - extension.len()];
        let next_extension = file_extension(stem);

        let staging = staging_dir()?;
        let intermediate = staging.path().join(stem);
        {
            let input = BufReader::with_capacity(BUFFER_SIZE, open(source)?);
            let mut decoder = decoder(format, input);
            let mut out = BufWriter::with_capacity(BUFFER_SIZE, create(&intermediate)?);
            io::copy(&mut decoder, &mut out)
                .with_context(|| format!("could not uncompress: {}", source.display()))?;
            out.flush()
                .with_context(|| format!("failed to write {}", intermediate.display()))?;
        }

        if !next_extension.is_empty() && ArchiveFormat::sniff(&intermediate)?.is_some() {
            self.extract(&intermediate, target)?;
        } else {
            copy_dir_all(staging.path(), target)?;
        }
        remove_dir_all_with_retry(staging.path())?;
        Ok(())
    }

    fn extract_archive(&self, source: &Path, target: &Path, format: ArchiveFormat) -> Result<()> {
        let staging = staging_dir()?;
        let mut sink = StagingSink {
            root: staging.path(),
            posix: self.platform.supports_posix_permissions() && format.carries_unix_mode(),
            dir_modes: Vec::new(),
        };

        let input = open(source)?;
        match format {
            ArchiveFormat::Tar => {
                unpack_tar(BufReader::with_capacity(BUFFER_SIZE, input), &mut sink)?
            }
            ArchiveFormat::Zip => unpack_zip(input, &mut sink)?,
            ArchiveFormat::Ar => unpack_ar(BufReader::with_capacity(BUFFER_SIZE, input), &mut sink)?,
            ArchiveFormat::Gzip | ArchiveFormat::Bzip2 | ArchiveFormat::Xz => {
                unreachable!("compressors are handled by extract_compressed")
            }
        }
        sink.finish()?;

        // The staging area may sit on another filesystem than the target, so
        // copy rather than rename.
        copy_dir_all(staging.path(), target)?;
        remove_dir_all_with_retry(staging.path())?;
        Ok(())
    }
}

fn staging_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("cmake")
        .tempdir()
        .context("failed to create staging directory")
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("failed to open {}", path.display()))
}

fn create(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("failed to create {}", path.display()))
}

fn decoder<'a, R: io::BufRead + 'a>(format: ArchiveFormat, input: R) -> Box<dyn Read + 'a> {
    match format {
        ArchiveFormat::Gzip => Box::new(flate2::bufread::MultiGzDecoder::new(input)),
        ArchiveFormat::Bzip2 => Box::new(bzip2::bufread::MultiBzDecoder::new(input)),
        ArchiveFormat::Xz => Box::new(xz2::bufread::XzDecoder::new_multi_decoder(input)),
        // Archivers never reach here; pass the bytes through untouched.
        ArchiveFormat::Zip | ArchiveFormat::Tar | ArchiveFormat::Ar => Box::new(input),
    }
}

/// Resolve an entry name inside the staging root, rejecting escapes.
///
/// Returns `Ok(None)` for names that resolve to the root itself.
fn entry_path(root: &Path, name: &Path) -> Result<Option<PathBuf>, ArchiveError> {
    let mut relative = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::UnsafeEntry {
                    entry: name.display().to_string(),
                })
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Ok(None);
    }
    Ok(Some(root.join(relative)))
}

/// Reject paths that pass through a symlink below `root`.
///
/// Symlinks written by earlier entries could otherwise redirect later writes
/// outside the staging directory. `path` must lie under `root`.
fn check_no_symlinks(
    root: &Path,
    path: &Path,
    include_last: bool,
    name: &Path,
) -> Result<(), ArchiveError> {
    let Ok(relative) = path.strip_prefix(root) else {
        return Err(ArchiveError::UnsafeEntry {
            entry: name.display().to_string(),
        });
    };
    let components: Vec<_> = relative.components().collect();
    let checked = if include_last {
        components.len()
    } else {
        components.len().saturating_sub(1)
    };

    let mut current = root.to_path_buf();
    for component in &components[..checked] {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(ArchiveError::UnsafeEntry {
                    entry: name.display().to_string(),
                })
            }
            Ok(_) => {}
            // Nothing further down exists yet.
            Err(_) => break,
        }
    }
    Ok(())
}

/// Writes archive entries into the staging directory.
struct StagingSink<'a> {
    root: &'a Path,
    posix: bool,
    dir_modes: Vec<(PathBuf, u32)>,
}

impl StagingSink<'_> {
    /// Resolve `name` for writing. Ancestors must be real directories.
    fn resolve(&self, name: &Path) -> Result<Option<PathBuf>> {
        let path = entry_path(self.root, name)?;
        if let Some(ref path) = path {
            check_no_symlinks(self.root, path, false, name)?;
        }
        Ok(path)
    }

    /// Like [`Self::resolve`], but the entry itself may not be a symlink either.
    fn resolve_followed(&self, name: &Path) -> Result<Option<PathBuf>> {
        let path = entry_path(self.root, name)?;
        if let Some(ref path) = path {
            check_no_symlinks(self.root, path, true, name)?;
        }
        Ok(path)
    }

    fn directory(&mut self, name: &Path, mode: Option<u32>) -> Result<()> {
        let Some(path) = self.resolve_followed(name)? else {
            return Ok(());
        };
        ensure_dir(&path)?;
        if self.posix {
            self.dir_modes
                .push((path, mode.unwrap_or(DEFAULT_DIR_MODE)));
        }
        Ok(())
    }

    fn file(&mut self, name: &Path, mode: Option<u32>, data: &mut dyn Read) -> Result<()> {
        let Some(path) = self.resolve_followed(name)? else {
            return Ok(());
        };
        // Omitted parent directories get default permissions.
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let mut out = BufWriter::with_capacity(BUFFER_SIZE, create(&path)?);
        io::copy(data, &mut out)
            .with_context(|| format!("failed to extract {}", name.display()))?;
        out.flush()
            .with_context(|| format!("failed to write {}", path.display()))?;
        drop(out);
        if self.posix {
            apply_mode(&path, mode.unwrap_or(DEFAULT_FILE_MODE))?;
        }
        Ok(())
    }

    fn symlink(&mut self, name: &Path, link: &Path) -> Result<()> {
        let Some(path) = self.resolve(name)? else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        make_symlink(link, &path)
    }

    fn hard_link(&mut self, name: &Path, link: &Path) -> Result<()> {
        let (Some(path), Some(original)) =
            (self.resolve_followed(name)?, self.resolve_followed(link)?)
        else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        fs::copy(&original, &path).with_context(|| {
            format!(
                "failed to link {} to {}",
                path.display(),
                original.display()
            )
        })?;
        Ok(())
    }

    fn skip(&self, name: &str, reason: &str) {
        tracing::warn!("Unsupported entry type for {} ({}), skipping...", name, reason);
    }

    /// Apply directory modes deepest-first, after all files are written.
    fn finish(self) -> Result<()> {
        for (dir, mode) in self.dir_modes.into_iter().rev() {
            apply_mode(&dir, mode)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let posix = PosixMode::from_mode(mode);
    tracing::trace!("{} {}", posix, path.display());
    fs::set_permissions(path, fs::Permissions::from_mode(posix.to_mode()))
        .with_context(|| format!("failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn make_symlink(link: &Path, path: &Path) -> Result<()> {
    if fs::symlink_metadata(path).is_ok() {
        fs::remove_file(path).with_context(|| format!("failed to replace {}", path.display()))?;
    }
    std::os::unix::fs::symlink(link, path)
        .with_context(|| format!("failed to create symlink: {}", path.display()))
}

#[cfg(not(unix))]
fn make_symlink(_link: &Path, path: &Path) -> Result<()> {
    tracing::debug!("Skipping symlink on this platform: {}", path.display());
    Ok(())
}

fn unpack_tar<R: Read>(input: R, sink: &mut StagingSink<'_>) -> Result<()> {
    let mut archive = tar::Archive::new(input);
    for entry in archive.entries().context("failed to read tar entries")? {
        let mut entry = entry.context("failed to read tar entry")?;
        let name = entry.path().context("invalid tar entry path")?.into_owned();
        let mode = entry.header().mode().ok();

        // Unread entry data is skipped by the iterator, keeping later
        // entries aligned.
        match entry.header().entry_type() {
            tar::EntryType::Directory => sink.directory(&name, mode)?,
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                sink.file(&name, mode, &mut entry)?
            }
            tar::EntryType::Symlink => match entry.link_name()? {
                Some(link) => sink.symlink(&name, &link)?,
                None => sink.skip(&name.display().to_string(), "symlink without target"),
            },
            tar::EntryType::Link => match entry.link_name()? {
                Some(link) => sink.hard_link(&name, &link)?,
                None => sink.skip(&name.display().to_string(), "hard link without target"),
            },
            other => sink.skip(&name.display().to_string(), &format!("{:?}", other)),
        }
    }
    Ok(())
}

fn unpack_zip(input: File, sink: &mut StagingSink<'_>) -> Result<()> {
    let mut archive = zip::ZipArchive::new(BufReader::with_capacity(BUFFER_SIZE, input))
        .context("failed to read zip archive")?;
    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::UnsupportedArchive(reason)) => {
                sink.skip(&format!("entry #{}", index), reason);
                continue;
            }
            Err(e) => return Err(e).context("failed to read zip entry"),
        };
        let raw_name = entry.name().to_string();
        let name = entry.enclosed_name().ok_or_else(|| ArchiveError::UnsafeEntry {
            entry: raw_name.clone(),
        })?;
        let mode = entry.unix_mode();
        if entry.is_dir() {
            sink.directory(&name, mode)?;
        } else if entry.is_symlink() {
            let mut link = String::new();
            entry
                .read_to_string(&mut link)
                .with_context(|| format!("failed to read symlink target of {}", raw_name))?;
            sink.symlink(&name, Path::new(&link))?;
        } else {
            sink.file(&name, mode, &mut entry)?;
        }
    }
    Ok(())
}

fn unpack_ar<R: Read>(input: R, sink: &mut StagingSink<'_>) -> Result<()> {
    let mut archive = ar::Archive::new(input);
    while let Some(entry) = archive.next_entry() {
        let mut entry = entry.context("failed to read ar entry")?;
        let identifier = String::from_utf8_lossy(entry.header().identifier()).into_owned();
        let name = PathBuf::from(identifier.trim_end_matches('/'));
        let mode = Some(entry.header().mode());
        sink.file(&name, mode, &mut entry)?;
    }
    Ok(())
}
