//! Editing the managed region of the authorized keys file.
//!
//! The region is the block of lines between [`REGION_HEADER`] and
//! [`REGION_FOOTER`]. Every operation reads the whole file, computes the new
//! line sequence with one of the pure functions below, and replaces the file
//! in one step. Lines are raw bytes: those outside the region are copied
//! through untouched and only line endings are normalised to `\n`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{classify_io_error, KeyFileError};

/// First line of the managed region.
pub const REGION_HEADER: &str =
    "############################ ACCES.SH ############################";

/// Last line of the managed region.
pub const REGION_FOOTER: &str =
    "########################## END ACCES.SH ##########################";

/// One credential line, compared by exact string equality.
pub type KeyEntry = String;

/// Keys in server-pushed order.
pub type KeySet = Vec<KeyEntry>;

/// One raw file line without its terminator. Content outside the region is
/// never decoded.
pub type Line = Vec<u8>;

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if !first.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    while let [rest @ .., last] = bytes {
        if !last.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    bytes
}

fn is_header(line: &[u8]) -> bool {
    trim_ascii(line) == REGION_HEADER.as_bytes()
}

fn is_footer(line: &[u8]) -> bool {
    trim_ascii(line) == REGION_FOOTER.as_bytes()
}

fn is_marker(line: &[u8]) -> bool {
    is_header(line) || is_footer(line)
}

/// Keys that can be written as exactly one region line.
///
/// Entries spanning several lines or equal to a marker are dropped with a
/// warning.
pub fn writable_keys(keys: &[KeyEntry]) -> Vec<Line> {
    keys.iter()
        .filter(|key| {
            if key.contains(['\n', '\r']) {
                warn!("Ignoring key entry containing a line break");
                false
            } else if is_marker(key.as_bytes()) {
                warn!("Ignoring key entry equal to a region marker");
                false
            } else {
                true
            }
        })
        .map(|key| key.as_bytes().to_vec())
        .collect()
}

/// Position of the marker lines in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Index of the first header line.
    pub header: usize,
    /// Index of the first footer line after the header, if any.
    pub footer: Option<usize>,
}

impl Region {
    /// Index range of the lines strictly between the markers.
    fn body(&self, len: usize) -> std::ops::Range<usize> {
        self.header + 1..self.footer.unwrap_or(len)
    }
}

/// Find the managed region. A footer that precedes the header is ignored.
pub fn locate_region(lines: &[Line]) -> Option<Region> {
    let header = lines.iter().position(|line| is_header(line))?;
    let footer = lines[header + 1..]
        .iter()
        .position(|line| is_footer(line))
        .map(|offset| header + 1 + offset);
    Some(Region { header, footer })
}

/// Keys currently inside the managed region, in file order.
pub fn region_keys(lines: &[Line]) -> Vec<String> {
    match locate_region(lines) {
        Some(region @ Region {
            footer: Some(_), ..
        }) => lines[region.body(lines.len())]
            .iter()
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect(),
        _ => Vec::new(),
    }
}

/// A mutation of the managed region.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOperation {
    /// Make the region contain exactly these keys.
    ReplaceAll(KeySet),
    /// Insert these keys at the top of the region.
    Add(KeySet),
    /// Delete region lines equal to one of these keys.
    Remove(KeySet),
}

impl KeyOperation {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            KeyOperation::ReplaceAll(_) => "replace_all",
            KeyOperation::Add(_) => "add",
            KeyOperation::Remove(_) => "remove",
        }
    }

    /// Keys carried by the operation.
    pub fn keys(&self) -> &[KeyEntry] {
        match self {
            KeyOperation::ReplaceAll(keys) | KeyOperation::Add(keys) | KeyOperation::Remove(keys) => {
                keys
            }
        }
    }

    /// Compute the new file content. On error, returns the missing marker.
    pub fn apply(&self, lines: Vec<Line>) -> Result<Vec<Line>, &'static str> {
        match self {
            KeyOperation::ReplaceAll(keys) => Ok(replace_region(lines, keys)),
            KeyOperation::Add(keys) => insert_into_region(lines, keys),
            KeyOperation::Remove(keys) => remove_from_region(lines, keys),
        }
    }
}

/// Replace the whole region with `keys`.
///
/// Without a region, a fresh header/footer pair is appended at the end of
/// the file. A header with no footer is treated as a region running to the
/// end of the file. Stray marker lines outside the region are dropped so
/// that exactly one pair remains.
pub fn replace_region(lines: Vec<Line>, keys: &[KeyEntry]) -> Vec<Line> {
    let keys = writable_keys(keys);
    let region = locate_region(&lines);
    let mut out = Vec::with_capacity(lines.len() + keys.len() + 2);

    match region {
        Some(Region {
            header,
            footer: Some(footer),
        }) => {
            out.extend(lines[..header].iter().filter(|l| !is_marker(l)).cloned());
            out.push(lines[header].clone());
            out.extend(keys);
            out.push(lines[footer].clone());
            out.extend(lines[footer + 1..].iter().filter(|l| !is_marker(l)).cloned());
        }
        Some(Region { header, footer: None }) => {
            out.extend(lines[..header].iter().filter(|l| !is_marker(l)).cloned());
            out.push(REGION_HEADER.as_bytes().to_vec());
            out.extend(keys);
            out.push(REGION_FOOTER.as_bytes().to_vec());
        }
        None => {
            out.extend(lines.into_iter().filter(|l| !is_marker(l)));
            out.push(REGION_HEADER.as_bytes().to_vec());
            out.extend(keys);
            out.push(REGION_FOOTER.as_bytes().to_vec());
        }
    }

    out
}

/// Insert `keys` right after the header, ahead of existing region content.
pub fn insert_into_region(
    mut lines: Vec<Line>,
    keys: &[KeyEntry],
) -> Result<Vec<Line>, &'static str> {
    let region = locate_region(&lines).ok_or(REGION_HEADER)?;
    let at = region.header + 1;
    lines.splice(at..at, writable_keys(keys));
    Ok(lines)
}

/// Delete region lines that exactly equal one of `keys`.
///
/// Lines outside the region are never matched.
pub fn remove_from_region(
    lines: Vec<Line>,
    keys: &[KeyEntry],
) -> Result<Vec<Line>, &'static str> {
    let region = locate_region(&lines).ok_or(REGION_HEADER)?;
    if region.footer.is_none() {
        return Err(REGION_FOOTER);
    }

    let doomed: HashSet<&[u8]> = keys.iter().map(|key| key.as_bytes()).collect();
    let body = region.body(lines.len());

    Ok(lines
        .into_iter()
        .enumerate()
        .filter(|(idx, line)| !(body.contains(idx) && doomed.contains(line.as_slice())))
        .map(|(_, line)| line)
        .collect())
}

/// Split file content into lines, dropping `\r\n`/`\n` terminators.
pub fn parse_lines(content: &[u8]) -> Vec<Line> {
    if content.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<Line> = content
        .split(|byte| *byte == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line).to_vec())
        .collect();
    if content.ends_with(b"\n") {
        lines.pop();
    }
    lines
}

/// Join lines with `\n`, terminating the last one.
pub fn render_lines(lines: &[Line]) -> Vec<u8> {
    let mut out = Vec::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    out
}

/// Applies [`KeyOperation`]s to one authorized keys file.
///
/// The editor holds no state besides the path; every call re-reads the
/// file. Callers must serialise calls (see [`super::KeyWriter`]).
#[derive(Debug, Clone)]
pub struct KeyFileEditor {
    path: PathBuf,
}

impl KeyFileEditor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that the file exists and can be opened for reading and writing.
    ///
    /// Nothing is written. A file whose permission bits mark it read-only
    /// is refused even when the process could override them.
    pub async fn check_access(&self) -> Result<(), KeyFileError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| classify_io_error(&self.path, "inspect", e))?;

        if !metadata.is_file() {
            return Err(KeyFileError::Io {
                path: self.path.clone(),
                operation: "open",
                message: "not a regular file".to_string(),
            });
        }

        if metadata.permissions().readonly() {
            return Err(KeyFileError::PermissionDenied {
                path: self.path.clone(),
            });
        }

        tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .await
            .map(|_| ())
            .map_err(|e| classify_io_error(&self.path, "open", e))
    }

    /// Make the region contain exactly `keys`.
    pub async fn replace_all(&self, keys: &[KeyEntry]) -> Result<(), KeyFileError> {
        self.apply(&KeyOperation::ReplaceAll(keys.to_vec())).await
    }

    /// Insert `keys` at the top of the region.
    pub async fn add(&self, keys: &[KeyEntry]) -> Result<(), KeyFileError> {
        self.apply(&KeyOperation::Add(keys.to_vec())).await
    }

    /// Remove `keys` from the region.
    pub async fn remove(&self, keys: &[KeyEntry]) -> Result<(), KeyFileError> {
        self.apply(&KeyOperation::Remove(keys.to_vec())).await
    }

    /// Read, transform, and rewrite the file.
    pub async fn apply(&self, op: &KeyOperation) -> Result<(), KeyFileError> {
        let lines = self.read_lines().await?;
        let updated = op.apply(lines).map_err(|marker| KeyFileError::RegionNotFound {
            path: self.path.clone(),
            marker,
        })?;
        self.write_lines(&updated).await?;

        debug!(
            "Applied {} with {} key(s) to {}",
            op.name(),
            op.keys().len(),
            self.path.display()
        );
        Ok(())
    }

    /// Keys currently in the region.
    pub async fn managed_keys(&self) -> Result<Vec<String>, KeyFileError> {
        Ok(region_keys(&self.read_lines().await?))
    }

    async fn read_lines(&self) -> Result<Vec<Line>, KeyFileError> {
        let content = tokio::fs::read(&self.path)
            .await
            .map_err(|e| classify_io_error(&self.path, "read", e))?;
        Ok(parse_lines(&content))
    }

    /// Write to a sibling temp file and rename it over the target, so the
    /// file is never seen half-written.
    ///
    /// A key file that cannot be replaced by rename (a bind-mounted file, or
    /// a directory the daemon may not write to) is rewritten in place.
    async fn write_lines(&self, lines: &[Line]) -> Result<(), KeyFileError> {
        let content = render_lines(lines);

        // Follow a symlinked key file so the link itself survives the rename.
        let target = tokio::fs::canonicalize(&self.path)
            .await
            .map_err(|e| classify_io_error(&self.path, "resolve", e))?;

        match replace_atomically(&target, &content).await {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(
                    "Atomic replace of {} failed ({}), rewriting in place",
                    target.display(),
                    e
                );
                self.write_in_place(&target, &content).await
            }
        }
    }

    async fn write_in_place(&self, target: &Path, content: &[u8]) -> Result<(), KeyFileError> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(target)
            .await
            .map_err(|e| classify_io_error(&self.path, "open", e))?;

        file.write_all(content)
            .await
            .map_err(|e| classify_io_error(&self.path, "write", e))?;
        file.sync_all()
            .await
            .map_err(|e| classify_io_error(&self.path, "sync", e))
    }
}

async fn replace_atomically(target: &Path, content: &[u8]) -> std::io::Result<()> {
    let metadata = tokio::fs::metadata(target).await?;
    let temp_path = temp_path_for(target);

    let result = match write_replacement(&temp_path, content, &metadata).await {
        Ok(()) => tokio::fs::rename(&temp_path, target).await,
        Err(e) => Err(e),
    };
    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    result
}

fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "authorized_keys".to_string());
    target.with_file_name(format!(".{}.accessh-tmp", name))
}

async fn write_replacement(
    temp_path: &Path,
    content: &[u8],
    original: &std::fs::Metadata,
) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(temp_path).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::set_permissions(temp_path, original.permissions()).await?;

    // Keep the owner sshd expects; only possible when privileged or unchanged.
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if let Err(e) = std::os::unix::fs::chown(temp_path, Some(original.uid()), Some(original.gid())) {
            debug!("Could not copy key file ownership: {}", e);
        }
    }

    Ok(())
}
