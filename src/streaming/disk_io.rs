//! Disk cache for downloaded resource content
//!
//! Entries are stored LZ4 compressed with the uncompressed size
//! prepended. Paths are derived from resource names by a pure sanitizing
//! transform so the same name always maps to the same file.

use crate::core::types::Result;
use crate::core::Error;
use std::io;
use std::path::{Path, PathBuf};

/// Replace every character that is not alphanumeric, `-` or `.` with `_`
///
/// Path separators survive when `preserve_separators` is set.
pub fn sanitize_name(name: &str, preserve_separators: bool) -> String {
    name.chars()
        .map(|c| {
            let keep = c.is_ascii_alphanumeric()
                || c == '-'
                || c == '.'
                || (preserve_separators && (c == '/' || c == '\\'));
            if keep { c } else { '_' }
        })
        .collect()
}

/// Sanitized single path component that cannot climb out of its parent
fn safe_component(part: &str) -> String {
    let sanitized = sanitize_name(part, false);
    if sanitized.chars().all(|c| c == '.') {
        "_".repeat(sanitized.len().max(1))
    } else {
        sanitized
    }
}

/// Compressed on-disk store keyed by resource name
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Open (and create) a cache rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// `$HOME/.cache/globestream`
    pub fn default_root() -> Result<PathBuf> {
        let home = std::env::var_os("HOME")
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Configuration("HOME is not set; configure cache_path".into()))?;
        Ok(PathBuf::from(home).join(".cache").join("globestream"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for a resource name
    ///
    /// The URL scheme is dropped, the remaining parent path is flattened
    /// into one sanitized directory and the file name sanitized on its own.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let stripped = match name.find("://") {
            Some(i) => &name[i + 3..],
            None => name,
        };
        let stripped = stripped.trim_start_matches('/');
        match stripped.rfind('/') {
            Some(i) => self
                .root
                .join(safe_component(&stripped[..i]))
                .join(safe_component(&stripped[i + 1..])),
            None => self.root.join(safe_component(stripped)),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    /// Read and decompress an entry
    pub fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        let compressed = std::fs::read(self.path_for(name))?;
        lz4_flex::decompress_size_prepended(&compressed).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("LZ4 decompression failed: {}", e))
        })
    }

    /// Compress and store an entry
    ///
    /// Writes to a temporary sibling first so readers never observe a
    /// partial file.
    pub fn write(&self, name: &str, content: &[u8]) -> io::Result<()> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        std::fs::write(&tmp, lz4_flex::compress_prepend_size(content))?;
        std::fs::rename(&tmp, &path)
    }

    /// Delete an entry if present
    pub fn remove(&self, name: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path_for(name)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
