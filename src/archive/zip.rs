// src/archive/zip.rs

//! ZIP container access for update packages
//!
//! The writer produces deterministic archives: entries are added in the
//! order the builder supplies them (lexicographic), with a fixed timestamp
//! so two builds of identical inputs differ only in the signature value.
//! The reader addresses entries by name; anything not referenced by the
//! manifest is ignored.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Writer for a package ZIP
pub struct PackageWriter {
    inner: ZipWriter<File>,
    path: PathBuf,
}

impl PackageWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        Ok(Self {
            inner: ZipWriter::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Add one entry with the package's fixed options
    pub fn add_entry(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(0o644);

        self.inner
            .start_file(name, options)
            .map_err(|e| Error::PackageCorrupt(format!("failed to start entry {name}: {e}")))?;
        self.inner
            .write_all(bytes)
            .map_err(|e| Error::io(&self.path, e))?;
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        let mut inner = self.inner;
        inner
            .finish()
            .map_err(|e| Error::PackageCorrupt(format!("failed to finalize archive: {e}")))?;
        Ok(())
    }
}

/// Reader over a package ZIP
pub struct PackageReader {
    archive: ZipArchive<File>,
}

impl PackageReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let archive = ZipArchive::new(file)
            .map_err(|e| Error::PackageCorrupt(format!("not a readable zip archive: {e}")))?;
        Ok(Self { archive })
    }

    pub fn has_entry(&mut self, name: &str) -> bool {
        self.archive.by_name(name).is_ok()
    }

    /// Read one entry's bytes. A missing entry is `PackageCorrupt`: every
    /// name we look up comes from a verified manifest.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut entry = self
            .archive
            .by_name(name)
            .map_err(|_| Error::PackageCorrupt(format!("missing package entry: {name}")))?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| Error::PackageCorrupt(format!("unreadable package entry {name}: {e}")))?;
        Ok(bytes)
    }

    pub fn entry_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }
}

/// Extract every file entry of a ZIP into `dest_dir`, rejecting entries
/// whose paths are not safe relative paths. Used for full-install recovery
/// archives, not for update packages (those are consumed entry-by-entry).
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    use crate::manifest::is_safe_relative_path;

    let mut reader = PackageReader::open(archive_path)?;
    let names = reader.entry_names();

    for name in names {
        if name.ends_with('/') {
            continue;
        }
        if !is_safe_relative_path(&name) {
            return Err(Error::PackageCorrupt(format!(
                "unsafe path in archive: {name}"
            )));
        }

        let bytes = reader.read_entry(&name)?;
        let target = dest_dir.join(&name);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::fs::write(&target, bytes).map_err(|e| Error::io(&target, e))?;
    }

    Ok(())
}
