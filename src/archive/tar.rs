// src/archive/tar.rs

//! Deterministic TAR writer and path-safe reader
//!
//! Used for the optional full-install recovery archive. The writer zeroes
//! every field that would otherwise leak host state (mtime, uid, gid, owner
//! names) and walks the tree in sorted order, so identical input trees
//! produce byte-identical archives. The reader refuses any entry whose path
//! would escape the destination.

use crate::error::{Error, Result};
use crate::manifest::is_safe_relative_path;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use tar::{Archive, Builder, EntryType, Header};
use tracing::debug;
use walkdir::WalkDir;

use super::is_gzip;

/// Pack `src_dir` into a gzip-framed deterministic TAR at `dest`.
pub fn pack_dir(src_dir: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest).map_err(|e| Error::io(dest, e))?;
    let encoder = GzEncoder::new(file, flate2::Compression::default());
    let mut builder = Builder::new(encoder);

    let mut entries: Vec<_> = WalkDir::new(src_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    entries.sort();

    for path in entries {
        let relative = path
            .strip_prefix(src_dir)
            .map_err(|_| Error::io(&path, std::io::Error::other("path outside source tree")))?;
        let name = relative.to_string_lossy().replace('\\', "/");

        let metadata = fs::metadata(&path).map_err(|e| Error::io(&path, e))?;
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(metadata.len());
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mode(file_mode(&metadata));
        header.set_cksum();

        let reader = File::open(&path).map_err(|e| Error::io(&path, e))?;
        builder
            .append_data(&mut header, &name, reader)
            .map_err(|e| Error::io(dest, e))?;
    }

    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .and_then(|file| file.sync_all().map(|_| ()))
        .map_err(|e| Error::io(dest, e))?;

    Ok(())
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 != 0 {
        0o755
    } else {
        0o644
    }
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> u32 {
    0o644
}

/// Unpack a TAR (gzip framing auto-detected) into `dest_dir`, rejecting
/// entries whose paths are not safe relative paths.
pub fn unpack_tar(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let mut file = File::open(archive_path).map_err(|e| Error::io(archive_path, e))?;
    let mut magic = [0u8; 2];
    let n = file.read(&mut magic).map_err(|e| Error::io(archive_path, e))?;
    drop(file);

    let file = File::open(archive_path).map_err(|e| Error::io(archive_path, e))?;
    let reader: Box<dyn Read> = if n == 2 && is_gzip(&magic) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut archive = Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| Error::PackageCorrupt(format!("unreadable tar archive: {e}")))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::PackageCorrupt(format!("unreadable tar entry: {e}")))?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = {
            let path = entry
                .path()
                .map_err(|e| Error::PackageCorrupt(format!("undecodable tar path: {e}")))?;
            path.to_string_lossy().replace('\\', "/")
        };
        if !is_safe_relative_path(&name) {
            return Err(Error::PackageCorrupt(format!(
                "unsafe path in archive: {name}"
            )));
        }

        let target = dest_dir.join(&name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| Error::PackageCorrupt(format!("unreadable tar entry {name}: {e}")))?;

        let mut out = File::create(&target).map_err(|e| Error::io(&target, e))?;
        out.write_all(&bytes).map_err(|e| Error::io(&target, e))?;
        out.sync_all().map_err(|e| Error::io(&target, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = entry.header().mode().unwrap_or(0o644) & 0o777;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))
                .map_err(|e| Error::io(&target, e))?;
        }

        debug!("extracted {}", name);
    }

    Ok(())
}
