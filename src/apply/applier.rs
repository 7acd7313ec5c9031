// src/apply/applier.rs

//! Package applier
//!
//! `apply` validates a downloaded package and transforms the target
//! directory into the new version. Verification is strictly ordered:
//! manifest parse, signature over the canonical encoding, package entry
//! hashes, on-disk pre-image hashes. Only then is anything reconstructed,
//! into a staging directory private to the run, and only after every staged
//! file has passed its post-image hash does the commit touch the target:
//! renames in manifest order, deletions last.

use crate::archive::PackageReader;
use crate::bsdiff;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::hash::{digests_equal, hash_bytes, hash_file};
use crate::manifest::{ActionKind, FileAction, Manifest};
use crate::package::META_NAME;
use p256::ecdsa::VerifyingKey;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// One reconstructed file waiting for commit
struct StagedFile {
    staged: PathBuf,
    target: PathBuf,
}

/// Package applier holding the trusted public key
pub struct Applier {
    public_key: VerifyingKey,
    cancel: CancelToken,
}

impl Applier {
    pub fn new(public_key: VerifyingKey) -> Self {
        Self {
            public_key,
            cancel: CancelToken::new(),
        }
    }

    /// Install a cancellation token shared with the caller
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Validate a package without touching any installation: manifest
    /// parse, signature, package entry hashes. Returns the trusted manifest.
    pub fn verify_package(&self, package: &Path) -> Result<Manifest> {
        let mut reader = PackageReader::open(package)?;
        let manifest = load_manifest(&mut reader)?;
        self.cancel.check()?;
        manifest.verify_signature(&self.public_key)?;
        self.cancel.check()?;
        verify_package_entries(&mut reader, &manifest)?;
        Ok(manifest)
    }

    /// Apply a package to `target_dir`. Any failure before the commit
    /// stage leaves the target untouched.
    pub fn apply(&self, package: &Path, target_dir: &Path) -> Result<Manifest> {
        info!(
            "applying {} to {}",
            package.display(),
            target_dir.display()
        );

        let mut reader = PackageReader::open(package)?;
        let manifest = load_manifest(&mut reader)?;

        self.cancel.check()?;
        manifest.verify_signature(&self.public_key)?;
        debug!("signature verified (version {})", manifest.version_id);

        self.cancel.check()?;
        verify_package_entries(&mut reader, &manifest)?;

        self.cancel.check()?;
        verify_preimages(&manifest, target_dir)?;

        let staging = self.stage(&mut reader, &manifest, target_dir)?;

        // Commit point: cancellation is no longer honoured.
        commit(staging, &manifest, target_dir)?;

        info!(
            "update applied: version {} ({} file actions)",
            manifest.version_id,
            manifest.files.len()
        );
        Ok(manifest)
    }

    /// Reconstruct every added/modified file into a staging directory
    /// inside the target (same volume, so commit renames stay atomic).
    /// The staging directory is removed wholesale on any failure.
    fn stage(
        &self,
        reader: &mut PackageReader,
        manifest: &Manifest,
        target_dir: &Path,
    ) -> Result<(TempDir, Vec<StagedFile>)> {
        let staging_dir = tempfile::Builder::new()
            .prefix(".updraft-staging-")
            .tempdir_in(target_dir)
            .map_err(|e| Error::io(target_dir, e))?;

        let mut staged = Vec::new();

        for (index, action) in manifest.files.iter().enumerate() {
            self.cancel.check()?;

            let target = safe_target_path(target_dir, &action.path)?;
            let staged_path = staging_dir.path().join(format!("{index:04}"));

            match action.action {
                ActionKind::Modified => {
                    let patch_entry = action.patch_file.as_deref().ok_or_else(|| {
                        Error::MalformedManifest(format!("{}: missing PatchFile", action.path))
                    })?;
                    let expected = action.target_hash.as_deref().ok_or_else(|| {
                        Error::MalformedManifest(format!("{}: missing TargetHash", action.path))
                    })?;

                    let old_bytes = fs::read(&target).map_err(|e| Error::io(&target, e))?;
                    let patch = reader.read_entry(patch_entry)?;
                    let new_bytes = bsdiff::apply(&old_bytes, &patch)?;

                    let actual = hash_bytes(&new_bytes);
                    if !digests_equal(&actual, expected) {
                        return Err(Error::TargetMismatch {
                            path: action.path.clone(),
                            expected: expected.to_string(),
                            actual,
                        });
                    }

                    write_staged(&staged_path, &new_bytes)?;
                    preserve_mode(&target, &staged_path)?;
                    debug!("staged modified {}", action.path);
                }
                ActionKind::Added => {
                    let add_entry = action.add_file.as_deref().ok_or_else(|| {
                        Error::MalformedManifest(format!("{}: missing AddFile", action.path))
                    })?;
                    let expected = action.target_hash.as_deref().ok_or_else(|| {
                        Error::MalformedManifest(format!("{}: missing TargetHash", action.path))
                    })?;

                    let bytes = reader.read_entry(add_entry)?;
                    let actual = hash_bytes(&bytes);
                    if !digests_equal(&actual, expected) {
                        return Err(Error::TargetMismatch {
                            path: action.path.clone(),
                            expected: expected.to_string(),
                            actual,
                        });
                    }

                    write_staged(&staged_path, &bytes)?;
                    apply_mode(&staged_path, action.executable)?;
                    debug!("staged added {}", action.path);
                }
                ActionKind::Removed => continue,
            }

            staged.push(StagedFile {
                staged: staged_path,
                target,
            });
        }

        Ok((staging_dir, staged))
    }
}

fn load_manifest(reader: &mut PackageReader) -> Result<Manifest> {
    let bytes = reader.read_entry(META_NAME)?;
    Manifest::parse(&bytes)
}

/// Stage 3: every entry a FileAction references must hash to its
/// PackageFileHash before any of its bytes are used.
fn verify_package_entries(reader: &mut PackageReader, manifest: &Manifest) -> Result<()> {
    for action in &manifest.files {
        let expected = match action.package_file_hash.as_deref() {
            Some(hash) => hash,
            None => continue,
        };
        let entry = referenced_entry(action).ok_or_else(|| {
            Error::MalformedManifest(format!(
                "{}: PackageFileHash without a package entry",
                action.path
            ))
        })?;

        let bytes = reader.read_entry(entry)?;
        let actual = hash_bytes(&bytes);
        if !digests_equal(&actual, expected) {
            return Err(Error::PackageCorrupt(format!(
                "entry {entry} hashes to {actual}, manifest says {expected}"
            )));
        }
    }
    debug!("package entry hashes verified");
    Ok(())
}

/// Stage 4: every modified action's on-disk file must match its SourceHash.
fn verify_preimages(manifest: &Manifest, target_dir: &Path) -> Result<()> {
    for action in &manifest.files {
        if action.action != ActionKind::Modified {
            continue;
        }
        let expected = action.source_hash.as_deref().ok_or_else(|| {
            Error::MalformedManifest(format!("{}: missing SourceHash", action.path))
        })?;

        let on_disk = safe_target_path(target_dir, &action.path)?;
        if !on_disk.is_file() {
            warn!("pre-image missing: {}", action.path);
            return Err(Error::SourceMismatch {
                path: action.path.clone(),
                expected: expected.to_string(),
                actual: "missing".to_string(),
            });
        }

        let actual = hash_file(&on_disk)?;
        if !digests_equal(&actual, expected) {
            warn!("pre-image drift: {}", action.path);
            return Err(Error::SourceMismatch {
                path: action.path.clone(),
                expected: expected.to_string(),
                actual,
            });
        }
    }
    debug!("pre-image hashes verified");
    Ok(())
}

/// Stage 6: renames in manifest order, then deletions.
fn commit(
    staging: (TempDir, Vec<StagedFile>),
    manifest: &Manifest,
    target_dir: &Path,
) -> Result<()> {
    let (staging_dir, staged) = staging;

    for file in &staged {
        if let Some(parent) = file.target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::rename(&file.staged, &file.target).map_err(|e| Error::io(&file.target, e))?;
    }

    for action in &manifest.files {
        if action.action != ActionKind::Removed {
            continue;
        }
        let target = safe_target_path(target_dir, &action.path)?;
        match fs::remove_file(&target) {
            Ok(()) => debug!("removed {}", action.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("already removed: {}", action.path);
            }
            Err(e) => return Err(Error::io(&target, e)),
        }
    }

    drop(staging_dir);
    Ok(())
}

/// Join a manifest path onto the target root, rejecting anything that
/// would escape it. Manifest validation already refused unsafe paths; this
/// is the applier's own guard on the path it is about to write.
fn safe_target_path(target_dir: &Path, path: &str) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => {
                return Err(Error::MalformedManifest(format!(
                    "unsafe file path: {path}"
                )));
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(Error::MalformedManifest("empty file path".to_string()));
    }

    let target = target_dir.join(&normalized);
    if !target.starts_with(target_dir) {
        return Err(Error::MalformedManifest(format!(
            "path escapes target root: {path}"
        )));
    }
    Ok(target)
}

fn write_staged(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| Error::io(path, e))?;
    file.write_all(bytes).map_err(|e| Error::io(path, e))?;
    file.sync_all().map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Carry the pre-image's mode bits onto the staged replacement
#[cfg(unix)]
fn preserve_mode(source: &Path, staged: &Path) -> Result<()> {
    let perms = fs::metadata(source)
        .map_err(|e| Error::io(source, e))?
        .permissions();
    fs::set_permissions(staged, perms).map_err(|e| Error::io(staged, e))
}

#[cfg(not(unix))]
fn preserve_mode(_source: &Path, _staged: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn apply_mode(staged: &Path, executable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if executable { 0o755 } else { 0o644 };
    fs::set_permissions(staged, fs::Permissions::from_mode(mode))
        .map_err(|e| Error::io(staged, e))
}

#[cfg(not(unix))]
fn apply_mode(_staged: &Path, _executable: bool) -> Result<()> {
    Ok(())
}

/// The package entry an action references, if its variant carries one
fn referenced_entry(action: &FileAction) -> Option<&str> {
    match action.action {
        ActionKind::Modified => action.patch_file.as_deref(),
        ActionKind::Added => action.add_file.as_deref(),
        ActionKind::Removed => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_target_path_rejects_escapes() {
        let root = Path::new("/srv/app");
        assert!(safe_target_path(root, "../etc/passwd").is_err());
        assert!(safe_target_path(root, "/etc/passwd").is_err());
        assert!(safe_target_path(root, "a/../../b").is_err());
        assert!(safe_target_path(root, "").is_err());

        let ok = safe_target_path(root, "bin/app").unwrap();
        assert_eq!(ok, Path::new("/srv/app/bin/app"));
    }
}
