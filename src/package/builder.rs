// src/package/builder.rs

//! Update package builder
//!
//! Walks the old and new installation trees, classifies every file as
//! added, modified, or removed, produces bsdiff patches for modifications,
//! assembles and signs the manifest, and writes the ZIP package. File order
//! in the manifest is lexicographic by target path; two invocations on
//! identical inputs produce byte-identical manifests apart from the
//! signature value.

use crate::archive::{pack_dir, PackageWriter};
use crate::bsdiff;
use crate::config::ReleaseConfig;
use crate::error::{Error, Result};
use crate::hash::{hash_bytes, hash_file};
use crate::manifest::{FileAction, Manifest};
use p256::ecdsa::SigningKey;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{add_entry_name, patch_entry_name, META_NAME, PACKAGE_NAME};

/// Result of a package build
#[derive(Debug)]
pub struct BuildResult {
    /// The finished ZIP package
    pub package_path: PathBuf,
    /// Signed manifest copy written alongside the package
    pub manifest_path: PathBuf,
    pub manifest: Manifest,
}

/// Builder for signed update packages
pub struct PackageBuilder {
    old_dir: PathBuf,
    new_dir: PathBuf,
    output_dir: PathBuf,
    config: ReleaseConfig,
}

impl PackageBuilder {
    pub fn new(old_dir: &Path, new_dir: &Path, output_dir: &Path) -> Self {
        Self {
            old_dir: old_dir.to_path_buf(),
            new_dir: new_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            config: ReleaseConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReleaseConfig) -> Self {
        self.config = config;
        self
    }

    /// Build and sign the package
    pub fn build(&self, key: &SigningKey) -> Result<BuildResult> {
        info!(
            "building update package: {} -> {}",
            self.old_dir.display(),
            self.new_dir.display()
        );

        let old_files = scan_tree(&self.old_dir)?;
        let new_files = scan_tree(&self.new_dir)?;

        let all_paths: BTreeSet<&String> = old_files.keys().chain(new_files.keys()).collect();

        let mut actions = Vec::new();
        let mut entries: Vec<(String, Vec<u8>)> = Vec::new();

        for path in all_paths {
            match (old_files.get(path), new_files.get(path)) {
                (Some(old_path), Some(new_path)) => {
                    let old_bytes = fs::read(old_path).map_err(|e| Error::io(old_path, e))?;
                    let new_bytes = fs::read(new_path).map_err(|e| Error::io(new_path, e))?;
                    if old_bytes == new_bytes {
                        debug!("unchanged: {path}");
                        continue;
                    }

                    let patch = bsdiff::create(&old_bytes, &new_bytes)?;
                    let entry_name = patch_entry_name(path);
                    debug!(
                        "modified: {path} ({} -> {} bytes, patch {})",
                        old_bytes.len(),
                        new_bytes.len(),
                        patch.len()
                    );

                    actions.push(FileAction::modified(
                        path.clone(),
                        entry_name.clone(),
                        hash_bytes(&old_bytes),
                        hash_bytes(&new_bytes),
                        hash_bytes(&patch),
                    ));
                    entries.push((entry_name, patch));
                }
                (None, Some(new_path)) => {
                    let bytes = fs::read(new_path).map_err(|e| Error::io(new_path, e))?;
                    let entry_name = add_entry_name(path);
                    debug!("added: {path} ({} bytes)", bytes.len());

                    let digest = hash_bytes(&bytes);
                    actions.push(FileAction::added(
                        path.clone(),
                        entry_name.clone(),
                        digest.clone(),
                        digest,
                        is_executable(new_path),
                    ));
                    entries.push((entry_name, bytes));
                }
                (Some(_), None) => {
                    debug!("removed: {path}");
                    actions.push(FileAction::removed(path.clone()));
                }
                (None, None) => unreachable!("path came from one of the trees"),
            }
        }

        fs::create_dir_all(&self.output_dir).map_err(|e| Error::io(&self.output_dir, e))?;

        let mut manifest = Manifest {
            version_id: self.config.version_id,
            version: self.config.version.clone(),
            from_version_id: self.config.from_version_id,
            release_name: self.config.release_name.clone(),
            changes: self.config.changes.clone(),
            files: actions,
            restart_required: self.config.restart_required,
            critical: self.config.critical,
            fallback_installer_file: self.config.fallback_installer_file.clone(),
            fallback_installer_hash: self.config.fallback_installer_hash.clone(),
            fallback_installer_arguments: self.config.fallback_installer_arguments.clone(),
            full_package_file: None,
            full_package_hash: None,
            signature: None,
        };

        if self.config.include_full_package {
            let name = self.config.full_package_name().to_string();
            let full_path = self.output_dir.join(&name);
            if name.ends_with(".zip") {
                let mut writer = PackageWriter::create(&full_path)?;
                for (rel, path) in &new_files {
                    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
                    writer.add_entry(rel, &bytes)?;
                }
                writer.finish()?;
            } else {
                pack_dir(&self.new_dir, &full_path)?;
            }
            manifest.full_package_hash = Some(hash_file(&full_path)?);
            manifest.full_package_file = Some(name);
            info!("full package written: {}", full_path.display());
        }

        manifest.validate()?;
        manifest.sign(key)?;

        let meta = manifest.to_json()?;
        let package_path = self.output_dir.join(PACKAGE_NAME);
        let mut writer = PackageWriter::create(&package_path)?;
        writer.add_entry(META_NAME, &meta)?;
        for (name, bytes) in &entries {
            writer.add_entry(name, bytes)?;
        }
        writer.finish()?;

        let manifest_path = self.output_dir.join(META_NAME);
        fs::write(&manifest_path, &meta).map_err(|e| Error::io(&manifest_path, e))?;

        info!(
            "package written: {} ({} file actions)",
            package_path.display(),
            manifest.files.len()
        );

        Ok(BuildResult {
            package_path,
            manifest_path,
            manifest,
        })
    }
}

/// Enumerate regular files under `root`, keyed by their forward-slash
/// relative path. BTreeMap keeps the order lexicographic.
fn scan_tree(root: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let mut files = BTreeMap::new();
    if !root.exists() {
        return Ok(files);
    }

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| Error::io(entry.path(), std::io::Error::other("path outside tree")))?;
        let key = relative.to_string_lossy().replace('\\', "/");
        files.insert(key, entry.into_path());
    }

    Ok(files)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ActionKind;
    use crate::signing::generate_signing_key;
    use tempfile::TempDir;

    fn write_file(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_classification() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        let out = dir.path().join("out");

        write_file(&old, "same.txt", b"same");
        write_file(&new, "same.txt", b"same");
        write_file(&old, "changed.bin", b"version one");
        write_file(&new, "changed.bin", b"version two");
        write_file(&new, "brand/new.txt", b"fresh");
        write_file(&old, "gone.txt", b"old only");

        let key = generate_signing_key();
        let result = PackageBuilder::new(&old, &new, &out).build(&key).unwrap();

        let kinds: Vec<(&str, ActionKind)> = result
            .manifest
            .files
            .iter()
            .map(|a| (a.path.as_str(), a.action))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("brand/new.txt", ActionKind::Added),
                ("changed.bin", ActionKind::Modified),
                ("gone.txt", ActionKind::Removed),
            ]
        );

        assert!(result.package_path.exists());
        assert!(result.manifest_path.exists());
    }

    #[test]
    fn test_identical_trees_yield_empty_files() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");

        write_file(&old, "a.txt", b"hello");
        write_file(&new, "a.txt", b"hello");

        let key = generate_signing_key();
        let result = PackageBuilder::new(&old, &new, &dir.path().join("out"))
            .build(&key)
            .unwrap();

        assert!(result.manifest.files.is_empty());
        assert!(result.manifest.signature.is_some());
    }

    #[test]
    fn test_manifest_is_deterministic_apart_from_signature() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");

        write_file(&old, "f", b"one");
        write_file(&new, "f", b"two");
        write_file(&new, "g", b"added");

        let key = generate_signing_key();
        let a = PackageBuilder::new(&old, &new, &dir.path().join("out_a"))
            .build(&key)
            .unwrap();
        let b = PackageBuilder::new(&old, &new, &dir.path().join("out_b"))
            .build(&key)
            .unwrap();

        let mut manifest_a = a.manifest.clone();
        let mut manifest_b = b.manifest.clone();
        manifest_a.signature = None;
        manifest_b.signature = None;
        assert_eq!(manifest_a, manifest_b);
    }

    #[test]
    fn test_full_package_emission() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        let out = dir.path().join("out");

        write_file(&new, "app.bin", b"payload");

        let config = ReleaseConfig {
            version_id: 3,
            from_version_id: 2,
            include_full_package: true,
            ..Default::default()
        };

        let key = generate_signing_key();
        let result = PackageBuilder::new(&old, &new, &out)
            .with_config(config)
            .build(&key)
            .unwrap();

        let full_name = result.manifest.full_package_file.clone().unwrap();
        let full_path = out.join(&full_name);
        assert!(full_path.exists());
        assert_eq!(
            result.manifest.full_package_hash.clone().unwrap(),
            hash_file(&full_path).unwrap()
        );
    }
}
