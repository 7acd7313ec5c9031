// src/commands/mod.rs

//! Command implementations for the `updraft` CLI
//!
//! Thin wrappers over the library API. Security-class failures (bad
//! signatures, corrupt packages, key problems) are labelled as such on the
//! way out so they are never mistaken for ordinary I/O trouble.

use crate::apply::{Applier, UpdateController};
use crate::config::ReleaseConfig;
use crate::error::Error;
use crate::fetch::HttpFetcher;
use crate::hash::hash_file;
use crate::package::{sign_entry_file, PackageBuilder};
use crate::signing;
use crate::{bsdiff, manifest::Manifest};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

/// Lift an engine error into the CLI, labelling security failures
fn present(err: Error) -> anyhow::Error {
    if err.is_security() {
        anyhow::anyhow!("security failure: {err}")
    } else {
        anyhow::Error::new(err)
    }
}

/// `generate-keys`: write privateKey.pem / publicKey.pem into `out_dir`
pub fn cmd_generate_keys(out_dir: &Path) -> Result<()> {
    signing::generate_key_files(out_dir).map_err(present)?;
    println!(
        "wrote {} and {}",
        out_dir.join(signing::PRIVATE_KEY_FILE).display(),
        out_dir.join(signing::PUBLIC_KEY_FILE).display()
    );
    Ok(())
}

/// `create-update-package`: build and sign a delta package
pub fn cmd_create_update_package(
    old_dir: &Path,
    new_dir: &Path,
    output_dir: &Path,
    private_key: &Path,
    config: Option<&Path>,
) -> Result<()> {
    let key = signing::load_private_key(private_key).map_err(present)?;
    let config = ReleaseConfig::load_or_default(config).map_err(present)?;

    let result = PackageBuilder::new(old_dir, new_dir, output_dir)
        .with_config(config)
        .build(&key)
        .map_err(present)?;

    println!(
        "package: {} ({} file actions)",
        result.package_path.display(),
        result.manifest.files.len()
    );
    println!("manifest: {}", result.manifest_path.display());
    Ok(())
}

/// `sign`: rewrite a feed entry with a package hash and signature
pub fn cmd_sign(info: &Path, private_key: &Path, package: &Path) -> Result<()> {
    let key = signing::load_private_key(private_key).map_err(present)?;
    let entry = sign_entry_file(info, &key, package).map_err(present)?;
    println!(
        "signed {} (version {}, package {})",
        info.display(),
        entry.version_id,
        entry.package_file
    );
    Ok(())
}

/// `hash`: print a file's lowercase hex SHA-256
pub fn cmd_hash(file: &Path) -> Result<()> {
    let digest = hash_file(file).map_err(present)?;
    println!("{digest}");
    Ok(())
}

/// `create-patch`: direct codec access
pub fn cmd_create_patch(old: &Path, new: &Path, patch: &Path) -> Result<()> {
    let old_bytes = fs::read(old).with_context(|| format!("failed to read {}", old.display()))?;
    let new_bytes = fs::read(new).with_context(|| format!("failed to read {}", new.display()))?;

    let patch_bytes = bsdiff::create(&old_bytes, &new_bytes).map_err(present)?;
    fs::write(patch, &patch_bytes)
        .with_context(|| format!("failed to write {}", patch.display()))?;

    info!(
        "patch written: {} bytes for {} -> {} bytes",
        patch_bytes.len(),
        old_bytes.len(),
        new_bytes.len()
    );
    Ok(())
}

/// `apply-patch`: direct codec access
pub fn cmd_apply_patch(old: &Path, patch: &Path, new: &Path) -> Result<()> {
    let old_bytes = fs::read(old).with_context(|| format!("failed to read {}", old.display()))?;
    let patch_bytes =
        fs::read(patch).with_context(|| format!("failed to read {}", patch.display()))?;

    let new_bytes = bsdiff::apply(&old_bytes, &patch_bytes).map_err(present)?;
    fs::write(new, &new_bytes).with_context(|| format!("failed to write {}", new.display()))?;
    Ok(())
}

/// `apply`: apply an update package to an installation directory.
///
/// With a fallback URL, source drift escalates to a full-package
/// replacement fetched from that base URL, gated on console confirmation.
pub fn cmd_apply(
    package: &Path,
    target_dir: &Path,
    public_key: &Path,
    fallback_url: Option<&str>,
) -> Result<()> {
    let key = signing::load_public_key(public_key).map_err(present)?;
    let applier = Applier::new(key);

    let manifest = match fallback_url {
        Some(url) => {
            let fetcher = HttpFetcher::new().map_err(present)?;
            UpdateController::new(applier, Box::new(fetcher), url)
                .with_confirmation(Box::new(confirm_full_replacement))
                .update(package, target_dir)
                .map_err(present)?
        }
        None => applier.apply(package, target_dir).map_err(present)?,
    };

    print_summary(&manifest);
    if manifest.restart_required {
        println!("restart required");
    }
    Ok(())
}

/// Ask on the console before replacing the whole installation
fn confirm_full_replacement(manifest: &Manifest) -> bool {
    eprint!(
        "delta not applicable; replace installation with full package for version {} ({})? [y/N] ",
        manifest.version_id, manifest.version
    );
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

/// `verify`: validate signature and entry hashes without touching anything
pub fn cmd_verify(package: &Path, public_key: &Path) -> Result<()> {
    let key = signing::load_public_key(public_key).map_err(present)?;
    let manifest = Applier::new(key)
        .verify_package(package)
        .map_err(present)?;

    println!("package verified");
    print_summary(&manifest);
    Ok(())
}

fn print_summary(manifest: &Manifest) {
    println!(
        "version {} ({}) from version {}",
        manifest.version_id, manifest.version, manifest.from_version_id
    );
    if !manifest.release_name.is_empty() {
        println!("release: {}", manifest.release_name);
    }
    println!("{} file actions", manifest.files.len());
}
