// src/apply/fallback.rs

//! Full-package fallback path
//!
//! When the delta cannot be applied because the installation has drifted
//! from the expected pre-images, the controller may recover by downloading
//! the full-install archive named in the trusted manifest, verifying its
//! hash, asking the user, and replacing the installation. The integrity
//! chain is the same as the delta path (manifest signature, then archive
//! hash); only reconstruction differs.

use crate::archive::{extract_zip, unpack_tar};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::hash::{digests_equal, hash_file};
use crate::manifest::Manifest;
use std::path::Path;
use tracing::{info, warn};

use super::Applier;

/// Caller-supplied confirmation hook, asked before the installation is
/// replaced wholesale.
pub type ConfirmCallback = Box<dyn Fn(&Manifest) -> bool + Send + Sync>;

/// Outer apply controller: delta first, full package on source drift.
pub struct UpdateController {
    applier: Applier,
    fetcher: Box<dyn Fetcher>,
    base_url: String,
    confirm: ConfirmCallback,
    cancel: CancelToken,
}

impl UpdateController {
    pub fn new(applier: Applier, fetcher: Box<dyn Fetcher>, base_url: impl Into<String>) -> Self {
        Self {
            applier,
            fetcher,
            base_url: base_url.into(),
            confirm: Box::new(|_| true),
            cancel: CancelToken::new(),
        }
    }

    /// Install a confirmation callback consulted before a full-package
    /// replacement. Declining aborts the fallback as `Cancelled`.
    pub fn with_confirmation(mut self, confirm: ConfirmCallback) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Apply the delta package; on source drift, escalate to the full
    /// package if the trusted manifest carries one.
    pub fn update(&self, package: &Path, target_dir: &Path) -> Result<Manifest> {
        match self.applier.apply(package, target_dir) {
            Ok(manifest) => Ok(manifest),
            Err(original @ Error::SourceMismatch { .. }) => {
                warn!("delta not applicable: {original}");

                // Re-establish trust in the manifest before acting on its
                // recovery fields; nothing from the failed run is reused.
                let manifest = self.applier.verify_package(package)?;
                if manifest.full_package_file.is_none() || manifest.full_package_hash.is_none() {
                    return Err(original);
                }

                self.install_full_package(&manifest, target_dir)?;
                Ok(manifest)
            }
            Err(e) => Err(e),
        }
    }

    fn install_full_package(&self, manifest: &Manifest, target_dir: &Path) -> Result<()> {
        let file = manifest
            .full_package_file
            .as_deref()
            .ok_or_else(|| Error::MalformedManifest("no FullPackageFile".to_string()))?;
        let expected = manifest
            .full_package_hash
            .as_deref()
            .ok_or_else(|| Error::MalformedManifest("no FullPackageHash".to_string()))?;

        self.cancel.check()?;

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), file);
        info!("fetching full package: {url}");

        let workdir = tempfile::tempdir().map_err(|e| Error::io("tempdir", e))?;
        let archive = workdir.path().join("full-package");
        self.fetcher.fetch(&url, &archive)?;

        self.cancel.check()?;

        let actual = hash_file(&archive)?;
        if !digests_equal(&actual, expected) {
            return Err(Error::PackageCorrupt(format!(
                "full package hashes to {actual}, manifest says {expected}"
            )));
        }

        if !(self.confirm)(manifest) {
            info!("full-package replacement declined");
            return Err(Error::Cancelled);
        }

        if file.ends_with(".zip") {
            extract_zip(&archive, target_dir)?;
        } else {
            unpack_tar(&archive, target_dir)?;
        }

        info!("full package installed over {}", target_dir.display());
        Ok(())
    }
}
