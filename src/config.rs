// src/config.rs

//! Release configuration for the package builder
//!
//! The optional JSON file passed to `create-update-package` supplies the
//! release identity and advisory flags that end up in the manifest. A
//! missing file means defaults: callers building ad-hoc packages (tests,
//! one-off patches) should not need to write a config first.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_true() -> bool {
    true
}

/// Builder-side release description, mirroring the manifest's informational
/// fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ReleaseConfig {
    pub version_id: u64,
    pub version: String,
    pub from_version_id: u64,
    pub release_name: String,
    pub changes: Vec<String>,
    #[serde(default = "default_true")]
    pub restart_required: bool,
    pub critical: bool,

    pub fallback_installer_file: Option<String>,
    pub fallback_installer_hash: Option<String>,
    pub fallback_installer_arguments: Option<String>,

    /// When true the builder also emits a deterministic full archive of the
    /// new tree and records it in the manifest for the recovery path.
    pub include_full_package: bool,
    /// File name for the full archive (default "full.tar.gz")
    pub full_package_file: Option<String>,
}

impl ReleaseConfig {
    /// Load a config file, or defaults when no path is given
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::new_default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::MalformedManifest(format!("bad release config: {e}")))
    }

    fn new_default() -> Self {
        Self {
            version_id: 1,
            restart_required: true,
            ..Default::default()
        }
    }

    /// Name of the full archive to emit when `include_full_package` is set
    pub fn full_package_name(&self) -> &str {
        self.full_package_file.as_deref().unwrap_or("full.tar.gz")
    }
}
