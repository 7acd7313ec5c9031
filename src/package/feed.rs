// src/package/feed.rs

//! Release-feed entries
//!
//! An update feed is a small JSON record per release: version identity, the
//! package file it points at, the package's hash, and a detached signature
//! so clients can authenticate the download before ever opening it. The
//! `sign` CLI subcommand rewrites such a record in place after the package
//! is built.

use crate::error::{Error, Result};
use crate::hash::hash_file;
use crate::manifest::canonical_json;
use crate::signing;
use chrono::{DateTime, Utc};
use p256::ecdsa::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// One release in an update feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReleaseEntry {
    pub version_id: u64,
    #[serde(default)]
    pub version: String,
    /// Package file name or URL the client should fetch
    #[serde(default)]
    pub package_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ReleaseEntry {
    /// The signed byte sequence: the entry with its signature cleared, in
    /// the same canonical layout the manifest uses.
    fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        canonical_json(&unsigned)
    }

    pub fn sign(&mut self, key: &SigningKey) -> Result<()> {
        let bytes = self.canonical_bytes()?;
        self.signature = Some(signing::sign(key, &bytes));
        Ok(())
    }

    pub fn verify_signature(&self, key: &VerifyingKey) -> Result<()> {
        let signature = self.signature.as_deref().ok_or(Error::SignatureInvalid)?;
        if signing::verify(key, &self.canonical_bytes()?, signature) {
            Ok(())
        } else {
            Err(Error::SignatureInvalid)
        }
    }
}

/// Rewrite a feed entry file with the package's hash, publish date, and a
/// fresh signature. Returns the signed entry.
pub fn sign_entry_file(
    entry_path: &Path,
    key: &SigningKey,
    package_path: &Path,
) -> Result<ReleaseEntry> {
    let bytes = fs::read(entry_path).map_err(|e| Error::io(entry_path, e))?;
    let mut entry: ReleaseEntry = serde_json::from_slice(&bytes)
        .map_err(|e| Error::MalformedManifest(format!("bad feed entry: {e}")))?;

    entry.package_hash = Some(hash_file(package_path)?);
    if entry.package_file.is_empty() {
        entry.package_file = package_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    entry.publish_date = Some(Utc::now());
    entry.sign(key)?;

    let out = canonical_json(&entry)?;
    fs::write(entry_path, out).map_err(|e| Error::io(entry_path, e))?;

    info!(
        "signed feed entry {} for package {}",
        entry_path.display(),
        package_path.display()
    );
    Ok(entry)
}
