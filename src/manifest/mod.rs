// src/manifest/mod.rs

//! Update manifest data model
//!
//! A manifest is the signed, versioned description of an update transition:
//! identity of the old and new versions, the ordered list of per-file
//! actions, optional recovery artifacts, and a detached signature over the
//! canonical encoding. Once signed, a manifest is frozen.

mod canonical;

pub use canonical::{canonical_bytes, canonical_json};

use crate::error::{Error, Result};
use crate::hash::is_hex_digest;
use crate::signing;
use p256::ecdsa::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

fn default_true() -> bool {
    true
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Per-file action kind; the tag of a [`FileAction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Added,
    Modified,
    Removed,
}

/// A single add/modify/remove instruction.
///
/// `path` is the target file location relative to the install root, always
/// forward-slash separated. Which optional fields must be present is
/// determined by `action`; [`FileAction::validate`] enforces the exact set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileAction {
    pub path: String,
    pub action: ActionKind,

    /// Package-relative path to the full new content (`added` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_file: Option<String>,

    /// Package-relative path to the bsdiff patch (`modified` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_file: Option<String>,

    /// Expected pre-image hash of the on-disk file (`modified` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,

    /// Expected post-image hash (`added` and `modified`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_hash: Option<String>,

    /// Hash of the referenced package entry's bytes (`added` and `modified`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_file_hash: Option<String>,

    /// Whether the file carries an executable mode bit (Unix)
    #[serde(default, skip_serializing_if = "is_false")]
    pub executable: bool,
}

impl FileAction {
    pub fn added(
        path: impl Into<String>,
        add_file: impl Into<String>,
        target_hash: impl Into<String>,
        package_file_hash: impl Into<String>,
        executable: bool,
    ) -> Self {
        Self {
            path: path.into(),
            action: ActionKind::Added,
            add_file: Some(add_file.into()),
            patch_file: None,
            source_hash: None,
            target_hash: Some(target_hash.into()),
            package_file_hash: Some(package_file_hash.into()),
            executable,
        }
    }

    pub fn modified(
        path: impl Into<String>,
        patch_file: impl Into<String>,
        source_hash: impl Into<String>,
        target_hash: impl Into<String>,
        package_file_hash: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            action: ActionKind::Modified,
            add_file: None,
            patch_file: Some(patch_file.into()),
            source_hash: Some(source_hash.into()),
            target_hash: Some(target_hash.into()),
            package_file_hash: Some(package_file_hash.into()),
            executable: false,
        }
    }

    pub fn removed(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: ActionKind::Removed,
            add_file: None,
            patch_file: None,
            source_hash: None,
            target_hash: None,
            package_file_hash: None,
            executable: false,
        }
    }

    /// Check the variant-specific field set and hash formats
    pub fn validate(&self) -> Result<()> {
        if !is_safe_relative_path(&self.path) {
            return Err(Error::MalformedManifest(format!(
                "unsafe file path: {}",
                self.path
            )));
        }

        fn require<'a>(field: &'a Option<String>, name: &str, path: &str) -> Result<&'a str> {
            field
                .as_deref()
                .ok_or_else(|| Error::MalformedManifest(format!("{}: missing {name}", path)))
        }
        let forbid = |field: &Option<String>, name: &str| -> Result<()> {
            if field.is_some() {
                return Err(Error::MalformedManifest(format!(
                    "{}: unexpected {name} for {:?} action",
                    self.path, self.action
                )));
            }
            Ok(())
        };
        let check_hash = |value: &str, name: &str| -> Result<()> {
            if !is_hex_digest(value) {
                return Err(Error::MalformedManifest(format!(
                    "{}: {name} is not a 64-char lowercase hex digest",
                    self.path
                )));
            }
            Ok(())
        };

        match self.action {
            ActionKind::Added => {
                require(&self.add_file, "AddFile", &self.path)?;
                check_hash(require(&self.target_hash, "TargetHash", &self.path)?, "TargetHash")?;
                check_hash(
                    require(&self.package_file_hash, "PackageFileHash", &self.path)?,
                    "PackageFileHash",
                )?;
                forbid(&self.patch_file, "PatchFile")?;
                forbid(&self.source_hash, "SourceHash")?;
            }
            ActionKind::Modified => {
                require(&self.patch_file, "PatchFile", &self.path)?;
                check_hash(require(&self.source_hash, "SourceHash", &self.path)?, "SourceHash")?;
                check_hash(require(&self.target_hash, "TargetHash", &self.path)?, "TargetHash")?;
                check_hash(
                    require(&self.package_file_hash, "PackageFileHash", &self.path)?,
                    "PackageFileHash",
                )?;
                forbid(&self.add_file, "AddFile")?;
            }
            ActionKind::Removed => {
                forbid(&self.add_file, "AddFile")?;
                forbid(&self.patch_file, "PatchFile")?;
                forbid(&self.source_hash, "SourceHash")?;
                forbid(&self.target_hash, "TargetHash")?;
                forbid(&self.package_file_hash, "PackageFileHash")?;
            }
        }

        Ok(())
    }
}

/// Signed, versioned description of an update transition.
///
/// Field declaration order here is the canonical JSON field order; do not
/// reorder fields without revving the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    /// Monotonically increasing integer identity of the new version
    pub version_id: u64,
    /// Human-readable version label
    pub version: String,
    /// Identity of the prior version this package upgrades from (0 if n/a)
    #[serde(default)]
    pub from_version_id: u64,
    #[serde(default)]
    pub release_name: String,
    /// Ordered changelog lines
    #[serde(default)]
    pub changes: Vec<String>,
    /// Ordered per-file actions, lexicographic by path
    #[serde(default)]
    pub files: Vec<FileAction>,
    #[serde(default = "default_true")]
    pub restart_required: bool,
    #[serde(default)]
    pub critical: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_installer_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_installer_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_installer_arguments: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_package_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_package_hash: Option<String>,

    /// Detached base64 ECDSA signature over the canonical encoding with
    /// this field cleared. Always last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Manifest {
    /// Parse and structurally validate manifest JSON
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes)
            .map_err(|e| Error::MalformedManifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load a manifest from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&bytes)
    }

    /// Structural validation: version ordering, unique safe paths,
    /// per-variant field sets, companion hashes.
    pub fn validate(&self) -> Result<()> {
        if self.version_id <= self.from_version_id {
            return Err(Error::MalformedManifest(format!(
                "VersionId {} must be greater than FromVersionId {}",
                self.version_id, self.from_version_id
            )));
        }

        let mut seen = HashSet::new();
        for action in &self.files {
            action.validate()?;
            if !seen.insert(action.path.as_str()) {
                return Err(Error::MalformedManifest(format!(
                    "duplicate file path: {}",
                    action.path
                )));
            }
        }

        let companion = |file: &Option<String>, hash: &Option<String>, name: &str| -> Result<()> {
            if file.is_some() {
                match hash.as_deref() {
                    Some(h) if is_hex_digest(h) => Ok(()),
                    Some(_) => Err(Error::MalformedManifest(format!(
                        "{name}Hash is not a 64-char lowercase hex digest"
                    ))),
                    None => Err(Error::MalformedManifest(format!(
                        "{name}File present without {name}Hash"
                    ))),
                }
            } else {
                Ok(())
            }
        };
        companion(
            &self.full_package_file,
            &self.full_package_hash,
            "FullPackage",
        )?;
        companion(
            &self.fallback_installer_file,
            &self.fallback_installer_hash,
            "FallbackInstaller",
        )?;

        Ok(())
    }

    /// Sign the manifest, replacing any previous signature
    pub fn sign(&mut self, key: &SigningKey) -> Result<()> {
        let bytes = canonical_bytes(self)?;
        self.signature = Some(signing::sign(key, &bytes));
        Ok(())
    }

    /// Verify the detached signature against the canonical encoding.
    ///
    /// An absent signature is as invalid as a wrong one.
    pub fn verify_signature(&self, key: &VerifyingKey) -> Result<()> {
        let signature = self.signature.as_deref().ok_or(Error::SignatureInvalid)?;
        let bytes = canonical_bytes(self)?;
        if signing::verify(key, &bytes, signature) {
            Ok(())
        } else {
            Err(Error::SignatureInvalid)
        }
    }

    /// Render the manifest (signature included) in the same deterministic
    /// layout the canonical encoder uses; this is what `meta.json` holds.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        canonical_json(self)
    }
}

/// Whether a manifest path is a safe forward-slash relative path: no empty
/// segments, no `.`/`..`, no leading slash, no drive letters, no
/// backslashes, no NUL.
pub fn is_safe_relative_path(path: &str) -> bool {
    if path.is_empty() || path.contains('\\') || path.contains('\0') {
        return false;
    }
    if path.starts_with('/') {
        return false;
    }
    // Windows drive letter ("C:...") or any other scheme-like prefix
    if path.contains(':') {
        return false;
    }
    path.split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;

    fn sample_manifest() -> Manifest {
        Manifest {
            version_id: 5,
            version: "1.2.0".to_string(),
            from_version_id: 4,
            release_name: "Spring release".to_string(),
            changes: vec!["Faster startup".to_string()],
            files: vec![
                FileAction::added(
                    "bin/newtool",
                    "add/bin_newtool",
                    hash_bytes(b"newtool"),
                    hash_bytes(b"newtool"),
                    true,
                ),
                FileAction::modified(
                    "lib/core.so",
                    "diffs/lib_core.so.patch",
                    hash_bytes(b"old"),
                    hash_bytes(b"new"),
                    hash_bytes(b"patch"),
                ),
                FileAction::removed("tmp/stale"),
            ],
            restart_required: true,
            critical: false,
            fallback_installer_file: None,
            fallback_installer_hash: None,
            fallback_installer_arguments: None,
            full_package_file: None,
            full_package_hash: None,
            signature: None,
        }
    }

    #[test]
    fn test_valid_manifest_passes() {
        sample_manifest().validate().unwrap();
    }

    #[test]
    fn test_version_ordering_enforced() {
        let mut manifest = sample_manifest();
        manifest.from_version_id = 5;
        assert!(matches!(
            manifest.validate(),
            Err(Error::MalformedManifest(_))
        ));
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let mut manifest = sample_manifest();
        manifest.files.push(FileAction::removed("tmp/stale"));
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_unsafe_paths_rejected() {
        for bad in [
            "../escape",
            "a/../../b",
            "/absolute",
            "C:/windows",
            "a//b",
            "a/./b",
            "back\\slash",
            "",
        ] {
            assert!(!is_safe_relative_path(bad), "should reject: {bad:?}");

            let mut manifest = sample_manifest();
            manifest.files = vec![FileAction::removed(bad)];
            assert!(
                matches!(manifest.validate(), Err(Error::MalformedManifest(_))),
                "validate should reject: {bad:?}"
            );
        }

        for good in ["a.txt", "x/y.txt", "deep/nested/dir/file"] {
            assert!(is_safe_relative_path(good), "should accept: {good:?}");
        }
    }

    #[test]
    fn test_variant_field_sets_enforced() {
        // modified without a source hash
        let mut manifest = sample_manifest();
        manifest.files[1].source_hash = None;
        assert!(manifest.validate().is_err());

        // removed carrying a patch file
        let mut manifest = sample_manifest();
        manifest.files[2].patch_file = Some("diffs/x.patch".to_string());
        assert!(manifest.validate().is_err());

        // added carrying a source hash
        let mut manifest = sample_manifest();
        manifest.files[0].source_hash = Some(hash_bytes(b"x"));
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_hash_format_enforced() {
        let mut manifest = sample_manifest();
        manifest.files[0].target_hash = Some("ABCD".to_string());
        assert!(manifest.validate().is_err());

        // uppercase hex is rejected in storage
        let mut manifest = sample_manifest();
        manifest.files[1].source_hash = Some(hash_bytes(b"old").to_uppercase());
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_companion_hash_required() {
        let mut manifest = sample_manifest();
        manifest.full_package_file = Some("full.tar.gz".to_string());
        assert!(manifest.validate().is_err());

        manifest.full_package_hash = Some(hash_bytes(b"full"));
        manifest.validate().unwrap();

        let mut manifest = sample_manifest();
        manifest.fallback_installer_file = Some("setup.exe".to_string());
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_parse_rejects_bad_json() {
        assert!(matches!(
            Manifest::parse(b"{ not json"),
            Err(Error::MalformedManifest(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let manifest = sample_manifest();
        let json = manifest.to_json().unwrap();
        let parsed = Manifest::parse(&json).unwrap();
        assert_eq!(manifest, parsed);
    }

    #[test]
    fn test_sign_and_verify() {
        let key = crate::signing::generate_signing_key();
        let public = p256::ecdsa::VerifyingKey::from(&key);

        let mut manifest = sample_manifest();
        manifest.sign(&key).unwrap();
        manifest.verify_signature(&public).unwrap();

        // unsigned manifest does not verify
        let unsigned = sample_manifest();
        assert!(matches!(
            unsigned.verify_signature(&public),
            Err(Error::SignatureInvalid)
        ));
    }

    #[test]
    fn test_tampering_any_signed_field_breaks_signature() {
        let key = crate::signing::generate_signing_key();
        let public = p256::ecdsa::VerifyingKey::from(&key);

        let mut manifest = sample_manifest();
        manifest.sign(&key).unwrap();

        let mut tampered = manifest.clone();
        tampered.version_id += 1;
        assert!(tampered.verify_signature(&public).is_err());

        let mut tampered = manifest.clone();
        tampered.files[0].target_hash = Some(hash_bytes(b"evil"));
        assert!(tampered.verify_signature(&public).is_err());

        let mut tampered = manifest.clone();
        tampered.critical = true;
        assert!(tampered.verify_signature(&public).is_err());
    }
}
