// src/manifest/canonical.rs

//! Canonical manifest encoding
//!
//! The byte sequence that gets signed (and verified) is the manifest with
//! its `Signature` field cleared, serialised as JSON with the schema-declared
//! field order, 2-space indentation, LF line endings, UTF-8 without a BOM,
//! and absent optional fields omitted. The same value always yields
//! byte-identical output regardless of host line-ending conventions: nothing
//! here consults the platform.

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use super::Manifest;

/// Serialise any value in the canonical layout: field declaration order,
/// 2-space indent, LF only, no trailing newline.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(1024);
    let formatter = PrettyFormatter::with_indent(b"  ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| Error::MalformedManifest(format!("canonical encoding failed: {e}")))?;
    Ok(buf)
}

/// The signed byte sequence for a manifest: canonical layout with the
/// signature treated as absent.
pub fn canonical_bytes(manifest: &Manifest) -> Result<Vec<u8>> {
    let mut unsigned = manifest.clone();
    unsigned.signature = None;
    canonical_json(&unsigned)
}
