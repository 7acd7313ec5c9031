// src/hash.rs

//! Streaming SHA-256 for file integrity
//!
//! Every hash in the update protocol is SHA-256, stored as a lowercase hex
//! string and compared case-insensitively. Files are streamed so large
//! payloads never have to fit in memory.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Length of a SHA-256 digest rendered as hex
pub const HEX_DIGEST_LEN: usize = 64;

/// Incremental SHA-256 hasher
pub struct Hasher {
    state: Sha256,
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            state: Sha256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    /// Finalize and render as lowercase hex
    pub fn finalize(self) -> String {
        format!("{:x}", self.state.finalize())
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a byte slice, returning lowercase hex
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Hash all data from a reader
pub fn hash_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Hasher::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Hash a file's contents, streaming
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
    hash_reader(&mut file).map_err(|e| Error::io(path, e))
}

/// Case-insensitive hex digest comparison; storage is lowercase, but
/// manifests produced by other tooling may carry uppercase digests.
pub fn digests_equal(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.chars().zip(b.chars()).all(|(x, y)| x.eq_ignore_ascii_case(&y))
}

/// Whether a string is a well-formed lowercase SHA-256 hex digest
pub fn is_hex_digest(s: &str) -> bool {
    s.len() == HEX_DIGEST_LEN
        && s.chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
