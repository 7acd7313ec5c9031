// src/error.rs

//! Error taxonomy for the update engine
//!
//! Every failure surfaces to the caller unchanged; the engine performs no
//! automatic retries. `SourceMismatch` is the one kind an outer controller
//! may react to by escalating to the fallback full-package path.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Update engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying file or network failure, with the offending path
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest JSON does not parse, or a required field is missing/invalid
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    /// Canonical manifest bytes do not verify against the trusted key
    #[error("manifest signature verification failed")]
    SignatureInvalid,

    /// A referenced package entry is missing or its bytes do not match the
    /// manifest's PackageFileHash
    #[error("package corrupt: {0}")]
    PackageCorrupt(String),

    /// An on-disk pre-image does not match a modified action's SourceHash
    #[error("source file mismatch on {path}: expected {expected}, got {actual}")]
    SourceMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// A reconstructed file does not match its TargetHash
    #[error("reconstructed file mismatch on {path}: expected {expected}, got {actual}")]
    TargetMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// bsdiff header or stream invalid
    #[error("malformed patch: {0}")]
    MalformedPatch(String),

    /// PEM parses but is not a P-256 key, or the PEM itself is unusable
    #[error("unsupported key material: {0}")]
    UnsupportedKey(String),

    /// Caller-initiated cancellation
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Attach a path to an I/O error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Security-class errors must be presented to the user as security
    /// failures, never as generic I/O problems.
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            Self::SignatureInvalid
                | Self::PackageCorrupt(_)
                | Self::TargetMismatch { .. }
                | Self::UnsupportedKey(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_classification() {
        assert!(Error::SignatureInvalid.is_security());
        assert!(Error::PackageCorrupt("x".into()).is_security());
        assert!(Error::UnsupportedKey("x".into()).is_security());
        assert!(Error::TargetMismatch {
            path: "a".into(),
            expected: "b".into(),
            actual: "c".into(),
        }
        .is_security());

        assert!(!Error::Cancelled.is_security());
        assert!(!Error::MalformedManifest("x".into()).is_security());
        assert!(!Error::SourceMismatch {
            path: "a".into(),
            expected: "b".into(),
            actual: "c".into(),
        }
        .is_security());
    }

    #[test]
    fn test_io_carries_path() {
        let err = Error::io(
            "/tmp/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/missing"));
    }
}
