// src/lib.rs

//! Updraft - secure application self-update engine
//!
//! Delivers new application versions as cryptographically signed packages
//! of per-file operations (add, modify via bsdiff binary delta, remove) and
//! safely consumes them on client machines.
//!
//! # Architecture
//!
//! - Signed manifest: a canonical JSON encoding is the signed byte sequence
//! - Integrity chain: signature, then package entry hashes, then per-file
//!   source hashes, then per-file target hashes, before any visible write
//! - bsdiff-1 deltas: interoperable patches, bzip2-compressed streams
//! - Verify-then-commit applier: staged reconstruction, rename-based commit

pub mod apply;
pub mod archive;
pub mod bsdiff;
pub mod cancel;
pub mod commands;
pub mod config;
mod error;
pub mod fetch;
pub mod hash;
pub mod manifest;
pub mod package;
pub mod signing;

pub use apply::{Applier, UpdateController};
pub use cancel::CancelToken;
pub use config::ReleaseConfig;
pub use error::{Error, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use manifest::{ActionKind, FileAction, Manifest};
pub use package::{BuildResult, PackageBuilder, ReleaseEntry};
