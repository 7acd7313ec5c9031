// tests/common/mod.rs

//! Shared fixtures for the end-to-end update scenarios.

#![allow(dead_code)]

use p256::ecdsa::{SigningKey, VerifyingKey};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use updraft::{BuildResult, PackageBuilder, ReleaseConfig};

/// A release-side and client-side directory layout for one scenario.
///
/// Keep the `TempDir` alive for the duration of the test.
pub struct Fixture {
    pub dir: TempDir,
    pub old: PathBuf,
    pub new: PathBuf,
    pub out: PathBuf,
    pub target: PathBuf,
}

pub fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("old");
    let new = dir.path().join("new");
    let out = dir.path().join("out");
    let target = dir.path().join("target");
    for p in [&old, &new, &target] {
        fs::create_dir_all(p).unwrap();
    }
    Fixture {
        dir,
        old,
        new,
        out,
        target,
    }
}

pub fn keypair() -> (SigningKey, VerifyingKey) {
    let signing = updraft::signing::generate_signing_key();
    let verifying = VerifyingKey::from(&signing);
    (signing, verifying)
}

pub fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (rel, contents) in files {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
}

/// Copy a tree file-by-file (the client's installation starts as a copy of
/// the old release tree).
pub fn copy_tree(src: &Path, dst: &Path) {
    for entry in walk_files(src) {
        let rel = entry.strip_prefix(src).unwrap();
        let dest = dst.join(rel);
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::copy(&entry, &dest).unwrap();
    }
}

/// Snapshot a tree as relative-path -> contents, for bitwise comparisons.
pub fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    walk_files(root)
        .into_iter()
        .map(|path| {
            let rel = path
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            (rel, fs::read(&path).unwrap())
        })
        .collect()
}

fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

pub fn build(fx: &Fixture, key: &SigningKey) -> BuildResult {
    build_with(fx, key, ReleaseConfig::load_or_default(None).unwrap())
}

pub fn build_with(fx: &Fixture, key: &SigningKey, config: ReleaseConfig) -> BuildResult {
    PackageBuilder::new(&fx.old, &fx.new, &fx.out)
        .with_config(config)
        .build(key)
        .unwrap()
}

/// Deterministic pseudo-random bytes for binary payloads
pub fn pseudo_random_bytes(len: usize, mut seed: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        out.push(seed as u8);
    }
    out
}
