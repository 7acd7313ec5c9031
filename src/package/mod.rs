// src/package/mod.rs

//! Update package layout and release-side tooling
//!
//! A package is a ZIP with `meta.json` at the root, bsdiff patches under
//! `diffs/` and full new files under `add/`. Entries live flat inside those
//! directories: path separators in the target path are mangled to `_`, and
//! the mapping is recorded in the manifest, never recomputed client-side.

mod builder;
mod feed;

pub use builder::{BuildResult, PackageBuilder};
pub use feed::{sign_entry_file, ReleaseEntry};

/// Manifest entry name at the package root
pub const META_NAME: &str = "meta.json";

/// Directory for bsdiff patches
pub const DIFFS_DIR: &str = "diffs";

/// Directory for full new-file contents
pub const ADD_DIR: &str = "add";

/// Default package file name
pub const PACKAGE_NAME: &str = "update.pkg";

/// Flatten a target path into a package-internal name
pub fn mangle_path(path: &str) -> String {
    path.replace('/', "_")
}

/// Package entry name for a `modified` action's patch
pub fn patch_entry_name(path: &str) -> String {
    format!("{}/{}.patch", DIFFS_DIR, mangle_path(path))
}

/// Package entry name for an `added` action's content
pub fn add_entry_name(path: &str) -> String {
    format!("{}/{}", ADD_DIR, mangle_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mangling() {
        assert_eq!(mangle_path("bin/app"), "bin_app");
        assert_eq!(mangle_path("flat.txt"), "flat.txt");
        assert_eq!(patch_entry_name("lib/core.so"), "diffs/lib_core.so.patch");
        assert_eq!(add_entry_name("x/y.txt"), "add/x_y.txt");
    }
}
