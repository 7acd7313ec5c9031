// tests/fallback.rs

//! Full-package recovery path: source drift escalates to a verified
//! full-archive replacement when the manifest carries one.

mod common;

use common::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use updraft::{Applier, Error, Fetcher, ReleaseConfig, Result, UpdateController};

/// Serves files out of a local directory, standing in for the release host.
struct DirFetcher {
    base_url: String,
    root: PathBuf,
}

impl Fetcher for DirFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let name = url
            .strip_prefix(&format!("{}/", self.base_url))
            .unwrap_or(url);
        let src = self.root.join(name);
        fs::copy(&src, dest).map_err(|e| Error::io(&src, e))?;
        Ok(())
    }
}

const BASE_URL: &str = "https://releases.example.com/app";

fn controller(fx: &Fixture, public: p256::ecdsa::VerifyingKey) -> UpdateController {
    let fetcher = DirFetcher {
        base_url: BASE_URL.to_string(),
        root: fx.out.clone(),
    };
    UpdateController::new(Applier::new(public), Box::new(fetcher), BASE_URL)
}

fn full_package_config(file: Option<&str>) -> ReleaseConfig {
    ReleaseConfig {
        version_id: 2,
        from_version_id: 1,
        version: "2.0".to_string(),
        include_full_package: true,
        full_package_file: file.map(str::to_string),
        restart_required: true,
        ..Default::default()
    }
}

fn drifted_setup(fx: &Fixture) {
    write_tree(&fx.old, &[("bin/app", b"version one"), ("conf/app.conf", b"cfg")]);
    write_tree(&fx.new, &[("bin/app", b"version two"), ("conf/app.conf", b"cfg")]);
    copy_tree(&fx.old, &fx.target);
    // local drift makes the delta unappliable
    fs::write(fx.target.join("bin/app"), b"patched by hand").unwrap();
}

#[test]
fn source_drift_recovers_via_full_tar_package() {
    let fx = fixture();
    drifted_setup(&fx);

    let (key, public) = keypair();
    let result = build_with(&fx, &key, full_package_config(None));
    assert_eq!(
        result.manifest.full_package_file.as_deref(),
        Some("full.tar.gz")
    );

    let manifest = controller(&fx, public)
        .update(&result.package_path, &fx.target)
        .unwrap();
    assert_eq!(manifest.version_id, 2);

    assert_eq!(
        fs::read(fx.target.join("bin/app")).unwrap(),
        b"version two"
    );
    assert_eq!(fs::read(fx.target.join("conf/app.conf")).unwrap(), b"cfg");
}

#[test]
fn source_drift_recovers_via_full_zip_package() {
    let fx = fixture();
    drifted_setup(&fx);

    let (key, public) = keypair();
    let result = build_with(&fx, &key, full_package_config(Some("full.zip")));
    assert_eq!(result.manifest.full_package_file.as_deref(), Some("full.zip"));

    controller(&fx, public)
        .update(&result.package_path, &fx.target)
        .unwrap();

    assert_eq!(
        fs::read(fx.target.join("bin/app")).unwrap(),
        b"version two"
    );
}

#[test]
fn clean_target_never_downloads_the_full_package() {
    let fx = fixture();
    write_tree(&fx.old, &[("bin/app", b"version one")]);
    write_tree(&fx.new, &[("bin/app", b"version two")]);
    copy_tree(&fx.old, &fx.target);

    let (key, public) = keypair();
    let result = build_with(&fx, &key, full_package_config(None));

    // delete the full archive: the delta path must not need it
    fs::remove_file(fx.out.join("full.tar.gz")).unwrap();

    controller(&fx, public)
        .update(&result.package_path, &fx.target)
        .unwrap();
    assert_eq!(
        fs::read(fx.target.join("bin/app")).unwrap(),
        b"version two"
    );
}

#[test]
fn drift_without_full_package_keeps_source_mismatch() {
    let fx = fixture();
    drifted_setup(&fx);

    let (key, public) = keypair();
    let result = build(&fx, &key);
    assert!(result.manifest.full_package_file.is_none());

    let err = controller(&fx, public)
        .update(&result.package_path, &fx.target)
        .unwrap_err();
    assert!(matches!(err, Error::SourceMismatch { .. }), "got {err}");
}

#[test]
fn declined_confirmation_cancels_the_fallback() {
    let fx = fixture();
    drifted_setup(&fx);

    let (key, public) = keypair();
    let result = build_with(&fx, &key, full_package_config(None));

    let asked = Arc::new(AtomicBool::new(false));
    let asked_in_callback = Arc::clone(&asked);

    let err = controller(&fx, public)
        .with_confirmation(Box::new(move |manifest| {
            asked_in_callback.store(true, Ordering::SeqCst);
            assert_eq!(manifest.version_id, 2);
            false
        }))
        .update(&result.package_path, &fx.target)
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled), "got {err}");
    assert!(asked.load(Ordering::SeqCst));
    // the drifted file is still in place
    assert_eq!(
        fs::read(fx.target.join("bin/app")).unwrap(),
        b"patched by hand"
    );
}

#[test]
fn corrupted_full_package_is_rejected() {
    let fx = fixture();
    drifted_setup(&fx);

    let (key, public) = keypair();
    let result = build_with(&fx, &key, full_package_config(None));

    // corrupt the hosted archive after signing
    let hosted = fx.out.join("full.tar.gz");
    let mut bytes = fs::read(&hosted).unwrap();
    bytes[0] ^= 0xff;
    fs::write(&hosted, bytes).unwrap();

    let err = controller(&fx, public)
        .update(&result.package_path, &fx.target)
        .unwrap_err();
    assert!(matches!(err, Error::PackageCorrupt(_)), "got {err}");
    assert!(err.is_security());
    assert_eq!(
        fs::read(fx.target.join("bin/app")).unwrap(),
        b"patched by hand"
    );
}
