//! Install lifecycle tests
//!
//! The release source is faked and the download cache pre-seeded, so the
//! full install pipeline (cache reuse, checksum gate, extraction, binary
//! placement, verify-by-running, record write, activation) runs without
//! touching the network. Binaries are shell scripts that print the version
//! line the real tools print.

#![cfg(unix)]

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wrk_fetch::Fetcher;
use wrk_platform::Platform;
use wrk_sources::ReleaseSource;
use wrk_tools::{InstallOptions, TfManager, ToolDescriptor, ToolManager};

/// A release source serving canned versions and stable fake URLs
struct FakeSource {
    versions: Vec<String>,
    archive_name: String,
    checksum_name: Option<String>,
}

#[async_trait]
impl ReleaseSource for FakeSource {
    async fn list_versions(&self, _include_prereleases: bool) -> wrk_sources::Result<Vec<String>> {
        Ok(self.versions.clone())
    }

    fn download_url(&self, _version: &str) -> String {
        format!("https://release-fixture.invalid/{}", self.archive_name)
    }

    fn checksum_url(&self, _version: &str) -> Option<String> {
        self.checksum_name
            .as_ref()
            .map(|name| format!("https://release-fixture.invalid/{}", name))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Write a tar.gz archive whose entries are executable scripts
fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(gz);
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        let name_bytes = name.as_bytes();
        header.as_old_mut().name[..name_bytes.len()].copy_from_slice(name_bytes);
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append(&header, content.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let opts = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
    for (name, content) in entries {
        writer.start_file(*name, opts).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

fn fake_uv_script(version: &str) -> String {
    format!("#!/bin/sh\necho \"uv {}\"\n", version)
}

struct Fixture {
    _root: tempfile::TempDir,
    install_root: PathBuf,
    cache_dir: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let install_root = root.path().join("tools");
        let cache_dir = root.path().join("cache");
        std::fs::create_dir_all(&install_root).unwrap();
        std::fs::create_dir_all(&cache_dir).unwrap();
        Self {
            _root: root,
            install_root,
            cache_dir,
        }
    }

    fn uv_manager(&self, checksum_name: Option<&str>) -> ToolManager {
        let source = FakeSource {
            versions: vec!["0.5.0".into(), "0.4.30".into()],
            archive_name: "uv-0.5.0.tar.gz".into(),
            checksum_name: checksum_name.map(|s| s.to_string()),
        };
        ToolManager::with_parts(
            ToolDescriptor::builtin("uv").unwrap(),
            Box::new(source),
            Arc::new(Fetcher::default()),
            Platform::current(),
            self.install_root.clone(),
            self.cache_dir.clone(),
            InstallOptions::default(),
        )
    }

    fn seed_uv_archive(&self) {
        write_tar_gz(
            &self.cache_dir.join("uv-0.5.0.tar.gz"),
            &[("uv-dist/uv", &fake_uv_script("0.5.0"))],
        );
    }
}

#[tokio::test]
async fn install_places_verifies_and_activates() {
    let fixture = Fixture::new();
    fixture.seed_uv_archive();
    let manager = fixture.uv_manager(None);

    manager.install("0.5.0", false).await.unwrap();

    let binary = fixture.install_root.join("uv/0.5.0/bin/uv");
    assert!(binary.is_file());
    assert!(manager.verify("0.5.0").await);
    assert_eq!(manager.installed_versions(), vec!["0.5.0"]);
    assert_eq!(manager.active_version().as_deref(), Some("0.5.0"));

    // Shim link points at the installed binary
    let shim = fixture.install_root.join("bin/uv");
    assert!(shim.exists());

    // Install record captures the provenance
    let record = manager.record("0.5.0").unwrap();
    assert_eq!(record.tool, "uv");
    assert_eq!(record.version, "0.5.0");
    assert_eq!(record.binary_path, binary);
    assert_eq!(record.binary_sha256.len(), 64);
}

#[tokio::test]
async fn install_is_idempotent() {
    let fixture = Fixture::new();
    fixture.seed_uv_archive();
    let manager = fixture.uv_manager(None);

    manager.install("0.5.0", false).await.unwrap();
    let record_before = manager.record("0.5.0").unwrap();

    // Second install short-circuits on the existing binary; the cache
    // archive is gone, so any download attempt would fail loudly.
    std::fs::remove_file(fixture.cache_dir.join("uv-0.5.0.tar.gz")).unwrap();
    manager.install("0.5.0", false).await.unwrap();

    assert_eq!(manager.record("0.5.0").unwrap(), record_before);
    assert_eq!(manager.installed_versions(), vec!["0.5.0"]);
}

#[tokio::test]
async fn dry_run_changes_nothing() {
    let fixture = Fixture::new();
    let manager = fixture.uv_manager(None);

    manager.install("0.5.0", true).await.unwrap();
    assert!(manager.installed_versions().is_empty());
    assert!(!fixture.install_root.join("uv").exists());
}

#[tokio::test]
async fn checksum_match_allows_install() {
    let fixture = Fixture::new();
    fixture.seed_uv_archive();

    let digest = wrk_fetch::sha256_file(&fixture.cache_dir.join("uv-0.5.0.tar.gz")).unwrap();
    std::fs::write(
        fixture.cache_dir.join("SHA256SUMS"),
        format!("{}  uv-0.5.0.tar.gz\n", digest),
    )
    .unwrap();

    let manager = fixture.uv_manager(Some("SHA256SUMS"));
    manager.install("0.5.0", false).await.unwrap();
    assert!(manager.verify("0.5.0").await);
}

#[tokio::test]
async fn checksum_mismatch_deletes_archive_and_leaves_nothing() {
    let fixture = Fixture::new();
    fixture.seed_uv_archive();
    std::fs::write(
        fixture.cache_dir.join("SHA256SUMS"),
        format!("{}  uv-0.5.0.tar.gz\n", "a".repeat(64)),
    )
    .unwrap();

    let manager = fixture.uv_manager(Some("SHA256SUMS"));
    let err = manager.install("0.5.0", false).await.unwrap_err();

    assert!(matches!(
        err,
        wrk_tools::Error::Fetch(wrk_fetch::Error::ChecksumMismatch { .. })
    ));
    // Archive removed, no binary, no version directory left behind
    assert!(!fixture.cache_dir.join("uv-0.5.0.tar.gz").exists());
    assert!(!fixture.install_root.join("uv/0.5.0").exists());
    assert!(manager.installed_versions().is_empty());
}

#[tokio::test]
async fn traversal_archive_aborts_install() {
    let fixture = Fixture::new();
    write_tar_gz(
        &fixture.cache_dir.join("uv-0.5.0.tar.gz"),
        &[("ok/uv", &fake_uv_script("0.5.0")), ("../evil.txt", "bad")],
    );

    let manager = fixture.uv_manager(None);
    let err = manager.install("0.5.0", false).await.unwrap_err();

    assert!(matches!(
        err,
        wrk_tools::Error::Archive(wrk_archive::Error::UnsafePath { .. })
    ));
    assert!(!fixture.install_root.join("uv/0.5.0").exists());
    // The scratch dir lives under the cache; an escaping entry would have
    // landed in the cache dir itself
    assert!(!fixture.cache_dir.join("evil.txt").exists());
}

#[tokio::test]
async fn verification_failure_cleans_version_dir() {
    let fixture = Fixture::new();
    // Archive ships a binary that reports the wrong version
    write_tar_gz(
        &fixture.cache_dir.join("uv-0.5.0.tar.gz"),
        &[("uv", &fake_uv_script("0.9.9"))],
    );

    let manager = fixture.uv_manager(None);
    let err = manager.install("0.5.0", false).await.unwrap_err();

    assert!(matches!(err, wrk_tools::Error::VerificationFailed { .. }));
    assert!(!fixture.install_root.join("uv/0.5.0").exists());
}

#[tokio::test]
async fn remove_clears_active_marker() {
    let fixture = Fixture::new();
    fixture.seed_uv_archive();
    let manager = fixture.uv_manager(None);

    manager.install("0.5.0", false).await.unwrap();
    assert_eq!(manager.active_version().as_deref(), Some("0.5.0"));

    manager.remove("0.5.0").unwrap();
    assert!(manager.installed_versions().is_empty());
    assert_eq!(manager.active_version(), None);
}

// tf-family lifecycle

fn fake_tofu_script(version: &str) -> String {
    format!("#!/bin/sh\necho \"OpenTofu v{}\"\n", version)
}

struct TfFixture {
    _root: tempfile::TempDir,
    versions_root: PathBuf,
    cache_dir: PathBuf,
    project_bin: PathBuf,
}

impl TfFixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let versions_root = root.path().join("terraform.versions");
        let cache_dir = root.path().join("cache");
        let project_bin = root.path().join("workenv/bin");
        std::fs::create_dir_all(&cache_dir).unwrap();
        Self {
            _root: root,
            versions_root,
            cache_dir,
            project_bin,
        }
    }

    fn tofu_manager(&self, version: &str) -> TfManager {
        write_zip(
            &self.cache_dir.join(format!("tofu_{}.zip", version)),
            &[("tofu", &fake_tofu_script(version))],
        );
        let source = FakeSource {
            versions: vec![version.to_string()],
            archive_name: format!("tofu_{}.zip", version),
            checksum_name: None,
        };
        TfManager::with_parts(
            ToolDescriptor::builtin("tofu").unwrap(),
            Box::new(source),
            Arc::new(Fetcher::default()),
            Platform::current(),
            self.versions_root.clone(),
            self.cache_dir.clone(),
            InstallOptions::default(),
            Some(self.project_bin.clone()),
        )
        .unwrap()
    }
}

#[tokio::test]
async fn tf_install_uses_flat_layout_and_ledger() {
    let fixture = TfFixture::new();
    let mut manager = fixture.tofu_manager("1.8.0");

    manager.install("1.8.0", false).await.unwrap();

    // Flat prefix_version file, tfswitch-compatible
    let flat = fixture.versions_root.join("opentofu_1.8.0");
    assert!(flat.is_file());
    assert!(manager.verify("1.8.0").await);
    assert_eq!(manager.installed_versions(), vec!["1.8.0"]);
    assert_eq!(manager.active_version().as_deref(), Some("1.8.0"));

    // Ledger record and RECENT entry exist
    assert!(manager.record("1.8.0").is_some());
    let recent = std::fs::read_to_string(fixture.versions_root.join("RECENT")).unwrap();
    assert!(recent.contains("opentofu"));
    assert!(recent.contains("1.8.0"));

    // Activation copied the binary into the project bin
    assert!(fixture.project_bin.join("tofu").is_file());
}

#[tokio::test]
async fn tf_switch_installs_then_activates() {
    let fixture = TfFixture::new();
    let mut manager = fixture.tofu_manager("1.8.0");

    manager.switch("1.8.0", false).await.unwrap();
    assert_eq!(manager.active_version().as_deref(), Some("1.8.0"));

    // Switching again with the binary present only re-activates
    manager.switch("1.8.0", false).await.unwrap();
    assert_eq!(manager.installed_versions(), vec!["1.8.0"]);
}

#[tokio::test]
async fn tf_global_activation_uses_canonical_name() {
    let fixture = TfFixture::new();
    let global_bin = fixture._root.path().join("local-bin");
    let mut manager = fixture
        .tofu_manager("1.8.0")
        .with_global_bin_dir(global_bin.clone());

    manager.install("1.8.0", false).await.unwrap();
    manager.set_global_version("1.8.0").unwrap();

    assert!(global_bin.join("tofu").is_file());
    assert_eq!(manager.global_version().as_deref(), Some("1.8.0"));
}

#[tokio::test]
async fn tf_remove_updates_ledger_and_recent() {
    let fixture = TfFixture::new();
    let mut manager = fixture.tofu_manager("1.8.0");

    manager.install("1.8.0", false).await.unwrap();
    manager.remove("1.8.0").unwrap();

    assert!(manager.installed_versions().is_empty());
    assert!(manager.record("1.8.0").is_none());
    assert_eq!(manager.active_version(), None);
}
