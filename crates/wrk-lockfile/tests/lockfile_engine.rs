//! Lockfile engine behaviour against a canned catalog

use async_trait::async_trait;
use std::collections::BTreeMap;
use wrk_config::{ToolSpec, WrkConfig};
use wrk_lockfile::{CatalogProvider, Lockfile, LockfileEngine, LOCKFILE_NAME};

/// Catalog answering from fixed version lists
struct FixedCatalog {
    versions: BTreeMap<String, Vec<String>>,
    failing: Vec<String>,
}

impl FixedCatalog {
    fn new() -> Self {
        let mut versions = BTreeMap::new();
        versions.insert(
            "go".to_string(),
            vec!["1.22.5".into(), "1.22.4".into(), "1.21.9".into()],
        );
        versions.insert("uv".to_string(), vec!["0.5.0".into(), "0.4.30".into()]);
        Self {
            versions,
            failing: Vec::new(),
        }
    }

    fn with_failing(mut self, tool: &str) -> Self {
        self.failing.push(tool.to_string());
        self
    }
}

#[async_trait]
impl CatalogProvider for FixedCatalog {
    async fn available_versions(
        &self,
        tool: &str,
        _include_prereleases: bool,
    ) -> Result<Vec<String>, String> {
        if self.failing.iter().any(|t| t == tool) {
            return Err(format!("catalog unavailable for {}", tool));
        }
        self.versions
            .get(tool)
            .cloned()
            .ok_or_else(|| format!("unknown tool {}", tool))
    }
}

fn config_with(tools: &[(&str, ToolSpec)]) -> WrkConfig {
    let mut config = WrkConfig {
        project_name: "demo".into(),
        ..Default::default()
    };
    for (tool, spec) in tools {
        config.tools.insert(tool.to_string(), spec.clone());
    }
    config
}

#[test]
fn load_missing_and_corrupt_yield_none() {
    let dir = tempfile::tempdir().unwrap();
    let engine = LockfileEngine::new(dir.path());

    assert!(engine.load().is_none());

    std::fs::write(dir.path().join(LOCKFILE_NAME), "not json").unwrap();
    assert!(engine.load().is_none());
}

#[test]
fn save_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let engine = LockfileEngine::new(dir.path());
    let config = config_with(&[("uv", ToolSpec::Version("0.5.*".into()))]);

    let mut lockfile = engine.generate(&config);
    lockfile.add_resolved_tool("uv", "0.5.0", "0.5.*");
    engine.save(&lockfile).unwrap();

    let loaded = engine.load().unwrap();
    assert_eq!(loaded, lockfile);
    assert!(engine.is_valid(&config));
    assert_eq!(
        engine.locked_versions(),
        BTreeMap::from([("uv".to_string(), "0.5.0".to_string())])
    );
}

#[test]
fn changed_constraint_invalidates() {
    let dir = tempfile::tempdir().unwrap();
    let engine = LockfileEngine::new(dir.path());

    let config_a = config_with(&[("go", ToolSpec::Matrix(vec!["1.22.*".into(), "1.21.*".into()]))]);
    engine.save(&engine.generate(&config_a)).unwrap();
    assert!(engine.is_valid(&config_a));

    // Collapse the matrix to a scalar; the fingerprint slice changes
    let config_b = config_with(&[("go", ToolSpec::Version("1.22.*".into()))]);
    assert!(!engine.is_valid(&config_b));
}

#[tokio::test]
async fn resolve_and_lock_scalar_and_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let engine = LockfileEngine::new(dir.path());
    let config = config_with(&[
        ("uv", ToolSpec::Version("0.5.*".into())),
        ("go", ToolSpec::Matrix(vec!["1.22.*".into(), "1.21.*".into()])),
    ]);

    let lockfile = engine.resolve_and_lock(&config, &FixedCatalog::new()).await.unwrap();

    // Scalar entry keys by tool id
    let uv = &lockfile.resolved_tools["uv"];
    assert_eq!(uv.name, "uv");
    assert_eq!(uv.version, "0.5.0");
    assert_eq!(uv.resolved_from, "0.5.*");

    // Matrix entries key by tool@version, each remembering its constraint
    let go_a = &lockfile.resolved_tools["go@1.22.5"];
    assert_eq!(go_a.version, "1.22.5");
    assert_eq!(go_a.resolved_from, "1.22.*");
    let go_b = &lockfile.resolved_tools["go@1.21.9"];
    assert_eq!(go_b.version, "1.21.9");
    assert_eq!(go_b.resolved_from, "1.21.*");

    // The lockfile was persisted
    assert!(dir.path().join(LOCKFILE_NAME).exists());
    assert!(engine.is_valid(&config));
}

#[tokio::test]
async fn resolve_and_lock_skips_failing_tools() {
    let dir = tempfile::tempdir().unwrap();
    let engine = LockfileEngine::new(dir.path());
    let config = config_with(&[
        ("uv", ToolSpec::Version("0.5.*".into())),
        ("go", ToolSpec::Version("1.22.*".into())),
    ]);

    let lockfile = engine
        .resolve_and_lock(&config, &FixedCatalog::new().with_failing("go"))
        .await
        .unwrap();

    assert!(lockfile.resolved_tools.contains_key("uv"));
    assert!(!lockfile.resolved_tools.contains_key("go"));
}

#[tokio::test]
async fn resolve_and_lock_overwrites_stale_lockfile() {
    let dir = tempfile::tempdir().unwrap();
    let engine = LockfileEngine::new(dir.path());

    let old_config = config_with(&[("uv", ToolSpec::Version("0.4.*".into()))]);
    engine.save(&engine.generate(&old_config)).unwrap();

    let new_config = config_with(&[("uv", ToolSpec::Version("0.5.*".into()))]);
    assert!(!engine.is_valid(&new_config));

    let lockfile = engine
        .resolve_and_lock(&new_config, &FixedCatalog::new())
        .await
        .unwrap();
    assert_eq!(lockfile.resolved_version("uv"), Some("0.5.0"));
    assert!(engine.is_valid(&new_config));
}

#[test]
fn clean_removes_lockfile() {
    let dir = tempfile::tempdir().unwrap();
    let engine = LockfileEngine::new(dir.path());
    let config = config_with(&[]);

    engine.save(&engine.generate(&config)).unwrap();
    assert!(dir.path().join(LOCKFILE_NAME).exists());

    engine.clean().unwrap();
    assert!(!dir.path().join(LOCKFILE_NAME).exists());
    assert!(engine.load().is_none());
}

#[tokio::test]
async fn sync_skips_matrix_entries() {
    let dir = tempfile::tempdir().unwrap();
    let engine = LockfileEngine::new(dir.path());
    let config = config_with(&[]);

    let mut lockfile = Lockfile::from_config(&config);
    lockfile.add_matrix_entry("go", "1.22.5", "1.22.*");
    lockfile.add_matrix_entry("go", "1.21.9", "1.21.*");

    let report = engine.sync_from_lock(&lockfile, &config).await.unwrap();
    assert_eq!(report.skipped_matrix, 2);
    assert_eq!(report.installed, 0);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn sync_counts_per_tool_failures_without_aborting() {
    let dir = tempfile::tempdir().unwrap();
    let engine = LockfileEngine::new(dir.path());

    // Point install roots into the sandbox; the unknown tool fails while
    // the rest of the run continues
    let mut config = config_with(&[]);
    config.install_dir = dir.path().join("tools").display().to_string();
    config.cache_dir = dir.path().join("cache").display().to_string();

    let mut lockfile = Lockfile::from_config(&config);
    lockfile.add_resolved_tool("not-a-tool", "1.0.0", "1.0.0");

    let report = engine.sync_from_lock(&lockfile, &config).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.installed, 0);
}
