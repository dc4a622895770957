//! tf-family metadata ledger and RECENT file
//!
//! The flat `<prefix>_<version>` layout shares one `metadata.json` across
//! every tf-family tool: per-version install records, per-profile active
//! versions, and global activations. A `RECENT` file keeps the last five
//! versions per tool for quick switching.
//!
//! The ledger is schema-versioned. Legacy ledgers carried top-level
//! `active_tofu` / `active_terraform` keys; those migrate one-shot into
//! `workenv.default.<tool>_version` on load, followed by a single save.

use crate::descriptor::tool_version_key;
use crate::error::{Error, Result};
use crate::record::InstalledVersionRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Ledger filename inside the tf versions root
pub const LEDGER_FILE: &str = "metadata.json";

/// RECENT filename inside the tf versions root
pub const RECENT_FILE: &str = "RECENT";

/// Versions kept per tool in the RECENT file
pub const RECENT_LIMIT: usize = 5;

/// Current ledger schema version
pub const SCHEMA_VERSION: u32 = 2;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// The `workenv` section: one map per profile plus the sticky profile name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkenvSection {
    #[serde(rename = "_current_profile", default, skip_serializing_if = "Option::is_none")]
    pub current_profile: Option<String>,
    #[serde(flatten)]
    pub profiles: BTreeMap<String, BTreeMap<String, String>>,
}

/// Ledger contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerData {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Install records keyed by `<prefix>_<version>`
    #[serde(default)]
    pub installs: BTreeMap<String, InstalledVersionRecord>,
    #[serde(default)]
    pub workenv: WorkenvSection,
    /// Globally activated versions keyed by `<tool>_version`
    #[serde(default)]
    pub global: BTreeMap<String, String>,
}

/// The shared tf-family metadata ledger
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    pub data: LedgerData,
}

impl Ledger {
    /// Load the ledger from a tf versions root, migrating legacy shapes
    ///
    /// A missing or unreadable ledger yields an empty one; the install flow
    /// rebuilds records as it goes.
    pub fn load(versions_root: &Path) -> Self {
        let path = versions_root.join(LEDGER_FILE);

        let raw = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => value,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse metadata ledger");
                    return Self {
                        path,
                        data: LedgerData {
                            schema_version: SCHEMA_VERSION,
                            ..Default::default()
                        },
                    };
                }
            },
            Err(_) => {
                return Self {
                    path,
                    data: LedgerData {
                        schema_version: SCHEMA_VERSION,
                        ..Default::default()
                    },
                };
            }
        };

        let (raw, migrated) = migrate(raw);
        let data: LedgerData = match serde_json::from_value(raw) {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Metadata ledger has unexpected shape");
                LedgerData {
                    schema_version: SCHEMA_VERSION,
                    ..Default::default()
                }
            }
        };

        let ledger = Self { path, data };
        if migrated {
            debug!("Migrated legacy metadata keys");
            if let Err(e) = ledger.save() {
                warn!(error = %e, "Failed to save migrated ledger");
            }
        }
        ledger
    }

    /// Persist the ledger atomically
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&self.data)?;
        let tmp = self.path.with_extension(format!("tmp-{}", std::process::id()));
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| Error::ledger(&self.path, e.to_string()))?;
        Ok(())
    }

    /// Install record for `<prefix>_<version>`, if present
    pub fn record(&self, prefix: &str, version: &str) -> Option<&InstalledVersionRecord> {
        self.data.installs.get(&format!("{}_{}", prefix, version))
    }

    /// Insert an install record
    pub fn insert_record(&mut self, prefix: &str, record: InstalledVersionRecord) {
        let key = format!("{}_{}", prefix, record.version);
        self.data.installs.insert(key, record);
    }

    /// Drop an install record
    pub fn remove_record(&mut self, prefix: &str, version: &str) {
        self.data.installs.remove(&format!("{}_{}", prefix, version));
    }

    /// Active version for a tool under a profile
    pub fn active_version(&self, profile: &str, tool: &str) -> Option<String> {
        self.data
            .workenv
            .profiles
            .get(profile)?
            .get(&tool_version_key(tool))
            .cloned()
    }

    /// Set the active version for a tool under a profile
    pub fn set_active_version(&mut self, profile: &str, tool: &str, version: &str) {
        self.data
            .workenv
            .profiles
            .entry(profile.to_string())
            .or_default()
            .insert(tool_version_key(tool), version.to_string());
    }

    /// Clear a tool's active version under a profile
    pub fn clear_active_version(&mut self, profile: &str, tool: &str) {
        if let Some(entries) = self.data.workenv.profiles.get_mut(profile) {
            entries.remove(&tool_version_key(tool));
        }
    }

    /// Sticky profile recorded in the ledger
    pub fn current_profile(&self) -> Option<&str> {
        self.data.workenv.current_profile.as_deref()
    }

    /// Globally activated version for a tool
    pub fn global_version(&self, tool: &str) -> Option<String> {
        self.data.global.get(&tool_version_key(tool)).cloned()
    }

    /// Record a global activation
    pub fn set_global_version(&mut self, tool: &str, version: &str) {
        self.data
            .global
            .insert(tool_version_key(tool), version.to_string());
    }
}

/// Move legacy `active_tofu` / `active_terraform` keys into the workenv
/// structure. Returns the rewritten value and whether anything moved.
fn migrate(mut raw: serde_json::Value) -> (serde_json::Value, bool) {
    let Some(object) = raw.as_object_mut() else {
        return (raw, false);
    };

    let mut migrated = false;
    for (legacy_key, tool) in [("active_tofu", "tofu"), ("active_terraform", "terraform")] {
        let Some(value) = object.remove(legacy_key) else {
            continue;
        };
        let Some(version) = value.as_str().map(|s| s.to_string()) else {
            continue;
        };

        let workenv = object
            .entry("workenv")
            .or_insert_with(|| serde_json::json!({}));
        if let Some(workenv) = workenv.as_object_mut() {
            let default_profile = workenv
                .entry("default")
                .or_insert_with(|| serde_json::json!({}));
            if let Some(default_profile) = default_profile.as_object_mut() {
                default_profile.insert(
                    tool_version_key(tool),
                    serde_json::Value::String(version),
                );
                migrated = true;
            }
        }
    }

    if migrated {
        object.insert(
            "schema_version".to_string(),
            serde_json::json!(SCHEMA_VERSION),
        );
    }

    (raw, migrated)
}

/// The RECENT file: most recently used versions per tool, newest first
#[derive(Debug, Default)]
pub struct RecentFile {
    path: PathBuf,
    entries: BTreeMap<String, Vec<String>>,
}

impl RecentFile {
    /// RECENT keys use the historical tool names
    fn tool_key(tool: &str) -> &str {
        if tool == "tofu" { "opentofu" } else { tool }
    }

    /// Load the RECENT file from a tf versions root
    pub fn load(versions_root: &Path) -> Self {
        let path = versions_root.join(RECENT_FILE);
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self { path, entries }
    }

    fn save(&self) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string(&self.entries) {
            Ok(text) => {
                if let Err(e) = std::fs::write(&self.path, text) {
                    warn!(path = %self.path.display(), error = %e, "Failed to update RECENT file");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize RECENT file"),
        }
    }

    /// Versions listed for a tool
    pub fn versions(&self, tool: &str) -> Vec<String> {
        self.entries
            .get(Self::tool_key(tool))
            .cloned()
            .unwrap_or_default()
    }

    /// Replace a tool's entry with its installed versions (≤ limit)
    pub fn set_installed(&mut self, tool: &str, installed: &[String]) {
        let key = Self::tool_key(tool).to_string();
        if installed.is_empty() {
            self.entries.remove(&key);
        } else {
            self.entries
                .insert(key, installed.iter().take(RECENT_LIMIT).cloned().collect());
        }
        self.save();
    }

    /// Move a version to the front of a tool's entry
    pub fn promote(&mut self, tool: &str, version: &str) {
        let key = Self::tool_key(tool).to_string();
        let list = self.entries.entry(key).or_default();
        list.retain(|v| v != version);
        list.insert(0, version.to_string());
        list.truncate(RECENT_LIMIT);
        self.save();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_root_yields_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::load(dir.path());
        assert_eq!(ledger.data.schema_version, SCHEMA_VERSION);
        assert!(ledger.data.installs.is_empty());
    }

    #[test]
    fn active_version_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::load(dir.path());
        ledger.set_active_version("default", "tofu", "1.8.0");
        ledger.save().unwrap();

        let reloaded = Ledger::load(dir.path());
        assert_eq!(
            reloaded.active_version("default", "tofu").as_deref(),
            Some("1.8.0")
        );
        // Stored under the historical opentofu key
        assert!(reloaded.data.workenv.profiles["default"].contains_key("opentofu_version"));
    }

    #[test]
    fn legacy_keys_migrate_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(LEDGER_FILE),
            serde_json::json!({
                "active_tofu": "1.6.0",
                "active_terraform": "1.5.7"
            })
            .to_string(),
        )
        .unwrap();

        let ledger = Ledger::load(dir.path());
        assert_eq!(
            ledger.active_version("default", "tofu").as_deref(),
            Some("1.6.0")
        );
        assert_eq!(
            ledger.active_version("default", "terraform").as_deref(),
            Some("1.5.7")
        );
        assert_eq!(ledger.data.schema_version, SCHEMA_VERSION);

        // The migrated shape was saved back; a reload sees no legacy keys
        let text = std::fs::read_to_string(dir.path().join(LEDGER_FILE)).unwrap();
        assert!(!text.contains("active_tofu"));
        assert!(text.contains("opentofu_version"));
    }

    #[test]
    fn corrupt_ledger_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LEDGER_FILE), "{not json").unwrap();
        let ledger = Ledger::load(dir.path());
        assert!(ledger.data.installs.is_empty());
    }

    #[test]
    fn recent_promote_caps_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut recent = RecentFile::load(dir.path());
        for v in ["1.0.0", "1.1.0", "1.2.0", "1.3.0", "1.4.0", "1.5.0"] {
            recent.promote("tofu", v);
        }
        let versions = recent.versions("tofu");
        assert_eq!(versions.len(), RECENT_LIMIT);
        assert_eq!(versions[0], "1.5.0");

        // Promoting an existing version moves it to the front
        recent.promote("tofu", "1.2.0");
        assert_eq!(recent.versions("tofu")[0], "1.2.0");
        assert_eq!(recent.versions("tofu").len(), RECENT_LIMIT);
    }

    #[test]
    fn recent_persists_under_opentofu_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut recent = RecentFile::load(dir.path());
        recent.promote("tofu", "1.8.0");

        let text = std::fs::read_to_string(dir.path().join(RECENT_FILE)).unwrap();
        assert!(text.contains("opentofu"));

        let reloaded = RecentFile::load(dir.path());
        assert_eq!(reloaded.versions("tofu"), vec!["1.8.0"]);
    }
}
