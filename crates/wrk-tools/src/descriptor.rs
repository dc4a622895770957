//! Tool descriptors
//!
//! One constant descriptor per managed tool: where releases come from, how
//! the archive names its binary vs what lands on disk, which install layout
//! applies, and how a finished install proves itself (`<binary> <args>`
//! output matched against a version pattern).
//!
//! The descriptors are plain values; the generic install flow is
//! parameterized over them, so adding a tool is adding a row here plus a
//! release-source arm.

use crate::error::{Error, Result};
use std::sync::Arc;
use wrk_fetch::Fetcher;
use wrk_platform::Platform;
use wrk_sources::{BaoSource, GoSource, HashicorpSource, ReleaseSource, TofuSource, UvSource};

/// On-disk install layout for a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `<install_root>/<tool>/<version>/bin/<executable>`
    PerVersion,
    /// Flat `<tf_versions_root>/<prefix>_<version>` files, compatible with
    /// the external tfswitch convention
    TfFlat { prefix: &'static str },
}

/// Post-extraction handling a tool's archive needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallQuirk {
    /// Copy the single binary found at the archive root
    None,
    /// The archive ships a whole `go/` tree that must move as a unit; the
    /// binary lives at `go/bin/go` and gets a `bin/` symlink
    GoTree,
    /// The binary may sit anywhere in the tree; search recursively
    SearchRecursive,
}

/// Constant description of a managed tool
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// Tool id as it appears in `wrk.toml`
    pub id: &'static str,
    /// Executable name installed on disk (extension applied per platform)
    pub executable: &'static str,
    /// Binary name as shipped inside the archive; may differ from
    /// `executable` (the terraform archive ships `terraform`, wrk installs
    /// it as `ibmtf`)
    pub archive_binary: &'static str,
    pub layout: Layout,
    /// Arguments that make the binary print its version
    pub verify_args: &'static [&'static str],
    /// Pattern the version output must match; `{version}` is replaced with
    /// the regex-escaped requested version
    pub version_pattern: &'static str,
    pub quirk: InstallQuirk,
}

impl ToolDescriptor {
    /// The built-in descriptor table
    pub fn all() -> &'static [ToolDescriptor] {
        &BUILTIN
    }

    /// Look up a descriptor by tool id
    pub fn builtin(id: &str) -> Result<&'static ToolDescriptor> {
        BUILTIN
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| Error::UnknownTool { tool: id.to_string() })
    }

    /// Whether this tool uses the tf-flat layout
    pub fn is_tf_family(&self) -> bool {
        matches!(self.layout, Layout::TfFlat { .. })
    }

    /// The flat-layout filename prefix, for tf-family tools
    pub fn tf_prefix(&self) -> Option<&'static str> {
        match self.layout {
            Layout::TfFlat { prefix } => Some(prefix),
            Layout::PerVersion => None,
        }
    }

    /// Construct the release source for this tool
    pub fn release_source(
        &self,
        fetcher: Arc<Fetcher>,
        platform: Platform,
    ) -> Box<dyn ReleaseSource> {
        match self.id {
            "go" => Box::new(GoSource::new(fetcher, platform)),
            "uv" => Box::new(UvSource::new(fetcher, platform)),
            "tofu" => Box::new(TofuSource::new(fetcher, platform)),
            "bao" => Box::new(BaoSource::new(fetcher, platform)),
            "ibmtf" => Box::new(HashicorpSource::new(fetcher, platform, "terraform")),
            "vault" => Box::new(HashicorpSource::new(fetcher, platform, "vault")),
            other => unreachable!("no release source registered for {other}"),
        }
    }

    /// The regex that verification output must match for a version
    pub fn version_regex(&self, version: &str) -> String {
        self.version_pattern
            .replace("{version}", &regex::escape(version))
    }
}

static BUILTIN: [ToolDescriptor; 6] = [
    ToolDescriptor {
        id: "go",
        executable: "go",
        archive_binary: "go",
        layout: Layout::PerVersion,
        verify_args: &["version"],
        version_pattern: r"go{version}",
        quirk: InstallQuirk::GoTree,
    },
    ToolDescriptor {
        id: "uv",
        executable: "uv",
        archive_binary: "uv",
        layout: Layout::PerVersion,
        verify_args: &["--version"],
        version_pattern: r"uv {version}",
        quirk: InstallQuirk::SearchRecursive,
    },
    ToolDescriptor {
        id: "bao",
        executable: "bao",
        archive_binary: "bao",
        layout: Layout::PerVersion,
        verify_args: &["--version"],
        version_pattern: r"{version}",
        quirk: InstallQuirk::None,
    },
    ToolDescriptor {
        id: "vault",
        executable: "vault",
        archive_binary: "vault",
        layout: Layout::PerVersion,
        verify_args: &["-version"],
        version_pattern: r"Vault v{version}",
        quirk: InstallQuirk::None,
    },
    ToolDescriptor {
        id: "ibmtf",
        executable: "ibmtf",
        archive_binary: "terraform",
        layout: Layout::TfFlat { prefix: "terraform" },
        verify_args: &["-version"],
        version_pattern: r"Terraform v{version}",
        quirk: InstallQuirk::None,
    },
    ToolDescriptor {
        id: "tofu",
        executable: "tofu",
        archive_binary: "tofu",
        layout: Layout::TfFlat { prefix: "opentofu" },
        verify_args: &["-version"],
        version_pattern: r"OpenTofu v{version}",
        quirk: InstallQuirk::None,
    },
];

/// Ledger key for a tool's active version
///
/// OpenTofu historically keys as `opentofu_version`; everything else is
/// `<tool>_version`.
pub fn tool_version_key(tool: &str) -> String {
    if tool == "tofu" {
        "opentofu_version".to_string()
    } else {
        format!("{}_version", tool)
    }
}

/// Canonical system name used for global activation
///
/// The tf-family binaries go into `~/.local/bin` under the names the wider
/// ecosystem expects.
pub fn global_binary_name(tool: &str) -> &str {
    match tool {
        "ibmtf" => "terraform",
        other => other,
    }
}
