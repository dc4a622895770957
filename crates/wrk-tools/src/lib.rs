//! wrk tool managers
//!
//! Each managed tool is described by a constant [`ToolDescriptor`]; the
//! install pipeline (download, checksum gate, safe extraction, placement,
//! verify-by-running, record write, activation) is generic over the
//! descriptor and its release source. Two layouts exist: the per-version
//! directory tree managed by [`ToolManager`], and the flat tfswitch-style
//! layout with its shared metadata ledger managed by [`TfManager`].

mod descriptor;
mod error;
mod install;
mod ledger;
mod manager;
mod record;
mod tf;

pub use descriptor::{global_binary_name, tool_version_key, InstallQuirk, Layout, ToolDescriptor};
pub use error::{Error, Result};
pub use install::{InstallOptions, VERIFY_TIMEOUT};
pub use ledger::{Ledger, LedgerData, RecentFile, WorkenvSection, LEDGER_FILE, RECENT_FILE, RECENT_LIMIT, SCHEMA_VERSION};
pub use manager::ToolManager;
pub use record::InstalledVersionRecord;
pub use tf::{default_global_bin_dir, default_versions_root, TfManager};
