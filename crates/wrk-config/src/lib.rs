//! wrk configuration
//!
//! The `wrk.toml` manifest model with layered loading (built-in defaults,
//! project file, `WRK_*` environment overrides), profile merging and
//! validation. Every other crate in the workspace consumes configuration
//! through the [`WrkConfig`] value; nothing here touches the network.

mod env;
mod error;
mod loader;
mod model;
mod validation;

pub use env::{active_profile, active_profile_from, parse_bool};
pub use error::{Error, Result};
pub use model::{
    expand_user, parse_ttl, ContainerRuntime, ExportSection, ToolSpec, WorkenvSettings, WrkConfig,
    ENV_PREFIX, MANIFEST_FILE,
};
pub use validation::MAX_TASK_DEPTH;
