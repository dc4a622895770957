//! Platform detection for wrk
//!
//! Canonical `(os, arch)` naming used by every download URL template and
//! install layout in the workspace. Tool release catalogs disagree about
//! architecture names (`x86_64` vs `amd64`, `aarch64` vs `arm64`); this
//! crate owns the normalization so the rest of wrk never sees a raw
//! machine string.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating system type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Darwin,
    Windows,
    Other,
}

impl Os {
    /// Detect the current operating system at compile-configured runtime
    #[inline]
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(target_os = "macos") {
            Os::Darwin
        } else if cfg!(target_os = "linux") {
            Os::Linux
        } else {
            Os::Other
        }
    }

    /// Canonical lowercase name used in download URLs
    pub fn name(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Darwin => "darwin",
            Os::Windows => "windows",
            Os::Other => "other",
        }
    }

    /// Check if this is a Unix-like OS
    #[inline]
    pub fn is_unix(&self) -> bool {
        matches!(self, Os::Linux | Os::Darwin)
    }

    /// Check if this is Windows
    #[inline]
    pub fn is_windows(&self) -> bool {
        matches!(self, Os::Windows)
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// CPU architecture, normalized to release-catalog conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Amd64,
    Arm64,
    Other,
}

impl Arch {
    /// Detect the current architecture at runtime
    #[inline]
    pub fn current() -> Self {
        if cfg!(target_arch = "x86_64") {
            Arch::Amd64
        } else if cfg!(target_arch = "aarch64") {
            Arch::Arm64
        } else {
            Arch::Other
        }
    }

    /// Normalize a machine string to the canonical architecture name
    ///
    /// `x86_64` and `amd64` map to [`Arch::Amd64`]; `arm64` and `aarch64`
    /// map to [`Arch::Arm64`]; anything else is passed through as
    /// [`Arch::Other`] and reported unsupported.
    pub fn normalize(machine: &str) -> Self {
        match machine.to_lowercase().as_str() {
            "x86_64" | "amd64" => Arch::Amd64,
            "arm64" | "aarch64" => Arch::Arm64,
            _ => Arch::Other,
        }
    }

    /// Canonical lowercase name used in download URLs
    pub fn name(&self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
            Arch::Other => "other",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Platform information combining OS and architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    /// Get the current platform
    #[inline]
    pub fn current() -> Self {
        Self {
            os: Os::current(),
            arch: Arch::current(),
        }
    }

    /// Construct a platform from raw OS and machine strings
    pub fn from_names(os: &str, machine: &str) -> Self {
        let os = match os.to_lowercase().as_str() {
            "linux" => Os::Linux,
            "darwin" | "macos" => Os::Darwin,
            "windows" => Os::Windows,
            _ => Os::Other,
        };
        Self {
            os,
            arch: Arch::normalize(machine),
        }
    }

    /// Platform string in `{os}_{arch}` format, used for workenv directory
    /// naming and the install metadata ledger
    pub fn platform_string(&self) -> String {
        format!("{}_{}", self.os, self.arch)
    }

    /// Archive extension tool releases use on this platform
    ///
    /// `.zip` on Windows, `.tar.gz` elsewhere.
    #[inline]
    pub fn archive_extension(&self) -> &'static str {
        if self.os.is_windows() { ".zip" } else { ".tar.gz" }
    }

    /// Executable file extension
    #[inline]
    pub fn executable_extension(&self) -> &'static str {
        if self.os.is_windows() { ".exe" } else { "" }
    }

    /// Append the executable extension to a binary name
    pub fn executable_name(&self, base: &str) -> String {
        format!("{}{}", base, self.executable_extension())
    }

    /// PATH environment variable separator
    #[inline]
    pub fn path_separator(&self) -> char {
        if self.os.is_windows() { ';' } else { ':' }
    }

    /// Virtual environment scripts directory name
    ///
    /// `Scripts` on Windows, `bin` elsewhere.
    #[inline]
    pub fn venv_bin_dir(&self) -> &'static str {
        if self.os.is_windows() { "Scripts" } else { "bin" }
    }

    /// Whether this platform is in the supported set
    ///
    /// Supported: `{linux, darwin, windows} × {amd64, arm64}`.
    pub fn is_supported(&self) -> bool {
        !matches!(self.os, Os::Other) && !matches!(self.arch, Arch::Other)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os, self.arch)
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

/// Parse a `{os}_{arch}` platform string
pub fn parse_platform_string(s: &str) -> Option<Platform> {
    let (os, arch) = s.split_once('_')?;
    Some(Platform::from_names(os, arch))
}
