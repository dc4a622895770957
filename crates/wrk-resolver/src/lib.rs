//! wrk version constraint resolver
//!
//! Expands the constraint expressions a `wrk.toml` may carry against the
//! ordered version list a release source reports. Resolution is a pure
//! function of `(constraint, candidates, include_prereleases)`: no network,
//! no filesystem, deterministic output.

use semver::Version;
use std::fmt;

/// Result type alias for wrk-resolver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for constraint handling
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Constraint expression does not match the grammar
    #[error("Invalid version constraint: {constraint}")]
    InvalidConstraint { constraint: String },

    /// Constraint matched nothing in the candidate list
    #[error("No version matches constraint {constraint}")]
    NoMatch { constraint: String },
}

/// Leniently parse a version string
///
/// Accepts a leading `v` and pads missing minor/patch components, the way
/// release catalogs are actually populated (`1.5` means `1.5.0`).
pub fn parse_version(s: &str) -> Option<Version> {
    let s = s.strip_prefix('v').unwrap_or(s);
    if let Ok(v) = Version::parse(s) {
        return Some(v);
    }

    // Pad incomplete versions: "1" -> "1.0.0", "1.2" -> "1.2.0"
    let (core, suffix) = match s.find(['-', '+']) {
        Some(idx) => (&s[..idx], &s[idx..]),
        None => (s, ""),
    };
    let dots = core.matches('.').count();
    if dots >= 2 {
        return None;
    }
    let padded = format!("{}{}{}", core, ".0".repeat(2 - dots), suffix);
    Version::parse(&padded).ok()
}

/// Sort key that puts higher versions first and unparseable versions last
pub fn sort_versions_desc(versions: &mut [String]) {
    versions.sort_by(|a, b| {
        let va = parse_version(a);
        let vb = parse_version(b);
        match (va, vb) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.cmp(a),
        }
    });
}

/// Check whether a version string carries a prerelease suffix
pub fn is_prerelease(version: &str) -> bool {
    match parse_version(version) {
        Some(v) => !v.pre.is_empty(),
        None => {
            let lower = version.to_lowercase();
            ["alpha", "beta", "rc", "pre"].iter().any(|t| lower.contains(t))
        }
    }
}

/// A single version constraint expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Exact version: `1.2.3` or `v1.2.3`
    Exact(Version),
    /// Newest non-prerelease: `latest` or `stable`
    Latest,
    /// Pinned development sentinel: `dev`, `main`, `master`
    Sentinel(String),
    /// Glob on the patch (or deeper) component: `1.2.*`
    Glob { major: u64, minor: u64 },
    /// Newest patch within the minor: `~1.2.3`
    Tilde(Version),
    /// Newest minor/patch within the major: `^1.2.3`
    Caret(Version),
}

impl Constraint {
    /// Parse a constraint expression
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidConstraint {
                constraint: s.to_string(),
            });
        }

        match s {
            "latest" | "stable" => return Ok(Self::Latest),
            "dev" | "main" | "master" => return Ok(Self::Sentinel(s.to_string())),
            _ => {}
        }

        if let Some(rest) = s.strip_prefix('~') {
            let v = parse_version(rest).ok_or_else(|| Error::InvalidConstraint {
                constraint: s.to_string(),
            })?;
            return Ok(Self::Tilde(v));
        }

        if let Some(rest) = s.strip_prefix('^') {
            let v = parse_version(rest).ok_or_else(|| Error::InvalidConstraint {
                constraint: s.to_string(),
            })?;
            return Ok(Self::Caret(v));
        }

        if let Some(rest) = s.strip_suffix(".*").or_else(|| s.strip_suffix(".x")) {
            let mut parts = rest.split('.');
            let major = parts.next().and_then(|p| p.parse().ok());
            let minor = parts.next().and_then(|p| p.parse().ok());
            if let (Some(major), Some(minor), None) = (major, minor, parts.next()) {
                return Ok(Self::Glob { major, minor });
            }
            return Err(Error::InvalidConstraint {
                constraint: s.to_string(),
            });
        }

        parse_version(s)
            .map(Self::Exact)
            .ok_or_else(|| Error::InvalidConstraint {
                constraint: s.to_string(),
            })
    }

    /// Whether the expression itself names a prerelease
    ///
    /// An explicit prerelease constraint opts that version in even when
    /// prereleases are otherwise excluded.
    pub fn mentions_prerelease(&self) -> bool {
        match self {
            Self::Exact(v) | Self::Tilde(v) | Self::Caret(v) => !v.pre.is_empty(),
            _ => false,
        }
    }

    fn matches(&self, candidate: &Version) -> bool {
        match self {
            Self::Exact(v) => candidate == v,
            Self::Latest => true,
            Self::Sentinel(_) => false,
            Self::Glob { major, minor } => candidate.major == *major && candidate.minor == *minor,
            Self::Tilde(v) => {
                candidate >= v && candidate.major == v.major && candidate.minor == v.minor
            }
            Self::Caret(v) => candidate >= v && candidate.major == v.major,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "{}", v),
            Self::Latest => f.write_str("latest"),
            Self::Sentinel(s) => f.write_str(s),
            Self::Glob { major, minor } => write!(f, "{}.{}.*", major, minor),
            Self::Tilde(v) => write!(f, "~{}", v),
            Self::Caret(v) => write!(f, "^{}", v),
        }
    }
}

/// Resolve a single constraint expression against a candidate list
///
/// `candidates` is the source's version list, newest first. Returns the
/// best match, or `None` when nothing matches. Prerelease candidates are
/// excluded unless `include_prereleases` is set or the constraint itself
/// names a prerelease.
pub fn resolve_one(
    constraint: &str,
    candidates: &[String],
    include_prereleases: bool,
) -> Result<Option<String>> {
    let parsed = Constraint::parse(constraint)?;

    // Sentinels are tool-specific pins the resolver passes through as-is
    if let Constraint::Sentinel(s) = &parsed {
        return Ok(Some(s.clone()));
    }

    let allow_pre = include_prereleases || parsed.mentions_prerelease();

    let mut best: Option<Version> = None;
    for candidate in candidates {
        let Some(version) = parse_version(candidate) else {
            continue;
        };
        if !allow_pre && !version.pre.is_empty() {
            continue;
        }
        if !parsed.matches(&version) {
            continue;
        }
        // Higher semantic version wins the tie-break
        if best.as_ref().is_none_or(|b| version > *b) {
            best = Some(version);
        }
    }

    Ok(best.map(|v| v.to_string()))
}

/// Expand a list of constraints (a matrix) against a candidate list
///
/// Each sub-constraint resolves independently; the output preserves input
/// order and deduplicates. Sub-constraints that match nothing are dropped,
/// so an unresolvable matrix yields an empty list and the caller decides
/// whether that is fatal.
pub fn resolve_matrix(
    constraints: &[String],
    candidates: &[String],
    include_prereleases: bool,
) -> Result<Vec<String>> {
    let mut resolved = Vec::new();
    for constraint in constraints {
        match resolve_one(constraint, candidates, include_prereleases)? {
            Some(version) => {
                if !resolved.contains(&version) {
                    resolved.push(version);
                }
            }
            None => {
                tracing::debug!(constraint = %constraint, "Constraint matched no version");
            }
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn candidates() -> Vec<String> {
        ["1.22.5", "1.22.4", "1.21.9", "1.21.0", "2.0.0-rc1", "1.23.0-beta.1"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn lenient_parse_pads_components() {
        assert_eq!(parse_version("1.5").unwrap(), Version::new(1, 5, 0));
        assert_eq!(parse_version("2").unwrap(), Version::new(2, 0, 0));
        assert_eq!(parse_version("v1.2.3").unwrap(), Version::new(1, 2, 3));
        assert!(parse_version("not-a-version").is_none());
    }

    #[test]
    fn sort_puts_invalid_last() {
        let mut versions = vec![
            "1.2.0".to_string(),
            "garbage".to_string(),
            "1.10.0".to_string(),
        ];
        sort_versions_desc(&mut versions);
        assert_eq!(versions, vec!["1.10.0", "1.2.0", "garbage"]);
    }

    #[rstest]
    #[case("1.22.5", Some("1.22.5"))]
    #[case("v1.22.5", Some("1.22.5"))]
    #[case("1.22.*", Some("1.22.5"))]
    #[case("1.21.x", Some("1.21.9"))]
    #[case("~1.21.0", Some("1.21.9"))]
    #[case("^1.21.0", Some("1.22.5"))]
    #[case("latest", Some("1.22.5"))]
    #[case("stable", Some("1.22.5"))]
    #[case("main", Some("main"))]
    #[case("9.9.*", None)]
    fn resolution(#[case] constraint: &str, #[case] expected: Option<&str>) {
        let got = resolve_one(constraint, &candidates(), false).unwrap();
        assert_eq!(got.as_deref(), expected);
    }

    #[test]
    fn prereleases_excluded_by_default() {
        let got = resolve_one("^1.22.0", &candidates(), false).unwrap();
        assert_eq!(got.as_deref(), Some("1.22.5"));

        let got = resolve_one("latest", &candidates(), true).unwrap();
        assert_eq!(got.as_deref(), Some("2.0.0-rc1"));
    }

    #[test]
    fn explicit_prerelease_constraint_opts_in() {
        let got = resolve_one("2.0.0-rc1", &candidates(), false).unwrap();
        assert_eq!(got.as_deref(), Some("2.0.0-rc1"));
    }

    #[test]
    fn matrix_preserves_order_and_dedups() {
        let constraints = vec![
            "1.22.*".to_string(),
            "1.21.*".to_string(),
            "^1.22.0".to_string(), // same winner as 1.22.*
        ];
        let got = resolve_matrix(&constraints, &candidates(), false).unwrap();
        assert_eq!(got, vec!["1.22.5", "1.21.9"]);
    }

    #[test]
    fn matrix_drops_unresolvable_entries() {
        let constraints = vec!["9.9.*".to_string(), "1.21.*".to_string()];
        let got = resolve_matrix(&constraints, &candidates(), false).unwrap();
        assert_eq!(got, vec!["1.21.9"]);
    }

    #[test]
    fn determinism() {
        let constraints = vec!["1.22.*".to_string(), "~1.21.0".to_string()];
        let a = resolve_matrix(&constraints, &candidates(), false).unwrap();
        let b = resolve_matrix(&constraints, &candidates(), false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_constraint_is_an_error() {
        assert!(Constraint::parse("").is_err());
        assert!(Constraint::parse("not a version").is_err());
        assert!(Constraint::parse("1.2.3.4.5").is_err());
    }
}
