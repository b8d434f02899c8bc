//! Version gate
//!
//! Decides whether a test may run against the connected server. The server's
//! reported version is extracted, normalized and matched against the test's
//! semantic-version constraint:
//!
//! ```text
//! 5.7.25-TiDB-v5.3.0-nightly  ->  v5.3.0-nightly  ->  5.3.99
//! ```
//!
//! Every failure here is a reason to skip the test, never to fail it.

use std::fmt;
use std::str::FromStr;

use semver::{Comparator, Prerelease, Version};

/// Marker preceding the real version in TiDB's `select version()` output
pub const VERSION_MARKER: &str = "-TiDB-";

/// Patch level assumed for pre-release builds
const NIGHTLY_PATCH: u64 = 99;

/// Reasons a test is not eligible to run on a server
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("invalid server version `{raw}`: {reason}")]
    InvalidVersion { raw: String, reason: String },

    #[error("invalid version constraint `{constraint}`: {reason}")]
    InvalidConstraint { constraint: String, reason: String },

    #[error("server version {version} does not satisfy `{constraint}`")]
    Mismatch { version: Version, constraint: String },

    #[error("failed to query server version: {0}")]
    Unavailable(String),
}

/// Candidate version string inside a raw server version
///
/// The marker only counts after a MySQL-compatible prefix; a string that
/// starts with it is taken as is.
pub fn extract_version(raw: &str) -> &str {
    match raw.find(VERSION_MARKER) {
        Some(idx) if idx > 0 => &raw[idx + VERSION_MARKER.len()..],
        _ => raw,
    }
}

/// Parse a version leniently: `v` prefix allowed, missing minor/patch are 0
pub fn parse_version(candidate: &str) -> Result<Version, VersionError> {
    let invalid = |reason: &str| VersionError::InvalidVersion {
        raw: candidate.to_string(),
        reason: reason.to_string(),
    };

    let text = candidate.trim();
    let text = text.strip_prefix(['v', 'V']).unwrap_or(text);
    let split = text.find(['-', '+']).unwrap_or(text.len());
    let (core, suffix) = text.split_at(split);

    let mut parts = Vec::with_capacity(3);
    for part in core.split('.') {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("expected numeric components"));
        }
        parts.push(part);
    }
    if parts.len() > 3 {
        return Err(invalid("too many components"));
    }
    parts.resize(3, "0");

    let normalized = format!("{}{}", parts.join("."), suffix);
    Version::parse(&normalized).map_err(|err| invalid(&err.to_string()))
}

/// Compensate for nightly builds that under-report their patch level
///
/// A pre-release version has its label dropped and its patch raised to 99,
/// so `5.3.0-nightly` satisfies `>= 5.3.2`.
pub fn normalize(version: &Version) -> Version {
    let mut version = version.clone();
    if !version.pre.is_empty() && version.patch < NIGHTLY_PATCH {
        version.pre = Prerelease::EMPTY;
        version.patch = NIGHTLY_PATCH;
    }
    version
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Any,
    Match(Comparator),
    Not(Comparator),
}

impl Term {
    fn parse(word: &str) -> Result<Self, String> {
        if matches!(word, "*" | "x" | "X") {
            return Ok(Term::Any);
        }
        let (negated, word) = match word.strip_prefix("!=") {
            Some(rest) => (true, rest),
            None => (false, word),
        };
        let split = word
            .find(|c: char| !matches!(c, '=' | '<' | '>' | '~' | '^'))
            .unwrap_or(word.len());
        let (op, version) = word.split_at(split);
        let version = version.strip_prefix(['v', 'V']).unwrap_or(version);
        let version = strip_wildcards(version);
        if version.is_empty() {
            return Err(format!("missing version after `{op}`"));
        }

        // a bare version is an exact match
        let op = match op {
            "" => "=",
            op => op,
        };
        let comparator = Comparator::from_str(&format!("{op}{version}")).map_err(|err| err.to_string())?;
        Ok(if negated {
            Term::Not(comparator)
        } else {
            Term::Match(comparator)
        })
    }

    fn matches(&self, version: &Version) -> bool {
        match self {
            Term::Any => true,
            Term::Match(c) => c.matches(version),
            Term::Not(c) => !c.matches(version),
        }
    }
}

fn strip_wildcards(version: &str) -> &str {
    let mut version = version;
    while let Some(rest) = version
        .strip_suffix(".*")
        .or_else(|| version.strip_suffix(".x"))
        .or_else(|| version.strip_suffix(".X"))
    {
        version = rest;
    }
    version
}

/// Parsed semantic-version range
///
/// `||` separates alternatives; inside an alternative, commas or whitespace
/// separate terms that must all hold. `A - B` is an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    text: String,
    groups: Vec<Vec<Term>>,
}

impl Constraint {
    /// Whether `version` satisfies any alternative
    pub fn matches(&self, version: &Version) -> bool {
        self.groups
            .iter()
            .any(|group| group.iter().all(|term| term.matches(version)))
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Constraint {
    type Err = VersionError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| VersionError::InvalidConstraint {
            constraint: text.to_string(),
            reason,
        };

        let mut groups = Vec::new();
        for alternative in text.split("||") {
            let group = parse_group(alternative).map_err(invalid)?;
            if group.is_empty() {
                return Err(invalid("empty alternative".to_string()));
            }
            groups.push(group);
        }
        Ok(Self {
            text: text.to_string(),
            groups,
        })
    }
}

fn parse_group(alternative: &str) -> Result<Vec<Term>, String> {
    let mut terms = Vec::new();
    for piece in alternative.split(',') {
        let words = join_operators(piece.split_whitespace());
        let mut i = 0;
        while i < words.len() {
            if words.get(i + 1).map(String::as_str) == Some("-") {
                let upper = words
                    .get(i + 2)
                    .ok_or_else(|| format!("missing upper bound after `{} -`", words[i]))?;
                terms.push(Term::parse(&format!(">={}", words[i]))?);
                terms.push(Term::parse(&format!("<={upper}"))?);
                i += 3;
            } else {
                terms.push(Term::parse(&words[i])?);
                i += 1;
            }
        }
    }
    Ok(terms)
}

// `>= 5.3.2` is written with a space between operator and version
fn join_operators<'a>(words: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut joined = Vec::new();
    let mut pending = String::new();
    for word in words {
        if word.chars().all(|c| matches!(c, '=' | '!' | '<' | '>' | '~' | '^')) {
            pending.push_str(word);
            continue;
        }
        joined.push(format!("{pending}{word}"));
        pending.clear();
    }
    if !pending.is_empty() {
        joined.push(pending);
    }
    joined
}

/// Run the gate for a raw server version and an optional constraint
///
/// Returns the normalized version the constraint was evaluated against.
/// An empty constraint passes without looking at the version.
pub fn check(raw: &str, constraint: Option<&str>) -> Result<Option<Version>, VersionError> {
    let constraint = match constraint.map(str::trim) {
        Some(c) if !c.is_empty() => c,
        _ => return Ok(None),
    };

    let parsed = parse_version(extract_version(raw)).map_err(|err| match err {
        VersionError::InvalidVersion { reason, .. } => VersionError::InvalidVersion {
            raw: raw.to_string(),
            reason,
        },
        other => other,
    })?;
    let version = normalize(&parsed);
    let constraint: Constraint = constraint.parse()?;

    if !constraint.matches(&version) {
        return Err(VersionError::Mismatch {
            version,
            constraint: constraint.to_string(),
        });
    }
    tracing::debug!(raw, %version, %constraint, "version gate passed");
    Ok(Some(version))
}
