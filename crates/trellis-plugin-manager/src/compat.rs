//! Host compatibility ranges and version ordering.
//!
//! Registries publish compatibility ranges in npm style (`>=0.20 <0.30`,
//! `^0.25.0 || ^1.0.0`, `1.2.0 - 1.4.x`). They are normalized into
//! [`semver::VersionReq`] syntax before matching; a version satisfies the
//! range if it matches any `||` alternative. A bare full version such as
//! `0.25.0` means exactly that version.

use semver::{Version, VersionReq};

/// Parses a version, tolerating surrounding whitespace and a leading `v`.
///
/// # Errors
///
/// Returns an error if the string is not a semantic version.
pub fn parse_version(version: &str) -> Result<Version, semver::Error> {
    Version::parse(strip_v(version.trim()))
}

/// Parses an npm-style range into one requirement per `||` alternative.
///
/// # Errors
///
/// Returns an error if any alternative is not a valid requirement.
pub fn parse_range(range: &str) -> Result<Vec<VersionReq>, semver::Error> {
    range
        .split("||")
        .map(|alternative| VersionReq::parse(&normalize_alternative(alternative)))
        .collect()
}

/// Checks whether `version` satisfies the npm-style `range`.
///
/// # Errors
///
/// Returns an error if the range cannot be parsed.
pub fn satisfies(version: &Version, range: &str) -> Result<bool, semver::Error> {
    Ok(parse_range(range)?.iter().any(|req| req.matches(version)))
}

fn strip_v(version: &str) -> &str {
    version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version)
}

fn is_operator(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^'))
}

/// Rewrites one npm alternative as a comma-separated semver requirement.
fn normalize_alternative(alternative: &str) -> String {
    let tokens: Vec<&str> = alternative
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .collect();

    if tokens.is_empty() {
        return "*".to_string();
    }

    // Hyphen range: `1.2.3 - 2.3.4`.
    if let [low, "-", high] = tokens.as_slice() {
        return format!(">={}, <={}", strip_v(low), strip_v(high));
    }

    let mut comparators = Vec::with_capacity(tokens.len());
    let mut pending_operator = "";

    for token in tokens {
        if is_operator(token) {
            pending_operator = token;
            continue;
        }

        let split = token
            .find(|c: char| !matches!(c, '<' | '>' | '=' | '~' | '^'))
            .unwrap_or(token.len());
        let (operator, version) = token.split_at(split);
        let version = strip_v(version);
        let operator = match (operator, pending_operator) {
            ("", "") if Version::parse(version).is_ok() => "=",
            ("", pending) => pending,
            (explicit, _) => explicit,
        };
        pending_operator = "";

        comparators.push(format!("{operator}{version}"));
    }

    comparators.join(", ")
}
