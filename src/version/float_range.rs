//! Floating version patterns (spec §4.2): `*`, `1.*`, `1.0.*`, `1.0.0.*`,
//! `1.0.0-*`. Unlike [`super::VersionRange::find_best_match`], a float
//! range's best match is the *highest* version consistent with the
//! anchor — floats express "latest of a line", not "lowest acceptable".

use std::fmt;

use crate::error::Error;

use super::Version;

const CONTEXT: &str = "parse float range";

/// What part of the anchor must match, and what may vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatBehavior {
    /// No wildcard at all; behaves like an exact version.
    None,
    /// `1.0.0-*`: major/minor/patch fixed, any prerelease label (or none).
    Prerelease,
    /// `1.0.0.*`: major/minor/patch fixed, any legacy revision.
    Revision,
    /// `1.0.*`: major/minor fixed, any patch.
    Patch,
    /// `1.*`: major fixed, any minor/patch.
    Minor,
    /// `*`: anything.
    Major,
}

#[derive(Debug, Clone)]
pub struct FloatRange {
    anchor: Option<Version>,
    behavior: FloatBehavior,
}

impl FloatRange {
    pub fn parse(text: &str) -> Result<FloatRange, Error> {
        let trimmed = text.trim();

        if trimmed == "*" {
            return Ok(FloatRange { anchor: None, behavior: FloatBehavior::Major });
        }

        if let Some(prefix) = trimmed.strip_suffix("-*") {
            let anchor = parse_exact_prefix(prefix, 3)
                .ok_or_else(|| Error::invalid_input(CONTEXT, format!("invalid prerelease float anchor \"{prefix}\"")))?;
            return Ok(FloatRange { anchor: Some(anchor), behavior: FloatBehavior::Prerelease });
        }

        if let Some(prefix) = trimmed.strip_suffix(".*") {
            let parts = prefix.split('.').count();
            return match parts {
                1 => {
                    let anchor = parse_exact_prefix(prefix, 1)
                        .ok_or_else(|| Error::invalid_input(CONTEXT, format!("invalid float anchor \"{prefix}\"")))?;
                    Ok(FloatRange { anchor: Some(anchor), behavior: FloatBehavior::Minor })
                }
                2 => {
                    let anchor = parse_exact_prefix(prefix, 2)
                        .ok_or_else(|| Error::invalid_input(CONTEXT, format!("invalid float anchor \"{prefix}\"")))?;
                    Ok(FloatRange { anchor: Some(anchor), behavior: FloatBehavior::Patch })
                }
                3 => {
                    let anchor = parse_exact_prefix(prefix, 3)
                        .ok_or_else(|| Error::invalid_input(CONTEXT, format!("invalid float anchor \"{prefix}\"")))?;
                    Ok(FloatRange { anchor: Some(anchor), behavior: FloatBehavior::Revision })
                }
                _ => Err(Error::invalid_input(CONTEXT, format!("unsupported float anchor \"{prefix}\""))),
            };
        }

        // No wildcard: behaves as an exact pin.
        let anchor = Version::parse(trimmed)?;
        Ok(FloatRange { anchor: Some(anchor), behavior: FloatBehavior::None })
    }

    pub fn behavior(&self) -> FloatBehavior {
        self.behavior
    }

    pub fn anchor(&self) -> Option<&Version> {
        self.anchor.as_ref()
    }

    pub fn matches(&self, version: &Version) -> bool {
        match self.behavior {
            FloatBehavior::Major => true,
            FloatBehavior::Minor => {
                self.anchor.as_ref().is_some_and(|a| version.major() == a.major())
            }
            FloatBehavior::Patch => self
                .anchor
                .as_ref()
                .is_some_and(|a| version.major() == a.major() && version.minor() == a.minor()),
            FloatBehavior::Revision | FloatBehavior::Prerelease => self.anchor.as_ref().is_some_and(|a| {
                version.major() == a.major() && version.minor() == a.minor() && version.patch() == a.patch()
            }),
            FloatBehavior::None => self.anchor.as_ref().is_some_and(|a| version == a),
        }
    }

    /// Returns the *highest* matching version — the opposite preference
    /// from [`super::VersionRange::find_best_match`].
    pub fn find_best_match<'a, I>(&self, versions: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        let mut best: Option<&'a Version> = None;
        for candidate in versions {
            if !self.matches(candidate) {
                continue;
            }
            best = match best {
                None => Some(candidate),
                Some(current) if candidate > current => Some(candidate),
                Some(current) => Some(current),
            };
        }
        best
    }
}

/// Parses a dot-joined numeric prefix of exactly `expected_parts` parts
/// into a [`Version`] by zero-filling the remainder (e.g. `"1.0"` with
/// `expected_parts = 3` becomes `1.0.0`).
fn parse_exact_prefix(prefix: &str, expected_parts: usize) -> Option<Version> {
    let parts: Vec<&str> = prefix.split('.').collect();
    if parts.len() != expected_parts || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    let mut padded = parts.clone();
    while padded.len() < 3 {
        padded.push("0");
    }
    Version::parse(&padded.join(".")).ok()
}

impl fmt::Display for FloatRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.anchor, self.behavior) {
            (_, FloatBehavior::Major) => write!(f, "*"),
            (Some(a), FloatBehavior::Minor) => write!(f, "{}.*", a.major()),
            (Some(a), FloatBehavior::Patch) => write!(f, "{}.{}.*", a.major(), a.minor()),
            (Some(a), FloatBehavior::Revision) => write!(f, "{}.{}.{}.*", a.major(), a.minor(), a.patch()),
            (Some(a), FloatBehavior::Prerelease) => write!(f, "{}.{}.{}-*", a.major(), a.minor(), a.patch()),
            (Some(a), FloatBehavior::None) => write!(f, "{a}"),
            (None, _) => write!(f, "*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn star_matches_anything() {
        let float = FloatRange::parse("*").unwrap();
        assert!(float.matches(&v("0.0.1")));
        assert!(float.matches(&v("999.999.999")));
    }

    #[test]
    fn major_wildcard_requires_same_major() {
        let float = FloatRange::parse("1.*").unwrap();
        assert!(float.matches(&v("1.9.9")));
        assert!(!float.matches(&v("2.0.0")));
    }

    #[test]
    fn patch_wildcard_requires_same_major_minor() {
        let float = FloatRange::parse("1.0.*").unwrap();
        assert!(float.matches(&v("1.0.9")));
        assert!(!float.matches(&v("1.1.0")));
    }

    #[test]
    fn revision_wildcard_requires_same_major_minor_patch() {
        let float = FloatRange::parse("1.0.0.*").unwrap();
        assert!(float.matches(&v("1.0.0.7")));
        assert!(!float.matches(&v("1.0.1.0")));
    }

    #[test]
    fn prerelease_wildcard_requires_exact_release_any_label() {
        let float = FloatRange::parse("1.0.0-*").unwrap();
        assert!(float.matches(&v("1.0.0-beta")));
        assert!(float.matches(&v("1.0.0")));
        assert!(!float.matches(&v("1.0.1")));
    }

    #[test]
    fn find_best_match_returns_highest_not_lowest() {
        let versions: Vec<Version> = ["1.0.0", "1.1.0", "1.2.0"].iter().map(|s| v(s)).collect();
        let float = FloatRange::parse("1.*").unwrap();
        let best = float.find_best_match(versions.iter()).unwrap();
        assert_eq!(best, &v("1.2.0"));
    }
}
