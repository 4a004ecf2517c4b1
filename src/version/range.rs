//! Bracketed version ranges (spec §4.2).

use std::fmt;

use crate::error::Error;

use super::Version;

const CONTEXT: &str = "parse version range";

/// An interval over [`Version`] values. `min`/`max` absent means unbounded
/// on that side.
#[derive(Debug, Clone)]
pub struct VersionRange {
    min: Option<Version>,
    min_inclusive: bool,
    max: Option<Version>,
    max_inclusive: bool,
}

impl VersionRange {
    /// Parses the bracketed-range grammar: a bare version `v` parses to
    /// `[v, ∞)`; `[v]` pins to exactly `v`; `(`/`[`…`)`/`]` combine with an
    /// optional comma-separated pair of bounds.
    pub fn parse(text: &str) -> Result<VersionRange, Error> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_input(CONTEXT, "empty range"));
        }

        let first = trimmed.as_bytes()[0];
        if first != b'[' && first != b'(' {
            let version = Version::parse(trimmed)?;
            return Ok(VersionRange { min: Some(version), min_inclusive: true, max: None, max_inclusive: false });
        }

        let last = *trimmed.as_bytes().last().unwrap();
        if last != b']' && last != b')' {
            return Err(Error::invalid_input(CONTEXT, format!("unterminated bracket in \"{trimmed}\"")));
        }

        let min_inclusive = first == b'[';
        let max_inclusive = last == b']';
        let inner = trimmed[1..trimmed.len() - 1].trim();

        if let Some(comma_idx) = inner.find(',') {
            let min_text = inner[..comma_idx].trim();
            let max_text = inner[comma_idx + 1..].trim();

            if max_text.find(',').is_some() {
                return Err(Error::invalid_input(CONTEXT, format!("too many bounds in \"{trimmed}\"")));
            }

            let min = if min_text.is_empty() { None } else { Some(Version::parse(min_text)?) };
            let max = if max_text.is_empty() { None } else { Some(Version::parse(max_text)?) };

            if min.is_none() && max.is_none() {
                return Err(Error::invalid_input(CONTEXT, "range has no bounds at all"));
            }

            Ok(VersionRange { min, min_inclusive, max, max_inclusive })
        } else {
            // No comma: only the exact-pin form `[v]` is well-formed.
            if !min_inclusive || !max_inclusive || inner.is_empty() {
                return Err(Error::invalid_input(CONTEXT, format!("single-bound bracket must be \"[v]\", got \"{trimmed}\"")));
            }
            let pinned = Version::parse(inner)?;
            Ok(VersionRange { min: Some(pinned.clone()), min_inclusive: true, max: Some(pinned), max_inclusive: true })
        }
    }

    pub fn min(&self) -> Option<&Version> {
        self.min.as_ref()
    }

    pub fn max(&self) -> Option<&Version> {
        self.max.as_ref()
    }

    /// `true` when both bounds are the same inclusive version (`[v]`).
    pub fn is_exact(&self) -> bool {
        matches!((&self.min, &self.max), (Some(a), Some(b)) if self.min_inclusive && self.max_inclusive && a == b)
    }

    pub fn satisfies(&self, version: &Version) -> bool {
        let lower_ok = match &self.min {
            None => true,
            Some(min) => {
                if self.min_inclusive {
                    version >= min
                } else {
                    version > min
                }
            }
        };

        let upper_ok = match &self.max {
            None => true,
            Some(max) => {
                if self.max_inclusive {
                    version <= max
                } else {
                    version < max
                }
            }
        };

        lower_ok && upper_ok
    }

    /// Returns the lowest version in `versions` that satisfies this range —
    /// the production-correct behavior used by the dependency walker.
    /// Ties (should not occur among distinct versions) resolve to the
    /// first one encountered.
    pub fn find_best_match<'a, I>(&self, versions: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        let mut best: Option<&'a Version> = None;
        for candidate in versions {
            if !self.satisfies(candidate) {
                continue;
            }
            best = match best {
                None => Some(candidate),
                Some(current) if candidate < current => Some(candidate),
                Some(current) => Some(current),
            };
        }
        best
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            return write!(f, "[{}]", self.min.as_ref().unwrap());
        }
        if self.max.is_none() && self.min_inclusive {
            if let Some(min) = &self.min {
                return write!(f, "{min}");
            }
        }
        let open = if self.min_inclusive { '[' } else { '(' };
        let close = if self.max_inclusive { ']' } else { ')' };
        let min_text = self.min.as_ref().map(|v| v.to_string()).unwrap_or_default();
        let max_text = self.max.as_ref().map(|v| v.to_string()).unwrap_or_default();
        write!(f, "{open}{min_text},{max_text}{close}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn exact_pin_accepts_only_that_version() {
        let range = VersionRange::parse("[1.0.0]").unwrap();
        assert!(range.satisfies(&v("1.0.0")));
        assert!(!range.satisfies(&v("1.0.1")));
        assert!(!range.satisfies(&v("0.9.0")));
    }

    #[test]
    fn exclusive_bounds_reject_both_endpoints() {
        let range = VersionRange::parse("(1.0.0, 2.0.0)").unwrap();
        assert!(!range.satisfies(&v("1.0.0")));
        assert!(!range.satisfies(&v("2.0.0")));
        assert!(range.satisfies(&v("1.5.0")));
    }

    #[test]
    fn bare_version_is_open_lower_bound() {
        let range = VersionRange::parse("1.0.0").unwrap();
        assert!(range.satisfies(&v("1.0.0")));
        assert!(range.satisfies(&v("99.0.0")));
        assert!(!range.satisfies(&v("0.9.0")));
    }

    #[test]
    fn whitespace_around_commas_and_brackets_is_ignored() {
        let range = VersionRange::parse(" [ 1.0.0 , 2.0.0 ] ").unwrap();
        assert!(range.satisfies(&v("1.5.0")));
    }

    #[test]
    fn unbounded_sides_always_pass() {
        let range = VersionRange::parse("(,2.0.0]").unwrap();
        assert!(range.satisfies(&v("0.0.1")));
        assert!(range.satisfies(&v("2.0.0")));
        assert!(!range.satisfies(&v("2.0.1")));

        let range = VersionRange::parse("[1.0.0,)").unwrap();
        assert!(range.satisfies(&v("999.0.0")));
        assert!(!range.satisfies(&v("0.0.1")));
    }

    #[test]
    fn find_best_match_favors_lowest_satisfying_version() {
        let versions: Vec<Version> =
            ["1.0.0", "1.5.0", "2.0.0", "2.5.0", "3.0.0"].iter().map(|s| v(s)).collect();
        let range = VersionRange::parse("[1.0.0, 2.0.0]").unwrap();
        let best = range.find_best_match(versions.iter()).unwrap();
        assert_eq!(best, &v("1.0.0"));
    }

    #[test]
    fn find_best_match_none_when_nothing_satisfies() {
        let versions: Vec<Version> = ["0.1.0", "0.2.0"].iter().map(|s| v(s)).collect();
        let range = VersionRange::parse("[1.0.0,)").unwrap();
        assert!(range.find_best_match(versions.iter()).is_none());
    }

    #[test]
    fn rejects_malformed_ranges() {
        assert!(VersionRange::parse("").is_err());
        assert!(VersionRange::parse("[1.0.0").is_err());
        assert!(VersionRange::parse("(,)").is_err());
        assert!(VersionRange::parse("(1.0.0)").is_err());
        assert!(VersionRange::parse("[1.0.0,2.0.0,3.0.0]").is_err());
    }

    #[test]
    fn display_round_trips_common_shapes() {
        assert_eq!(VersionRange::parse("[1.0.0]").unwrap().to_string(), "[1.0.0]");
        assert_eq!(VersionRange::parse("1.0.0").unwrap().to_string(), "1.0.0");
        assert_eq!(VersionRange::parse("[1.0.0,2.0.0)").unwrap().to_string(), "[1.0.0,2.0.0)");
    }
}
