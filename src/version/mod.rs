//! The NuGet version model: parsing, comparison, and normalization.
//!
//! NuGet versions are SemVer plus a legacy four-part variant inherited from
//! `System.Version`. [`Version::parse`] accepts both; [`Version::cmp`]
//! orders them per the rules in the spec (revision ignored when comparing
//! across a legacy/non-legacy pair, metadata never consulted, prerelease
//! labels ranked numeric-below-alphanumeric).

pub mod float_range;
pub mod range;

pub use float_range::{FloatBehavior, FloatRange};
pub use range::VersionRange;

use std::cmp::Ordering;
use std::fmt;

use crate::error::Error;

const CONTEXT: &str = "parse version";

/// A single, immutable NuGet version.
#[derive(Debug, Clone)]
pub struct Version {
    major: u32,
    minor: u32,
    patch: u32,
    revision: u32,
    release_labels: Vec<String>,
    metadata: String,
    is_legacy: bool,
    original_text: String,
}

/// One release-channel label, split for comparison purposes. A label that
/// parses entirely as digits is numeric; numeric labels always rank below
/// alphanumeric ones regardless of value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Label {
    Numeric(u64),
    Alphanumeric(String),
}

impl Label {
    fn classify(raw: &str) -> Label {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = raw.parse::<u64>() {
                return Label::Numeric(n);
            }
        }
        Label::Alphanumeric(raw.to_string())
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Label::Numeric(a), Label::Numeric(b)) => a.cmp(b),
            (Label::Numeric(_), Label::Alphanumeric(_)) => Ordering::Less,
            (Label::Alphanumeric(_), Label::Numeric(_)) => Ordering::Greater,
            (Label::Alphanumeric(a), Label::Alphanumeric(b)) => a.as_str().cmp(b.as_str()),
        }
    }
}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Version {
    /// Parses a NuGet version string per spec §4.1.
    pub fn parse(text: &str) -> Result<Version, Error> {
        if text.is_empty() {
            return Err(Error::invalid_input(CONTEXT, "empty version string"));
        }

        let (rest, metadata) = match text.split_once('+') {
            Some((rest, meta)) => (rest, meta.to_string()),
            None => (text, String::new()),
        };

        let (numeric_part, release_part) = match rest.split_once('-') {
            Some((n, r)) => (n, Some(r)),
            None => (rest, None),
        };

        let numeric_fields: Vec<&str> = numeric_part.split('.').collect();
        if numeric_fields.is_empty() || numeric_fields.len() > 4 {
            return Err(Error::invalid_input(
                CONTEXT,
                format!("expected 1-4 numeric components, got \"{numeric_part}\""),
            ));
        }

        let mut parts = [0u32; 4];
        for (i, field) in numeric_fields.iter().enumerate() {
            parts[i] = parse_numeric_component(field)?;
        }

        let is_legacy = numeric_fields.len() == 4;

        let release_labels = match release_part {
            None => Vec::new(),
            Some("") => {
                return Err(Error::invalid_input(CONTEXT, "empty prerelease component"));
            }
            Some(r) => {
                let mut labels = Vec::new();
                for label in r.split('.') {
                    if label.is_empty() || !label.bytes().all(is_label_byte) {
                        return Err(Error::invalid_input(
                            CONTEXT,
                            format!("invalid prerelease label \"{label}\""),
                        ));
                    }
                    labels.push(label.to_string());
                }
                labels
            }
        };

        Ok(Version {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
            revision: parts[3],
            release_labels,
            metadata,
            is_legacy,
            original_text: text.to_string(),
        })
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn patch(&self) -> u32 {
        self.patch
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn is_legacy(&self) -> bool {
        self.is_legacy
    }

    pub fn release_labels(&self) -> &[String] {
        &self.release_labels
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn original_text(&self) -> &str {
        &self.original_text
    }

    /// A version is prerelease iff at least one release label is present
    /// (empty labels are rejected at parse time, so non-empty `Vec` means
    /// at least one non-empty label).
    pub fn is_prerelease(&self) -> bool {
        !self.release_labels.is_empty()
    }

    /// Canonical textual form: leading zeros stripped, legacy versions
    /// keep all four numeric parts, SemVer versions keep three, labels and
    /// metadata preserved verbatim.
    pub fn to_normalized_string(&self) -> String {
        let mut s = if self.is_legacy {
            format!("{}.{}.{}.{}", self.major, self.minor, self.patch, self.revision)
        } else {
            format!("{}.{}.{}", self.major, self.minor, self.patch)
        };

        if !self.release_labels.is_empty() {
            s.push('-');
            s.push_str(&self.release_labels.join("."));
        }

        if !self.metadata.is_empty() {
            s.push('+');
            s.push_str(&self.metadata);
        }

        s
    }

    fn labels(&self) -> Vec<Label> {
        self.release_labels.iter().map(|l| Label::classify(l)).collect()
    }
}

fn is_label_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-'
}

fn parse_numeric_component(field: &str) -> Result<u32, Error> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::invalid_input(CONTEXT, format!("invalid numeric component \"{field}\"")));
    }
    field
        .parse::<u32>()
        .map_err(|e| Error::invalid_input(CONTEXT, format!("numeric component \"{field}\" out of range: {e}")))
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original_text)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| {
                if self.is_legacy && other.is_legacy {
                    self.revision.cmp(&other.revision)
                } else {
                    Ordering::Equal
                }
            })
            .then_with(|| match (self.is_prerelease(), other.is_prerelease()) {
                (false, false) => Ordering::Equal,
                (false, true) => Ordering::Greater,
                (true, false) => Ordering::Less,
                (true, true) => compare_labels(&self.labels(), &other.labels()),
            })
    }
}

fn compare_labels(a: &[Label], b: &[Label]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = x.cmp(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}
