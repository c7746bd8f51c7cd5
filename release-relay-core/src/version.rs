//! Version resolution: is the candidate build newer than what the release host last published?
//!
//! Candidates come either from the operator (`VERSION`) or from a storefront listing page, where
//! the package file name encodes the version as `{package}_{major.minor.patch}.0_{arch}__{hash}.msix`.

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{RelayError, Result};

/// A dotted numeric version such as `1.10.0`.
///
/// Ordering and equality compare components as integers, so `1.10.0 > 1.9.0` and
/// `1.09.0 == 1.9.0`. The original text is kept for display only.
#[derive(Debug, Clone)]
pub struct VersionTag {
    text: String,
    parts: Vec<u64>,
}

impl VersionTag {
    pub fn parse(raw: &str) -> Result<Self> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(RelayError::version("empty version string"));
        }
        let parts = text
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(RelayError::version(format!(
                        "{text:?} is not a dotted numeric version"
                    )));
                }
                part.parse::<u64>()
                    .map_err(|e| RelayError::version(format!("{text:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            text: text.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn parts(&self) -> &[u64] {
        &self.parts
    }
}

impl FromStr for VersionTag {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        VersionTag::parse(s)
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialEq for VersionTag {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for VersionTag {}

impl Hash for VersionTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts.hash(state);
    }
}

impl Ord for VersionTag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl PartialOrd for VersionTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Outcome of comparing the published tag with a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Newer {
        published: VersionTag,
        candidate: VersionTag,
    },
    UpToDate {
        published: VersionTag,
        candidate: VersionTag,
    },
}

impl Resolution {
    pub fn is_newer(&self) -> bool {
        matches!(self, Resolution::Newer { .. })
    }

    pub fn candidate(&self) -> &VersionTag {
        match self {
            Resolution::Newer { candidate, .. } | Resolution::UpToDate { candidate, .. } => {
                candidate
            }
        }
    }

    pub fn published(&self) -> &VersionTag {
        match self {
            Resolution::Newer { published, .. } | Resolution::UpToDate { published, .. } => {
                published
            }
        }
    }
}

/// Compare the last published tag against a candidate. Only a strictly greater candidate is newer.
pub fn resolve(published: &str, candidate: &str) -> Result<Resolution> {
    let published = VersionTag::parse(published)?;
    let candidate = VersionTag::parse(candidate)?;
    let newer = candidate > published;
    info!(
        published = %published,
        candidate = %candidate,
        newer,
        "[VERSION] Compared candidate against published release"
    );
    Ok(if newer {
        Resolution::Newer {
            published,
            candidate,
        }
    } else {
        Resolution::UpToDate {
            published,
            candidate,
        }
    })
}

/// A package file found on a storefront listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreListing {
    pub version: VersionTag,
    pub file_name: String,
    pub download_url: String,
}

/// Matches download anchors whose text is `{package}_{x.y.z}.0_{arch}__{hash}.msix`.
#[derive(Debug, Clone)]
pub struct StorePattern {
    regex: Regex,
    description: String,
}

impl StorePattern {
    pub fn new(package: &str, arch: &str) -> Result<Self> {
        let pattern = format!(
            r#"<a\s[^>]*href="([^"]+)"[^>]*>\s*({}_(\d+\.\d+\.\d+)\.0_{}__[0-9a-z]+\.msix)\s*</a>"#,
            regex::escape(package),
            regex::escape(arch),
        );
        let regex = Regex::new(&pattern)
            .map_err(|e| RelayError::config(format!("invalid store pattern: {e}")))?;
        Ok(Self {
            regex,
            description: format!("{package}_<version>.0_{arch}__<hash>.msix"),
        })
    }
}

/// Pull the first matching package anchor out of a storefront listing page.
pub fn parse_store_listing(html: &str, pattern: &StorePattern) -> Result<StoreListing> {
    let captures = pattern
        .regex
        .captures(html)
        .ok_or_else(|| RelayError::ListingMissing {
            pattern: pattern.description.clone(),
        })?;
    // Groups 1..=3 are always present when the pattern matches.
    let download_url = captures[1].replace("&amp;", "&");
    let file_name = captures[2].to_string();
    let version = VersionTag::parse(&captures[3])?;
    debug!(%version, file_name = %file_name, "[VERSION] Found package in store listing");
    Ok(StoreListing {
        version,
        file_name,
        download_url,
    })
}
