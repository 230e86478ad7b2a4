//! Dataset version tags and update comparison.
//!
//! Versions are dotted integer triples ("1.4.2"). Comparison is numeric,
//! left to right; missing parts count as zero, so "2.0" equals "2.0.0".
//! Plain string comparison would order "1.10" before "1.2".

use color_eyre::{eyre::eyre, Report};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A dataset version tag.
///
/// Serialized as its string form ("X.Y.Z") wherever it appears in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Version {
  pub major: u32,
  pub minor: u32,
  pub patch: u32,
}

impl Version {
  pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
    Self {
      major,
      minor,
      patch,
    }
  }
}

impl FromStr for Version {
  type Err = Report;

  fn from_str(s: &str) -> Result<Self, Report> {
    let s = s.trim();
    if s.is_empty() {
      return Err(eyre!("empty version string"));
    }

    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() > 3 {
      return Err(eyre!("version '{}' has more than three parts", s));
    }

    let mut nums = [0u32; 3];
    for (i, part) in parts.iter().enumerate() {
      nums[i] = part
        .parse()
        .map_err(|_| eyre!("version '{}' has a non-numeric part '{}'", s, part))?;
    }

    Ok(Self::new(nums[0], nums[1], nums[2]))
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
  }
}

impl From<Version> for String {
  fn from(v: Version) -> Self {
    v.to_string()
  }
}

impl TryFrom<String> for Version {
  type Error = Report;

  fn try_from(s: String) -> Result<Self, Report> {
    s.parse()
  }
}
