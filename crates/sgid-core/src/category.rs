//! Two-level category codes.
//!
//! Catalog records carry their category as a dotted string such as `"3.07"`
//! or `"03.7"`; each side is a non-negative integer with no fixed input
//! width. Rendering always uses the canonical `{first}.{second:02}` form.

use crate::config::IdentifierConfig;
use crate::error::{Result, SgidError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The (first level, second level) classification a record is filed under.
///
/// Both codes always fit the identifier's two-digit fields: the only ways
/// to obtain a pair are [`CategoryPair::new`], parsing, and deserializing,
/// and all three go through the same width check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawCategoryPair")]
pub struct CategoryPair {
    first: u32,
    second: u32,
}

impl CategoryPair {
    /// Build a pair, rejecting codes that do not fit the identifier's
    /// two-digit category fields.
    pub fn new(first: u32, second: u32) -> Result<Self> {
        check_code("first_level_category", first)?;
        check_code("second_level_category", second)?;
        Ok(Self { first, second })
    }

    pub fn first(&self) -> u32 {
        self.first
    }

    pub fn second(&self) -> u32 {
        self.second
    }
}

/// Wire shape of a pair before validation.
#[derive(Deserialize)]
struct RawCategoryPair {
    first: u32,
    second: u32,
}

impl TryFrom<RawCategoryPair> for CategoryPair {
    type Error = SgidError;

    fn try_from(raw: RawCategoryPair) -> Result<Self> {
        CategoryPair::new(raw.first, raw.second)
    }
}

fn check_code(field: &'static str, value: u32) -> Result<()> {
    if value > IdentifierConfig::MAX_CATEGORY {
        return Err(SgidError::FormatOverflow {
            field,
            value: u64::from(value),
            width: IdentifierConfig::CATEGORY_WIDTH,
        });
    }
    Ok(())
}

impl fmt::Display for CategoryPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.first, self.second)
    }
}

impl FromStr for CategoryPair {
    type Err = SgidError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let invalid = |reason: &str| SgidError::InvalidCategory {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let (first, second) = trimmed
            .split_once('.')
            .ok_or_else(|| invalid("expected two dot-separated codes"))?;
        if second.contains('.') {
            return Err(invalid("expected exactly one dot"));
        }

        let first = parse_code(first).ok_or_else(|| invalid("first level is not a number"))?;
        let second = parse_code(second).ok_or_else(|| invalid("second level is not a number"))?;

        CategoryPair::new(first, second)
    }
}

/// Parse a bare run of ASCII digits. `str::parse` alone accepts a leading `+`.
fn parse_code(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}
