//! Rendering and parsing of record identifiers.
//!
//! An identifier is `CCSSNNNNNNNNNNNNNNNA`: the first-level category in two
//! digits, the second-level category in two digits, the sequence number in
//! fifteen digits, and a trailing `A` version marker. Values that do not fit
//! their field are rejected, never truncated.

use crate::category::CategoryPair;
use crate::config::IdentifierConfig;
use crate::error::{Result, SgidError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Render an identifier from its raw parts.
///
/// Fails with [`SgidError::FormatOverflow`] when a category is above 99 or
/// the sequence is 10^15 or larger.
pub fn format_identifier(first: u32, second: u32, sequence: u64) -> Result<String> {
    Ok(RecordIdentifier::new(CategoryPair::new(first, second)?, sequence)?.to_string())
}

/// A validated record identifier. Its rendering is always
/// [`IdentifierConfig::LENGTH`] characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRecordIdentifier")]
pub struct RecordIdentifier {
    pair: CategoryPair,
    sequence: u64,
}

impl RecordIdentifier {
    /// Build an identifier, checking that every part fits its field.
    pub fn new(pair: CategoryPair, sequence: u64) -> Result<Self> {
        let pair = CategoryPair::new(pair.first(), pair.second())?;
        check_sequence(sequence)?;
        Ok(Self { pair, sequence })
    }

    pub fn pair(&self) -> CategoryPair {
        self.pair
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

#[derive(Deserialize)]
struct RawRecordIdentifier {
    pair: CategoryPair,
    sequence: u64,
}

impl TryFrom<RawRecordIdentifier> for RecordIdentifier {
    type Error = SgidError;

    fn try_from(raw: RawRecordIdentifier) -> Result<Self> {
        RecordIdentifier::new(raw.pair, raw.sequence)
    }
}

/// Check that a sequence number can be rendered into an identifier.
pub(crate) fn check_sequence(sequence: u64) -> Result<()> {
    if sequence > IdentifierConfig::MAX_SEQUENCE {
        return Err(SgidError::FormatOverflow {
            field: "sequence_number",
            value: sequence,
            width: IdentifierConfig::SEQUENCE_WIDTH,
        });
    }
    Ok(())
}

impl fmt::Display for RecordIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0cw$}{:0cw$}{:0sw$}{}",
            self.pair.first(),
            self.pair.second(),
            self.sequence,
            IdentifierConfig::VERSION_MARKER,
            cw = IdentifierConfig::CATEGORY_WIDTH,
            sw = IdentifierConfig::SEQUENCE_WIDTH,
        )
    }
}

impl FromStr for RecordIdentifier {
    type Err = SgidError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: String| SgidError::InvalidIdentifier {
            value: s.to_string(),
            reason,
        };

        if s.len() != IdentifierConfig::LENGTH || !s.is_ascii() {
            return Err(invalid(format!(
                "expected {} ASCII characters",
                IdentifierConfig::LENGTH
            )));
        }

        let digits_end = IdentifierConfig::LENGTH - 1;
        let (digits, marker) = s.split_at(digits_end);
        if !marker.starts_with(IdentifierConfig::VERSION_MARKER) {
            return Err(invalid(format!(
                "expected trailing '{}' marker",
                IdentifierConfig::VERSION_MARKER
            )));
        }
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("expected digits before the marker".to_string()));
        }

        let cw = IdentifierConfig::CATEGORY_WIDTH;
        let parse_err = |e: std::num::ParseIntError| invalid(e.to_string());
        let first: u32 = digits[..cw].parse().map_err(parse_err)?;
        let second: u32 = digits[cw..2 * cw].parse().map_err(parse_err)?;
        let sequence: u64 = digits[2 * cw..].parse().map_err(parse_err)?;

        if sequence == 0 {
            return Err(invalid("sequence numbers start at 1".to_string()));
        }

        RecordIdentifier::new(CategoryPair::new(first, second)?, sequence)
    }
}
