//! Centralized configuration for the sgid library.
//!
//! Identifier layout constants are a compatibility contract with every
//! system that stores previously issued identifiers. Do not change them.

/// Layout of the rendered record identifier `CCSSNNNNNNNNNNNNNNNA`.
pub struct IdentifierConfig;

impl IdentifierConfig {
    pub const CATEGORY_WIDTH: usize = 2;
    pub const SEQUENCE_WIDTH: usize = 15;
    pub const VERSION_MARKER: char = 'A';
    /// Total rendered length: two category fields, the sequence, the marker.
    pub const LENGTH: usize = 2 * Self::CATEGORY_WIDTH + Self::SEQUENCE_WIDTH + 1;
    /// Largest category code that fits in its field.
    pub const MAX_CATEGORY: u32 = 99;
    /// Largest sequence number that fits in its field.
    pub const MAX_SEQUENCE: u64 = 999_999_999_999_999;
}

/// Configuration for the SQLite sequence store.
pub struct StoreConfig;

impl StoreConfig {
    pub const APP_CONFIG_DIR_NAME: &'static str = "sgid";
    pub const DB_FILENAME: &'static str = "identifiers.db";
    pub const BUSY_TIMEOUT_MS: u64 = 5_000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_length() {
        assert_eq!(IdentifierConfig::LENGTH, 20);
    }

    #[test]
    fn test_limits_match_widths() {
        assert_eq!(
            IdentifierConfig::MAX_CATEGORY.to_string().len(),
            IdentifierConfig::CATEGORY_WIDTH
        );
        assert_eq!(
            IdentifierConfig::MAX_SEQUENCE.to_string().len(),
            IdentifierConfig::SEQUENCE_WIDTH
        );
    }
}
