//! Sequence store trait and row types.

use crate::category::CategoryPair;
use crate::error::Result;
use crate::identifier::RecordIdentifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One allocated identifier: the sequence number a record holds within its
/// category pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySequence {
    pub pair: CategoryPair,
    pub sequence_number: u64,
    pub record_key: String,
    pub allocated_at: DateTime<Utc>,
}

impl CategorySequence {
    /// The identifier this row renders to.
    pub fn identifier(&self) -> Result<RecordIdentifier> {
        RecordIdentifier::new(self.pair, self.sequence_number)
    }
}

/// Consistency summary for one category pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairAudit {
    pub pair: CategoryPair,
    /// Number of allocated rows.
    pub row_count: u64,
    /// Highest allocated sequence number, if any row exists.
    pub highest_sequence: Option<u64>,
    /// Value of the pair's counter.
    pub counter: u64,
    /// Sequence numbers below `highest_sequence` that no row holds.
    pub gaps: Vec<u64>,
}

impl PairAudit {
    /// Whether the pair's rows form the series `1..=counter` exactly.
    pub fn is_consistent(&self) -> bool {
        self.gaps.is_empty() && self.highest_sequence.unwrap_or(0) == self.counter
    }
}

/// Consistency summary across all category pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub total_rows: u64,
    pub pairs: Vec<PairAudit>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.pairs.iter().all(PairAudit::is_consistent)
    }
}

/// Sequence numbers in `1..=highest` missing from a sorted list.
pub(crate) fn find_gaps(sorted_sequences: &[u64]) -> Vec<u64> {
    let mut gaps = Vec::new();
    let mut expected = 1u64;
    for &seq in sorted_sequences {
        while expected < seq {
            gaps.push(expected);
            expected += 1;
        }
        expected = seq + 1;
    }
    gaps
}

/// Persistence handle for category-scoped sequence numbers.
///
/// Implementations must make `allocate` atomic per category pair: concurrent
/// calls for the same pair receive distinct, consecutive sequence numbers,
/// and a failed call leaves no row behind and does not advance the counter.
/// All operations are synchronous to match rusqlite's API.
pub trait SequenceStore: Send + Sync {
    /// Assign the next sequence number in `pair` to `record_key`.
    ///
    /// Fails with `DuplicateAllocation` if the key already holds a row.
    fn allocate(&self, record_key: &str, pair: CategoryPair) -> Result<CategorySequence>;

    /// Record a previously issued identifier for `record_key` verbatim.
    ///
    /// The pair's counter is raised to at least the adopted sequence.
    /// Fails with `SequenceConflict` if another record holds that sequence.
    fn adopt(&self, record_key: &str, identifier: RecordIdentifier) -> Result<CategorySequence>;

    /// All rows owned by `record_key`. More than one means the table is corrupt.
    fn rows_for_key(&self, record_key: &str) -> Result<Vec<CategorySequence>>;

    /// All rows in `pair`, ordered by sequence number.
    fn sequences_for_pair(&self, pair: CategoryPair) -> Result<Vec<CategorySequence>>;

    /// Check every pair for gaps and counter drift.
    fn audit(&self) -> Result<AuditReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_gaps() {
        assert!(find_gaps(&[]).is_empty());
        assert!(find_gaps(&[1, 2, 3]).is_empty());
        assert_eq!(find_gaps(&[2, 5]), vec![1, 3, 4]);
        assert_eq!(find_gaps(&[1, 4]), vec![2, 3]);
    }

    #[test]
    fn test_pair_audit_consistency() {
        let pair = CategoryPair::new(1, 2).unwrap();
        let ok = PairAudit {
            pair,
            row_count: 3,
            highest_sequence: Some(3),
            counter: 3,
            gaps: vec![],
        };
        assert!(ok.is_consistent());

        let drifted = PairAudit { counter: 4, ..ok.clone() };
        assert!(!drifted.is_consistent());

        let gapped = PairAudit {
            row_count: 2,
            gaps: vec![2],
            ..ok
        };
        assert!(!gapped.is_consistent());
    }
}
