//! In-process sequence store with one lock per category pair.
//!
//! Allocations in different category pairs never contend on the same lock;
//! only the short record-key reservation step is shared.

use super::traits::{find_gaps, AuditReport, CategorySequence, PairAudit, SequenceStore};
use crate::category::CategoryPair;
use crate::error::{Result, SgidError};
use crate::identifier::{check_sequence, RecordIdentifier};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
enum KeySlot {
    /// An allocation for this key is in flight.
    Reserved,
    Allocated(CategoryPair),
}

#[derive(Debug, Default)]
struct PairLedger {
    counter: u64,
    rows: BTreeMap<u64, CategorySequence>,
}

/// Volatile [`SequenceStore`] for tests and single-process hosts.
#[derive(Debug, Default)]
pub struct MemorySequenceStore {
    keys: Mutex<HashMap<String, KeySlot>>,
    pairs: RwLock<HashMap<CategoryPair, Arc<Mutex<PairLedger>>>>,
}

fn poisoned(what: &str) -> SgidError {
    SgidError::Database {
        message: format!("Failed to acquire {} lock", what),
        source: None,
    }
}

impl MemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_keys(&self) -> Result<MutexGuard<'_, HashMap<String, KeySlot>>> {
        self.keys.lock().map_err(|_| poisoned("record key"))
    }

    fn ledger(&self, pair: CategoryPair) -> Result<Arc<Mutex<PairLedger>>> {
        {
            let pairs = self.pairs.read().map_err(|_| poisoned("category map"))?;
            if let Some(ledger) = pairs.get(&pair) {
                return Ok(Arc::clone(ledger));
            }
        }
        let mut pairs = self.pairs.write().map_err(|_| poisoned("category map"))?;
        Ok(Arc::clone(pairs.entry(pair).or_default()))
    }

    fn reserve_key(&self, record_key: &str) -> Result<()> {
        let mut keys = self.lock_keys()?;
        if keys.contains_key(record_key) {
            return Err(SgidError::DuplicateAllocation {
                record_key: record_key.to_string(),
            });
        }
        keys.insert(record_key.to_string(), KeySlot::Reserved);
        Ok(())
    }

    /// Finish or roll back a reservation made by `reserve_key`.
    fn settle_key(&self, record_key: &str, outcome: Option<CategoryPair>) -> Result<()> {
        let mut keys = self.lock_keys()?;
        match outcome {
            Some(pair) => {
                keys.insert(record_key.to_string(), KeySlot::Allocated(pair));
            }
            None => {
                keys.remove(record_key);
            }
        }
        Ok(())
    }

    fn with_reserved_key<F>(
        &self,
        record_key: &str,
        pair: CategoryPair,
        write: F,
    ) -> Result<CategorySequence>
    where
        F: FnOnce(&mut PairLedger) -> Result<CategorySequence>,
    {
        self.reserve_key(record_key)?;

        let result = self.ledger(pair).and_then(|ledger| {
            let mut ledger = ledger.lock().map_err(|_| poisoned("category pair"))?;
            write(&mut ledger)
        });

        self.settle_key(record_key, result.as_ref().ok().map(|row| row.pair))?;
        result
    }
}

impl SequenceStore for MemorySequenceStore {
    fn allocate(&self, record_key: &str, pair: CategoryPair) -> Result<CategorySequence> {
        let row = self.with_reserved_key(record_key, pair, |ledger| {
            let sequence_number = ledger.counter + 1;
            check_sequence(sequence_number)?;

            let row = CategorySequence {
                pair,
                sequence_number,
                record_key: record_key.to_string(),
                allocated_at: Utc::now(),
            };
            ledger.counter = sequence_number;
            ledger.rows.insert(sequence_number, row.clone());
            Ok(row)
        })?;

        debug!(
            "Allocated sequence {} in category {} to record {}",
            row.sequence_number, pair, record_key
        );
        Ok(row)
    }

    fn adopt(&self, record_key: &str, identifier: RecordIdentifier) -> Result<CategorySequence> {
        if identifier.sequence() == 0 {
            return Err(SgidError::validation(
                "sequence_number",
                "adopted sequence numbers start at 1",
            ));
        }

        let pair = identifier.pair();
        let sequence = identifier.sequence();
        self.with_reserved_key(record_key, pair, |ledger| {
            if ledger.rows.contains_key(&sequence) {
                return Err(SgidError::SequenceConflict {
                    first: pair.first(),
                    second: pair.second(),
                    sequence,
                });
            }

            let row = CategorySequence {
                pair,
                sequence_number: sequence,
                record_key: record_key.to_string(),
                allocated_at: Utc::now(),
            };
            ledger.counter = ledger.counter.max(sequence);
            ledger.rows.insert(sequence, row.clone());
            Ok(row)
        })
    }

    fn rows_for_key(&self, record_key: &str) -> Result<Vec<CategorySequence>> {
        let slot = self.lock_keys()?.get(record_key).copied();
        let pair = match slot {
            Some(KeySlot::Allocated(pair)) => pair,
            Some(KeySlot::Reserved) | None => return Ok(Vec::new()),
        };

        let ledger = self.ledger(pair)?;
        let ledger = ledger.lock().map_err(|_| poisoned("category pair"))?;
        Ok(ledger
            .rows
            .values()
            .filter(|row| row.record_key == record_key)
            .cloned()
            .collect())
    }

    fn sequences_for_pair(&self, pair: CategoryPair) -> Result<Vec<CategorySequence>> {
        let ledger = {
            let pairs = self.pairs.read().map_err(|_| poisoned("category map"))?;
            match pairs.get(&pair) {
                Some(ledger) => Arc::clone(ledger),
                None => return Ok(Vec::new()),
            }
        };
        let ledger = ledger.lock().map_err(|_| poisoned("category pair"))?;
        Ok(ledger.rows.values().cloned().collect())
    }

    fn audit(&self) -> Result<AuditReport> {
        let ledgers: BTreeMap<CategoryPair, Arc<Mutex<PairLedger>>> = self
            .pairs
            .read()
            .map_err(|_| poisoned("category map"))?
            .iter()
            .map(|(pair, ledger)| (*pair, Arc::clone(ledger)))
            .collect();

        let mut report = AuditReport::default();
        for (pair, ledger) in ledgers {
            let ledger = ledger.lock().map_err(|_| poisoned("category pair"))?;
            // Ledgers created by a failed first allocation hold nothing.
            if ledger.counter == 0 && ledger.rows.is_empty() {
                continue;
            }
            let sequences: Vec<u64> = ledger.rows.keys().copied().collect();
            report.total_rows += sequences.len() as u64;
            report.pairs.push(PairAudit {
                pair,
                row_count: sequences.len() as u64,
                highest_sequence: sequences.last().copied(),
                counter: ledger.counter,
                gaps: find_gaps(&sequences),
            });
        }
        Ok(report)
    }
}
