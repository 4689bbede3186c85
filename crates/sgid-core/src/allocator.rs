//! Record identifier allocation.
//!
//! [`RecordIdentifierAllocator`] is the entry point used by the record
//! creation pipeline and by display code. It owns no state of its own: the
//! persistence handle is injected at construction.

use crate::category::CategoryPair;
use crate::error::{Result, SgidError};
use crate::identifier::{format_identifier, RecordIdentifier};
use crate::store::{CategorySequence, SequenceStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What to do when allocation fails after a record has been created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// Return the error to the caller.
    #[default]
    FailFast,
    /// Log the error and report the record as having no identifier.
    BestEffort,
}

/// The part of a catalog record the allocator needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// The catalog's own unique id for the record.
    pub id: String,
    /// Dotted category code such as `"3.07"`, if one is assigned.
    pub category: Option<String>,
}

/// Identifier as shown on pages and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "identifier", rename_all = "snake_case")]
pub enum IdentifierDisplay {
    Available(String),
    Unavailable,
}

impl fmt::Display for IdentifierDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierDisplay::Available(id) => f.write_str(id),
            IdentifierDisplay::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// Assigns category-scoped sequence numbers and renders record identifiers.
pub struct RecordIdentifierAllocator<S: SequenceStore + ?Sized> {
    store: Arc<S>,
}

impl<S: SequenceStore + ?Sized> Clone for RecordIdentifierAllocator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

fn check_record_key(record_key: &str) -> Result<()> {
    if record_key.trim().is_empty() {
        return Err(SgidError::validation("record_key", "must not be empty"));
    }
    Ok(())
}

impl<S: SequenceStore + ?Sized> RecordIdentifierAllocator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying persistence handle.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Assign the next sequence number in `(first, second)` to `record_key`.
    ///
    /// Category codes are not checked against any taxonomy, only against the
    /// two-digit identifier fields.
    pub fn allocate(&self, record_key: &str, first: u32, second: u32) -> Result<u64> {
        let pair = CategoryPair::new(first, second)?;
        Ok(self.allocate_pair(record_key, pair)?.sequence_number)
    }

    /// Like [`allocate`](Self::allocate) but returns the stored row.
    pub fn allocate_pair(&self, record_key: &str, pair: CategoryPair) -> Result<CategorySequence> {
        check_record_key(record_key)?;
        self.store.allocate(record_key, pair)
    }

    /// Record an identifier that was issued before this store existed.
    pub fn adopt(&self, record_key: &str, identifier: &str) -> Result<CategorySequence> {
        check_record_key(record_key)?;
        let identifier: RecordIdentifier = identifier.trim().parse()?;
        self.store.adopt(record_key, identifier)
    }

    /// The identifier allocated to `record_key`.
    pub fn lookup_identifier(&self, record_key: &str) -> Result<RecordIdentifier> {
        let mut rows = self.store.rows_for_key(record_key)?;
        match rows.len() {
            0 => Err(SgidError::NotFound {
                record_key: record_key.to_string(),
            }),
            1 => rows.remove(0).identifier(),
            n => Err(SgidError::Integrity {
                record_key: record_key.to_string(),
                rows: n,
            }),
        }
    }

    /// The rendered identifier allocated to `record_key`.
    pub fn lookup(&self, record_key: &str) -> Result<String> {
        Ok(self.lookup_identifier(record_key)?.to_string())
    }

    /// Render an identifier from raw parts without touching the store.
    pub fn format(first: u32, second: u32, sequence: u64) -> Result<String> {
        format_identifier(first, second, sequence)
    }

    /// Identifier for display code, which must never fail the page.
    pub fn display_identifier(&self, record_key: &str) -> IdentifierDisplay {
        match self.lookup(record_key) {
            Ok(id) => IdentifierDisplay::Available(id),
            Err(SgidError::NotFound { .. }) => IdentifierDisplay::Unavailable,
            Err(e) => {
                warn!("Could not look up identifier for {}: {}", record_key, e);
                IdentifierDisplay::Unavailable
            }
        }
    }

    /// Hook for the record creation pipeline, called once after the record
    /// is durably created.
    ///
    /// Records without a category get no identifier. Under
    /// [`AllocationPolicy::BestEffort`] failures are logged and reported as
    /// `Ok(None)`; the record itself is never rolled back from here.
    pub fn on_record_created(
        &self,
        record: &CatalogRecord,
        policy: AllocationPolicy,
    ) -> Result<Option<CategorySequence>> {
        let category = match record.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => {
                debug!("Record {} has no category, skipping identifier", record.id);
                return Ok(None);
            }
        };

        let result = category
            .parse::<CategoryPair>()
            .and_then(|pair| self.allocate_pair(&record.id, pair));

        match (result, policy) {
            (Ok(row), _) => Ok(Some(row)),
            (Err(e), AllocationPolicy::FailFast) => Err(e),
            (Err(e), AllocationPolicy::BestEffort) => {
                error!(
                    "Identifier allocation failed for record {} (category {}): {}",
                    record.id, category, e
                );
                Ok(None)
            }
        }
    }
}
