//! sgid core - category-scoped record identifiers for catalog records.
//!
//! Every catalog record filed under a two-level category receives a
//! sequence number unique within that category pair, rendered as the
//! 20-character identifier `CCSSNNNNNNNNNNNNNNNA`.
//!
//! # Example
//!
//! ```rust,no_run
//! use sgid_core::{RecordIdentifierAllocator, SqliteSequenceStore};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! fn main() -> sgid_core::Result<()> {
//!     let store = SqliteSequenceStore::open_at(Path::new("identifiers.db"))?;
//!     let allocator = RecordIdentifierAllocator::new(Arc::new(store));
//!
//!     let sequence = allocator.allocate("3f1c2a9e-record", 3, 7)?;
//!     println!("sequence {}", sequence);
//!     println!("identifier {}", allocator.lookup("3f1c2a9e-record")?);
//!     Ok(())
//! }
//! ```

pub mod allocator;
pub mod category;
pub mod config;
pub mod error;
pub mod identifier;
pub mod platform;
pub mod store;

// Re-export commonly used types
pub use allocator::{AllocationPolicy, CatalogRecord, IdentifierDisplay, RecordIdentifierAllocator};
pub use category::CategoryPair;
pub use error::{Result, SgidError};
pub use identifier::{format_identifier, RecordIdentifier};
pub use store::{
    AuditReport, CategorySequence, MemorySequenceStore, PairAudit, SequenceStore,
    SqliteSequenceStore,
};
