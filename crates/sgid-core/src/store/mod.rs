//! Persistence for category-scoped sequence numbers.
//!
//! Two backends implement [`SequenceStore`]:
//! - [`SqliteSequenceStore`]: durable, shared across threads and processes
//! - [`MemorySequenceStore`]: volatile, one lock per category pair

mod memory;
mod sqlite;
mod traits;

pub use memory::MemorySequenceStore;
pub use sqlite::SqliteSequenceStore;
pub use traits::{AuditReport, CategorySequence, PairAudit, SequenceStore};
