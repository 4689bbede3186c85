//! SQLite-backed sequence store.

use super::traits::{find_gaps, AuditReport, CategorySequence, PairAudit, SequenceStore};
use crate::category::CategoryPair;
use crate::config::StoreConfig;
use crate::error::{Result, SgidError};
use crate::identifier::{check_sequence, RecordIdentifier};
use chrono::{DateTime, Utc};
use rusqlite::{
    ffi, params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const ROW_COLUMNS: &str =
    "first_level_category, second_level_category, sequence_number, record_key, allocated_at";

/// SQLite-backed store for category-scoped sequence numbers.
///
/// Each pair's counter lives in `category_counters` and is advanced with an
/// atomic upsert inside a `BEGIN IMMEDIATE` transaction together with the
/// row insert, so concurrent writers (threads sharing a handle, or separate
/// handles and processes on the same file) are serialized by SQLite's write
/// lock and a failed allocation rolls the counter back with it.
pub struct SqliteSequenceStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSequenceStore {
    /// Open the store at the default platform location.
    pub fn open() -> Result<Self> {
        let db_path = crate::platform::default_db_path()?;
        Self::open_at(&db_path)
    }

    /// Open the store at a specific path.
    ///
    /// Creates the database and parent directories if they don't exist.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SgidError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| SgidError::Database {
            message: format!("Failed to open identifier database: {}", e),
            source: Some(e),
        })?;
        debug!("Opened identifier database at {}", db_path.display());
        Self::from_connection(conn)
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;
        Self::reconcile_counters(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA busy_timeout={};\n\
             PRAGMA journal_mode=WAL;\n\
             PRAGMA synchronous=NORMAL;",
            StoreConfig::BUSY_TIMEOUT_MS,
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS record_identifiers (
                first_level_category INTEGER NOT NULL
                    CHECK (first_level_category BETWEEN 0 AND 99),
                second_level_category INTEGER NOT NULL
                    CHECK (second_level_category BETWEEN 0 AND 99),
                sequence_number INTEGER NOT NULL CHECK (sequence_number >= 1),
                record_key TEXT NOT NULL UNIQUE,
                allocated_at TEXT NOT NULL,
                PRIMARY KEY (first_level_category, second_level_category, sequence_number)
            );

            CREATE TABLE IF NOT EXISTS category_counters (
                first_level_category INTEGER NOT NULL,
                second_level_category INTEGER NOT NULL,
                last_sequence INTEGER NOT NULL,
                PRIMARY KEY (first_level_category, second_level_category)
            );",
        )
        .map_err(|e| SgidError::Database {
            message: format!("Failed to initialize identifier schema: {}", e),
            source: Some(e),
        })?;
        Ok(())
    }

    /// Raise every counter to at least the highest sequence stored for its
    /// pair. Rows written by an older schema or copied in by hand never get
    /// their sequence handed out a second time.
    fn reconcile_counters(conn: &Connection) -> Result<()> {
        let changed = conn.execute(
            "INSERT INTO category_counters
                 (first_level_category, second_level_category, last_sequence)
             SELECT first_level_category, second_level_category, MAX(sequence_number)
             FROM record_identifiers WHERE true
             GROUP BY first_level_category, second_level_category
             ON CONFLICT(first_level_category, second_level_category) DO UPDATE SET
                 last_sequence = MAX(last_sequence, excluded.last_sequence)
             WHERE excluded.last_sequence > last_sequence",
            [],
        )?;
        if changed > 0 {
            info!("Reconciled {} category counters with stored rows", changed);
        }
        Ok(())
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SgidError::Database {
            message: "Failed to acquire identifier store connection lock".to_string(),
            source: None,
        })
    }

    fn begin(conn: &mut Connection) -> Result<Transaction<'_>> {
        conn.transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| SgidError::Database {
                message: format!("Failed to begin allocation transaction: {}", e),
                source: Some(e),
            })
    }

    fn ensure_key_free(tx: &Transaction<'_>, record_key: &str) -> Result<()> {
        let taken = tx
            .query_row(
                "SELECT 1 FROM record_identifiers WHERE record_key = ?1",
                params![record_key],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if taken {
            return Err(SgidError::DuplicateAllocation {
                record_key: record_key.to_string(),
            });
        }
        Ok(())
    }

    fn insert_row(tx: &Transaction<'_>, row: &CategorySequence) -> Result<()> {
        let result = tx.execute(
            "INSERT INTO record_identifiers
                 (first_level_category, second_level_category, sequence_number,
                  record_key, allocated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.pair.first(),
                row.pair.second(),
                to_sql_sequence(row.sequence_number),
                row.record_key,
                row.allocated_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                match err.extended_code {
                    ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Err(SgidError::SequenceConflict {
                        first: row.pair.first(),
                        second: row.pair.second(),
                        sequence: row.sequence_number,
                    }),
                    ffi::SQLITE_CONSTRAINT_UNIQUE => Err(SgidError::DuplicateAllocation {
                        record_key: row.record_key.clone(),
                    }),
                    _ => Err(rusqlite::Error::SqliteFailure(err, None).into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read_counter(conn: &Connection, pair: CategoryPair) -> Result<u64> {
        let value: Option<i64> = conn
            .query_row(
                "SELECT last_sequence FROM category_counters
                 WHERE first_level_category = ?1 AND second_level_category = ?2",
                params![pair.first(), pair.second()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(from_sql_sequence).unwrap_or(0))
    }
}

fn to_sql_sequence(sequence: u64) -> i64 {
    // Sequences are bounded by IdentifierConfig::MAX_SEQUENCE, well inside i64.
    i64::try_from(sequence).unwrap_or(i64::MAX)
}

fn from_sql_sequence(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// A `record_identifiers` row as stored, before its codes are checked.
struct StoredRow {
    first: u32,
    second: u32,
    sequence_number: u64,
    record_key: String,
    allocated_at: DateTime<Utc>,
}

impl StoredRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        let allocated_at: String = row.get(4)?;
        let allocated_at = DateTime::parse_from_rfc3339(&allocated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

        Ok(Self {
            first: row.get(0)?,
            second: row.get(1)?,
            sequence_number: from_sql_sequence(row.get(2)?),
            record_key: row.get(3)?,
            allocated_at,
        })
    }

    /// Rows written before the category checks existed may hold codes that
    /// cannot be rendered; those fail with `FormatOverflow`.
    fn into_sequence(self) -> Result<CategorySequence> {
        Ok(CategorySequence {
            pair: CategoryPair::new(self.first, self.second)?,
            sequence_number: self.sequence_number,
            record_key: self.record_key,
            allocated_at: self.allocated_at,
        })
    }
}

fn collect_rows(
    rows: impl Iterator<Item = rusqlite::Result<StoredRow>>,
) -> Result<Vec<CategorySequence>> {
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?.into_sequence()?);
    }
    Ok(entries)
}

fn read_pair(row: &Row<'_>) -> rusqlite::Result<(u32, u32)> {
    Ok((row.get(0)?, row.get(1)?))
}

impl SequenceStore for SqliteSequenceStore {
    fn allocate(&self, record_key: &str, pair: CategoryPair) -> Result<CategorySequence> {
        let mut conn = self.lock_conn()?;
        let tx = Self::begin(&mut conn)?;

        Self::ensure_key_free(&tx, record_key)?;

        let next: i64 = tx.query_row(
            "INSERT INTO category_counters
                 (first_level_category, second_level_category, last_sequence)
             VALUES (?1, ?2, 1)
             ON CONFLICT(first_level_category, second_level_category) DO UPDATE SET
                 last_sequence = last_sequence + 1
             RETURNING last_sequence",
            params![pair.first(), pair.second()],
            |row| row.get(0),
        )?;
        let sequence_number = from_sql_sequence(next);
        check_sequence(sequence_number)?;

        let row = CategorySequence {
            pair,
            sequence_number,
            record_key: record_key.to_string(),
            allocated_at: Utc::now(),
        };
        Self::insert_row(&tx, &row)?;
        tx.commit()?;

        debug!(
            "Allocated sequence {} in category {} to record {}",
            sequence_number, pair, record_key
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

        let mut conn = self.lock_conn()?;
        let tx = Self::begin(&mut conn)?;

        Self::ensure_key_free(&tx, record_key)?;

        let row = CategorySequence {
            pair: identifier.pair(),
            sequence_number: identifier.sequence(),
            record_key: record_key.to_string(),
            allocated_at: Utc::now(),
        };
        Self::insert_row(&tx, &row)?;

        tx.execute(
            "INSERT INTO category_counters
                 (first_level_category, second_level_category, last_sequence)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(first_level_category, second_level_category) DO UPDATE SET
                 last_sequence = MAX(last_sequence, excluded.last_sequence)",
            params![
                identifier.pair().first(),
                identifier.pair().second(),
                to_sql_sequence(identifier.sequence())
            ],
        )?;
        tx.commit()?;

        debug!("Adopted identifier {} for record {}", identifier, record_key);
        Ok(row)
    }

    fn rows_for_key(&self, record_key: &str) -> Result<Vec<CategorySequence>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM record_identifiers WHERE record_key = ?1",
            ROW_COLUMNS
        ))?;

        let rows = stmt.query_map(params![record_key], StoredRow::read)?;
        collect_rows(rows)
    }

    fn sequences_for_pair(&self, pair: CategoryPair) -> Result<Vec<CategorySequence>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM record_identifiers
             WHERE first_level_category = ?1 AND second_level_category = ?2
             ORDER BY sequence_number",
            ROW_COLUMNS
        ))?;

        let rows = stmt.query_map(params![pair.first(), pair.second()], StoredRow::read)?;
        collect_rows(rows)
    }

    fn audit(&self) -> Result<AuditReport> {
        let conn = self.lock_conn()?;

        let mut by_pair: BTreeMap<CategoryPair, Vec<u64>> = BTreeMap::new();
        let mut stmt = conn.prepare(
            "SELECT first_level_category, second_level_category, sequence_number
             FROM record_identifiers
             ORDER BY first_level_category, second_level_category, sequence_number",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((read_pair(row)?, from_sql_sequence(row.get(2)?)))
        })?;
        for row in rows {
            let ((first, second), sequence) = row?;
            let pair = CategoryPair::new(first, second)?;
            by_pair.entry(pair).or_default().push(sequence);
        }
        drop(stmt);

        let mut counter_stmt = conn.prepare(
            "SELECT first_level_category, second_level_category FROM category_counters",
        )?;
        let counter_pairs: Vec<(u32, u32)> = counter_stmt
            .query_map([], read_pair)?
            .collect::<rusqlite::Result<_>>()?;
        drop(counter_stmt);
        for (first, second) in counter_pairs {
            by_pair.entry(CategoryPair::new(first, second)?).or_default();
        }

        let mut report = AuditReport::default();
        for (pair, sequences) in by_pair {
            let counter = Self::read_counter(&conn, pair)?;
            report.total_rows += sequences.len() as u64;
            report.pairs.push(PairAudit {
                pair,
                row_count: sequences.len() as u64,
                highest_sequence: sequences.last().copied(),
                counter,
                gaps: find_gaps(&sequences),
            });
        }

        Ok(report)
    }
}
