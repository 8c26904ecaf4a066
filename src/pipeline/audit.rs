//! Audit trail.
//!
//! One append-only record per pipeline invocation, emitted exactly once at
//! the terminal state, including refusals and internal errors. Persistence
//! failures are logged and swallowed: the user still gets their answer, and
//! the loss itself is visible in the logs.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::gates::GateOutcome;
use super::types::RefusalReason;

/// Wall-clock duration of one pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLatency {
    pub stage: String,
    pub ms: u64,
}

/// Everything needed to reconstruct why one query produced its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub query_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub retrieved_chunk_ids: Vec<String>,
    pub raw_scores: Vec<f32>,
    pub threshold_used: f32,
    pub accepted_chunk_ids: Vec<String>,
    pub rejected_chunk_ids: Vec<String>,
    pub gate_outcomes: Vec<GateOutcome>,
    pub refusal_reason: Option<RefusalReason>,
    pub stage_latencies: Vec<StageLatency>,
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit store error: {0}")]
    Store(String),

    #[error("audit database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("audit serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only audit persistence.
pub trait AuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Emit a record, logging and swallowing sink failures.
pub fn record(sink: &dyn AuditSink, record: &AuditRecord) {
    if let Err(e) = sink.append(record) {
        tracing::error!(
            query_id = %record.query_id,
            error = %e,
            "audit record lost: sink append failed"
        );
    } else {
        tracing::debug!(query_id = %record.query_id, "audit record persisted");
    }
}

/// In-memory sink for tests and embedded use.
#[derive(Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| AuditError::Store("audit store poisoned".into()))?;
        records.push(record.clone());
        Ok(())
    }
}

/// SQLite-backed sink. Records are stored as JSON rows so the schema never
/// constrains what the record carries.
pub struct SqliteAuditSink {
    conn: Mutex<Connection>,
}

impl SqliteAuditSink {
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, AuditError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AuditError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS audit_records (
                query_id   TEXT NOT NULL,
                created_at TEXT NOT NULL,
                record     TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn count(&self) -> Result<usize, AuditError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AuditError::Store("audit connection poisoned".into()))?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM audit_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl AuditSink for SqliteAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let json = serde_json::to_string(record)?;
        let conn = self
            .conn
            .lock()
            .map_err(|_| AuditError::Store("audit connection poisoned".into()))?;
        conn.execute(
            "INSERT INTO audit_records (query_id, created_at, record) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                record.query_id.to_string(),
                record.timestamp.to_rfc3339(),
                json
            ],
        )?;
        Ok(())
    }
}
