//! SQLite-backed record store.
//!
//! Records live in one table keyed by `(module_id, record_id)` with the data
//! object stored as JSON text. Field mutations run inside an immediate
//! transaction so the read and the write cannot interleave with another
//! writer, even across processes sharing the file.

use crate::store::{FieldWrite, RecordStore, apply_mutation, check_object};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use modflow_model::{FieldMutation, ModuleData, now_millis};
use modflow_types::{ModuleId, RecordId};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

const SELECT_COLUMNS: &str = "SELECT record_id, module_id, data, created_at, updated_at FROM records";

/// Record store backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        debug!("Opened record store at {}", path.as_ref().display());
        Self::with_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                module_id TEXT NOT NULL,
                record_id TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (module_id, record_id)
            );

            CREATE INDEX IF NOT EXISTS idx_records_created
                ON records (module_id, created_at);
            ",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StorageError::Task("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

type RawRecord = (String, String, String, i64, i64);

fn raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode((record_id, module_id, data, created_at, updated_at): RawRecord) -> StorageResult<ModuleData> {
    Ok(ModuleData {
        id: RecordId::parse(&record_id)
            .map_err(|e| StorageError::InvalidData(format!("record id {record_id:?}: {e}")))?,
        module_id: ModuleId::parse(&module_id)
            .map_err(|e| StorageError::InvalidData(format!("module id {module_id:?}: {e}")))?,
        data: serde_json::from_str(&data)?,
        created_at,
        updated_at,
    })
}

fn load(conn: &Connection, module_id: &ModuleId, record_id: &RecordId) -> StorageResult<Option<ModuleData>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE module_id = ?1 AND record_id = ?2"),
        params![module_id.as_str(), record_id.as_str()],
        raw_record,
    )
    .optional()?
    .map(decode)
    .transpose()
}

fn store(conn: &Connection, record: &ModuleData) -> StorageResult<()> {
    conn.execute(
        "UPDATE records SET data = ?3, updated_at = ?4 WHERE module_id = ?1 AND record_id = ?2",
        params![
            record.module_id.as_str(),
            record.id.as_str(),
            serde_json::to_string(&record.data)?,
            record.updated_at,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, module_id: &ModuleId, record_id: &RecordId) -> StorageResult<Option<ModuleData>> {
        let (module_id, record_id) = (module_id.clone(), record_id.clone());
        self.run(move |conn| load(conn, &module_id, &record_id)).await
    }

    async fn insert(&self, record: &ModuleData) -> StorageResult<()> {
        check_object(&record.data)?;
        let record = record.clone();
        self.run(move |conn| {
            let data = serde_json::to_string(&record.data)?;
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO records (module_id, record_id, data, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.module_id.as_str(),
                    record.id.as_str(),
                    data,
                    record.created_at,
                    record.updated_at,
                ],
            )?;
            if inserted == 0 {
                return Err(StorageError::AlreadyExists(record.id.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn replace_data(
        &self,
        module_id: &ModuleId,
        record_id: &RecordId,
        data: serde_json::Value,
    ) -> StorageResult<ModuleData> {
        check_object(&data)?;
        let (module_id, record_id) = (module_id.clone(), record_id.clone());
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut record = load(&tx, &module_id, &record_id)?
                .ok_or_else(|| StorageError::NotFound(record_id.to_string()))?;
            record.data = data;
            record.updated_at = now_millis().max(record.updated_at);
            store(&tx, &record)?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn mutate_field(
        &self,
        module_id: &ModuleId,
        record_id: &RecordId,
        field: &str,
        mutation: &FieldMutation,
    ) -> StorageResult<FieldWrite> {
        let (module_id, record_id) = (module_id.clone(), record_id.clone());
        let (field, mutation) = (field.to_string(), mutation.clone());
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut record = load(&tx, &module_id, &record_id)?
                .ok_or_else(|| StorageError::NotFound(record_id.to_string()))?;
            let write = apply_mutation(&mut record, &field, &mutation)?;
            if write.changed {
                store(&tx, &record)?;
            }
            tx.commit()?;
            Ok(write)
        })
        .await
    }

    async fn delete(&self, module_id: &ModuleId, record_id: &RecordId) -> StorageResult<Option<ModuleData>> {
        let (module_id, record_id) = (module_id.clone(), record_id.clone());
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let existing = load(&tx, &module_id, &record_id)?;
            if existing.is_some() {
                tx.execute(
                    "DELETE FROM records WHERE module_id = ?1 AND record_id = ?2",
                    params![module_id.as_str(), record_id.as_str()],
                )?;
            }
            tx.commit()?;
            Ok(existing)
        })
        .await
    }

    async fn list(&self, module_id: &ModuleId) -> StorageResult<Vec<ModuleData>> {
        let module_id = module_id.clone();
        self.run(move |conn| {
            let mut stmt =
                conn.prepare(&format!("{SELECT_COLUMNS} WHERE module_id = ?1 ORDER BY created_at, record_id"))?;
            let rows = stmt.query_map(params![module_id.as_str()], raw_record)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(decode(row?)?);
            }
            Ok(records)
        })
        .await
    }

    async fn count(&self, module_id: &ModuleId) -> StorageResult<usize> {
        let module_id = module_id.clone();
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM records WHERE module_id = ?1",
                params![module_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn purge_module(&self, module_id: &ModuleId) -> StorageResult<usize> {
        let module_id = module_id.clone();
        self.run(move |conn| {
            let removed = conn.execute("DELETE FROM records WHERE module_id = ?1", params![module_id.as_str()])?;
            Ok(removed)
        })
        .await
    }
}
