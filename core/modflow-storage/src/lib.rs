//! Record storage for modflow.
//!
//! Records are arbitrary JSON objects owned by a module. Two backends
//! implement [`RecordStore`]:
//!
//! - [`MemoryRecordStore`]: process-local, for tests and embedding
//! - [`SqliteRecordStore`]: a single SQLite file, data stored as JSON text
//!
//! Both apply [`FieldMutation`](modflow_model::FieldMutation)s atomically
//! per record and skip writes that would not change the stored value.

mod error;
mod memory;
mod sqlite;
mod store;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;
pub use store::{FieldWrite, RecordStore, loosely_equal};
