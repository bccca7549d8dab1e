//! # Docdex Storage
//!
//! Transactional key/value storage for docdex indexes and document stores.
//!
//! An [`Environment`] holds named trees of ordered byte keys. It allows one
//! [`WriteTransaction`] and any number of [`ReadTransaction`]s at a time;
//! readers see the snapshot that was current when they began.
//!
//! ## Durability
//!
//! Every commit is appended to a [`Journal`] as one framed record
//! (`magic | version | type | len | payload | crc32`). Opening an
//! environment replays the journal: a record cut short by a crash is
//! dropped, anything else that fails to decode stops the open.
//!
//! ## Example
//!
//! ```rust
//! use docdex_storage::{Environment, Readable};
//!
//! let env = Environment::in_memory();
//! let mut tx = env.write_transaction().unwrap();
//! tx.create_tree("Docs").unwrap();
//! tx.put("Docs", &b"users/1"[..], 7i64.to_be_bytes().to_vec()).unwrap();
//! tx.commit().unwrap();
//!
//! let reader = env.read_transaction().unwrap();
//! assert!(reader.get("Docs", b"users/1").is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod context;
mod dir;
mod env;
mod error;
mod file;
mod journal;
mod memory;
mod reader;
mod record;
mod stats;
mod transaction;

pub use context::{ContextPool, TransactionContext};
pub use dir::EnvironmentDir;
pub use env::{CompactionReport, Environment, EnvironmentOptions};
pub use error::{StorageError, StorageResult};
pub use file::FileJournal;
pub use journal::Journal;
pub use memory::MemoryJournal;
pub use reader::JournalReader;
pub use record::{
    compute_crc32, JournalRecord, RecordType, TreeDump, TreeOp, JOURNAL_MAGIC, JOURNAL_VERSION,
};
pub use stats::{EnvironmentStats, StatsSnapshot};
pub use transaction::{ReadTransaction, Readable, TreeReader, WriteTransaction};
