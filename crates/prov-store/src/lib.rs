//! Durable transactional record storage for the provenance ledger.
//!
//! The ledger engine issues every multi-record mutation inside one
//! [`Transaction`]. Records are opaque JSON documents grouped by kind and
//! addressed by string id; the store never interprets their contents.
//!
//! # Storage Backends
//!
//! All backends implement the [`Store`] trait:
//!
//! - [`InMemoryStore`] -- copy-on-write snapshot store with optimistic
//!   conflict detection and JSON snapshot persistence
//!
//! # Design Rules
//!
//! 1. Every transaction reads from one consistent snapshot (no torn reads).
//! 2. Writes are buffered and become visible only at commit, all or nothing.
//! 3. Commit validates every record read or written, and every kind scanned,
//!    against the latest committed state; any change since the snapshot fails
//!    with [`StoreError::Conflict`] and nothing is applied.
//! 4. Dropping a transaction without committing is a rollback.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod record;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use record::{Record, StoredRecord, TransactionExt};
pub use traits::{Store, Transaction};
