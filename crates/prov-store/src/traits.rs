use crate::error::StoreResult;
use crate::record::StoredRecord;

/// A transactional record store.
///
/// Implementations must provide at least snapshot isolation and must reject
/// a commit whose read set changed underneath it (no write skew).
pub trait Store: Send + Sync {
    type Tx: Transaction;

    /// Open a unit of work over a consistent snapshot.
    fn begin_transaction(&self) -> StoreResult<Self::Tx>;
}

/// One unit of work against a [`Store`].
///
/// Reads see the transaction's own buffered writes first, then the snapshot
/// taken at [`Store::begin_transaction`].
pub trait Transaction {
    /// Read a record. Returns `Ok(None)` if it does not exist.
    fn read(&mut self, kind: &str, id: &str) -> StoreResult<Option<StoredRecord>>;

    /// Buffer a write; visible to later reads in this transaction only.
    fn write(&mut self, kind: &str, id: &str, record: StoredRecord) -> StoreResult<()>;

    /// Every record of one kind, ordered by id.
    fn scan(&mut self, kind: &str) -> StoreResult<Vec<(String, StoredRecord)>>;

    /// Atomically apply all buffered writes. Returns the commit sequence
    /// number, or fails with a conflict leaving the store untouched.
    fn commit(self) -> StoreResult<u64>;

    /// Discard all buffered writes.
    fn rollback(self);
}
