use prov_crypto::ChainError;
use prov_dag::DagError;
use prov_store::StoreError;
use prov_types::{EntityId, Grams, LotId, TypeError};

/// Errors produced by ledger operations.
///
/// Validation failures are reported before anything is written; any failure
/// inside a unit of work rolls the whole unit back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("insufficient stock on {lot}: requested {requested}, available {available}")]
    InsufficientStock {
        lot: LotId,
        requested: Grams,
        available: Grams,
    },

    #[error("duplicate label: {0}")]
    DuplicateLabel(String),

    /// Hash chain mismatch or composition cycle. Never recovered silently.
    #[error("chain integrity violation on {entity} at seq {seq}: {reason}")]
    ChainIntegrityViolation {
        entity: EntityId,
        seq: u64,
        reason: String,
    },

    /// Transaction conflict. Retryable by the caller.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }

    /// Map a chain verification failure on `entity`.
    pub fn from_chain(entity: EntityId, err: ChainError) -> Self {
        Self::ChainIntegrityViolation {
            entity,
            seq: err.seq(),
            reason: err.to_string(),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { .. } => Self::ConcurrentModification(e.to_string()),
            StoreError::Serialization(msg) => Self::Serialization(msg),
            other => Self::Store(other.to_string()),
        }
    }
}

impl From<DagError> for LedgerError {
    fn from(e: DagError) -> Self {
        match e {
            DagError::NodeNotFound(id) => Self::not_found("node", id),
            DagError::CycleDetected(node) => Self::ChainIntegrityViolation {
                entity: node,
                seq: 0,
                reason: "cycle in composition graph".into(),
            },
            DagError::DanglingEdge { target, .. }
            | DagError::DuplicateEdge { target, .. }
            | DagError::EmptyEdge { target, .. } => Self::ChainIntegrityViolation {
                entity: target,
                seq: 0,
                reason: e.to_string(),
            },
            DagError::DuplicateNode(node) => Self::ChainIntegrityViolation {
                entity: node,
                seq: 0,
                reason: e.to_string(),
            },
            DagError::Serialization(msg) => Self::Serialization(msg),
        }
    }
}

impl From<TypeError> for LedgerError {
    fn from(e: TypeError) -> Self {
        match e {
            TypeError::InvalidQuantity(msg) => Self::InvalidQuantity(msg),
            other => Self::InvalidInput(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
