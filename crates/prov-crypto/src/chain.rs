use crate::digest::EventHash;
use crate::hasher::{ContentHasher, FieldEncoder};

/// Sequence number of the first event in every chain.
pub const GENESIS_SEQ: u64 = 1;

/// An event that participates in a per-entity hash chain.
pub trait ChainLink {
    /// Position in the entity's chain, starting at [`GENESIS_SEQ`].
    fn seq(&self) -> u64;
    /// The event's own stored hash.
    fn event_hash(&self) -> EventHash;
    /// The previous event's hash (None for genesis).
    fn prev_hash(&self) -> Option<EventHash>;
    /// Canonical bytes of every hashed field except `prev_hash`.
    fn body_bytes(&self) -> Vec<u8>;
}

/// Per-entity hash chain verifier.
///
/// Replays a chain from genesis: each event's `prev_hash` must match the
/// previous event's hash, sequence numbers must be contiguous, and each
/// stored hash must equal the hash recomputed from the event's fields.
pub struct HashChainVerifier;

impl HashChainVerifier {
    /// Verify a chain, reporting the first offending sequence number.
    pub fn verify_chain<L: ChainLink>(events: &[L]) -> Result<(), ChainError> {
        let mut expected_prev: Option<EventHash> = None;

        for (i, event) in events.iter().enumerate() {
            let seq = event.seq();
            let expected_seq = GENESIS_SEQ + i as u64;
            if seq != expected_seq {
                return Err(ChainError::SequenceGap {
                    expected: expected_seq,
                    found: seq,
                });
            }

            match (expected_prev, event.prev_hash()) {
                (None, Some(_)) => return Err(ChainError::GenesisHasPrevHash { seq }),
                (Some(_), None) => return Err(ChainError::MissingPrevHash { seq }),
                (Some(expected), Some(actual)) if expected != actual => {
                    return Err(ChainError::BrokenLink { seq });
                }
                _ => {}
            }

            let computed = Self::compute_hash(expected_prev.as_ref(), &event.body_bytes());
            if computed != event.event_hash() {
                return Err(ChainError::HashMismatch { seq });
            }

            expected_prev = Some(computed);
        }

        Ok(())
    }

    /// Compute the hash of an event body linked to `prev_hash`.
    pub fn compute_hash(prev_hash: Option<&EventHash>, body: &[u8]) -> EventHash {
        let bytes = FieldEncoder::new().digest(prev_hash).bytes(body).finish();
        ContentHasher::EVENT.hash(&bytes)
    }
}

/// Errors from chain verification. Each carries the offending sequence number.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("genesis event {seq} has a previous hash")]
    GenesisHasPrevHash { seq: u64 },

    #[error("broken link at seq {seq}: prev_hash does not match the preceding event")]
    BrokenLink { seq: u64 },

    #[error("missing prev_hash at seq {seq}")]
    MissingPrevHash { seq: u64 },

    #[error("hash mismatch at seq {seq}: recomputed hash differs from stored")]
    HashMismatch { seq: u64 },

    #[error("sequence gap: expected seq {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },
}

impl ChainError {
    /// Sequence number at which verification stopped.
    pub fn seq(&self) -> u64 {
        match self {
            Self::GenesisHasPrevHash { seq }
            | Self::BrokenLink { seq }
            | Self::MissingPrevHash { seq }
            | Self::HashMismatch { seq } => *seq,
            Self::SequenceGap { expected, .. } => *expected,
        }
    }
}
