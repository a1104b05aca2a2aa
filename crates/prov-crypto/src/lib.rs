//! Cryptographic primitives for the provenance ledger.
//!
//! Provides the [`EventHash`] digest type, domain-separated BLAKE3 hashing
//! over length-prefixed fields ([`ContentHasher`], [`FieldEncoder`]), and
//! per-entity hash chain verification ([`HashChainVerifier`]).
//!
//! All crypto operations wrap established libraries -- no custom cryptography.

pub mod chain;
pub mod digest;
pub mod hasher;

pub use chain::{ChainError, ChainLink, HashChainVerifier, GENESIS_SEQ};
pub use digest::{DigestError, EventHash};
pub use hasher::{ContentHasher, FieldEncoder};
