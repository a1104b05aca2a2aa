//! Provenance and stock-ledger engine.
//!
//! This crate is the heart of the workspace. It tracks a harvested commodity
//! as it is split, handed between custodians, and sealed into packages, and
//! reconstructs the full history behind any package label.
//!
//! Components, leaf-first:
//! - [`StockLedger`] -- per-lot available quantity; debit only, never credit
//! - [`CompositionGraph`] -- lot creation, split, and consolidation edges
//! - [`EventChain`] -- append-only, hash-linked event log per lot and package
//! - [`OwnershipRegistry`] -- participants, commodities, custody, transfers
//! - [`LineageResolver`] -- backward trace from a label, forward impact
//!
//! [`Provenance`] is the boundary facade: it runs each operation as one
//! store transaction, retries on commit conflicts, and exposes
//! [`audit`](Provenance::audit) for whole-store invariant checks.

pub mod audit;
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
#[cfg(test)]
mod fixtures;
pub mod graph;
pub mod lifecycle;
pub mod lineage;
pub mod records;
pub mod registry;
pub mod stock;

pub use audit::{AuditReport, Violation};
pub use chain::EventChain;
pub use config::LedgerConfig;
pub use engine::Provenance;
pub use error::{LedgerError, LedgerResult};
pub use events::{Event, EventKind, TestOutcome, TestReport};
pub use graph::{CompositionGraph, Division, StoredEdges};
pub use lifecycle::{LifecycleEvent, LotState};
pub use lineage::{LineageResolver, Trace};
pub use records::{
    BalanceRecord, ChainHead, CommodityRecord, LabelRecord, LotRecord, LotView, PackageContent,
    PackageRecord, ParticipantRecord,
};
pub use registry::OwnershipRegistry;
pub use stock::StockLedger;
