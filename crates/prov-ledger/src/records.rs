//! Persisted record shapes and their store keys.
//!
//! Lots, packages, edges and events are append-only. The only fields ever
//! rewritten in place are a lot's balance, lifecycle state and custodian,
//! a package's custodian, and each entity's chain head.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use prov_crypto::EventHash;
use prov_dag::CompositionEdge;
use prov_store::Record;
use prov_types::{
    CommodityId, CommodityType, EntityId, Grams, LotId, PackageId, ParticipantId, Role,
    TemporalAnchor,
};

use crate::events::Event;
use crate::lifecycle::LotState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub id: ParticipantId,
    pub role: Role,
    pub display_name: String,
    pub registered_at: DateTime<Utc>,
}

impl Record for ParticipantRecord {
    const KIND: &'static str = "participant";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommodityRecord {
    #[serde(flatten)]
    pub commodity: CommodityType,
    pub registered_at: DateTime<Utc>,
}

impl Record for CommodityRecord {
    const KIND: &'static str = "commodity";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotRecord {
    pub id: LotId,
    pub commodity: CommodityId,
    /// Quantity at creation. Never changes.
    pub quantity_recorded: Grams,
    pub custodian: ParticipantId,
    pub state: LotState,
    pub created_at: TemporalAnchor,
}

impl Record for LotRecord {
    const KIND: &'static str = "lot";
}

/// Mutable available quantity of one lot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub lot: LotId,
    pub available: Grams,
}

impl Record for BalanceRecord {
    const KIND: &'static str = "balance";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageContent {
    pub lot: LotId,
    pub commodity: CommodityId,
    pub quantity: Grams,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub id: PackageId,
    pub label: String,
    pub custodian: ParticipantId,
    pub contents: Vec<PackageContent>,
    pub total: Grams,
    pub created_at: TemporalAnchor,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Record for PackageRecord {
    const KIND: &'static str = "package";
}

/// Label reservation; keyed by the label itself so uniqueness is a point
/// read inside the consolidating transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub label: String,
    pub package: PackageId,
}

impl Record for LabelRecord {
    const KIND: &'static str = "label";
}

/// Edges ending at one node, keyed by the target entity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingEdges {
    pub edges: Vec<CompositionEdge>,
}

impl Record for IncomingEdges {
    const KIND: &'static str = "edges_in";
}

/// Edges starting at one lot, keyed by the source lot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEdges {
    pub edges: Vec<CompositionEdge>,
}

impl Record for OutgoingEdges {
    const KIND: &'static str = "edges_out";
}

impl Record for Event {
    const KIND: &'static str = "event";
}

/// Latest event of one entity's chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub entity: EntityId,
    pub seq: u64,
    pub hash: EventHash,
    pub timestamp: TemporalAnchor,
}

impl Record for ChainHead {
    const KIND: &'static str = "chain_head";
}

/// A lot together with its current balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotView {
    #[serde(flatten)]
    pub lot: LotRecord,
    pub available: Grams,
}

// ---------------------------------------------------------------
// Keys
// ---------------------------------------------------------------

pub(crate) fn lot_key(id: &LotId) -> String {
    id.to_string()
}

pub(crate) fn package_key(id: &PackageId) -> String {
    id.to_string()
}

pub(crate) fn entity_key(id: &EntityId) -> String {
    id.to_string()
}

/// Zero-padded so that a scan returns each chain in sequence order.
pub(crate) fn event_key(entity: &EntityId, seq: u64) -> String {
    format!("{entity}#{seq:020}")
}
