use std::fmt;

use serde::{Deserialize, Serialize};

use prov_types::{EntityId, Grams, LotId};

use crate::error::DagError;

/// A provenance link: `quantity` of `source` was consumed to make `target`.
///
/// Edges are immutable once written. Only lots can be sources; packages are
/// sinks and never appear on the left of an edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositionEdge {
    pub source: LotId,
    pub target: EntityId,
    pub quantity: Grams,
}

impl CompositionEdge {
    pub fn new(source: LotId, target: impl Into<EntityId>, quantity: Grams) -> Self {
        Self {
            source,
            target: target.into(),
            quantity,
        }
    }
}

impl fmt::Display for CompositionEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({})",
            self.source.short_id(),
            self.target.short_id(),
            self.quantity
        )
    }
}

/// Anything that can answer "which edges end here / start here".
///
/// Implemented by the in-memory [`CompositionDag`](crate::CompositionDag) and
/// by store-backed views in the ledger. Results must be returned in a stable
/// order so traversals are deterministic.
pub trait EdgeSource {
    type Error: From<DagError>;

    /// Edges whose target is `node`.
    fn incoming(&mut self, node: &EntityId) -> Result<Vec<CompositionEdge>, Self::Error>;

    /// Edges whose source is `lot`.
    fn outgoing(&mut self, lot: &LotId) -> Result<Vec<CompositionEdge>, Self::Error>;
}
