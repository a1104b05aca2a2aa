//! Error types for the composition DAG.

use prov_types::{EntityId, LotId};

/// Errors that can occur during DAG operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    /// A referenced node was not found in the DAG.
    #[error("node not found: {0}")]
    NodeNotFound(EntityId),

    /// An edge endpoint does not exist in the DAG.
    #[error("dangling edge {lot} -> {target}")]
    DanglingEdge {
        /// The lot material was drawn from.
        lot: LotId,
        /// The lot or package it went into.
        target: EntityId,
    },

    /// Attempted to add a node with an ID that already exists.
    #[error("duplicate node: {0}")]
    DuplicateNode(EntityId),

    /// Attempted to add a second edge between the same pair of nodes.
    #[error("duplicate edge {lot} -> {target}")]
    DuplicateEdge { lot: LotId, target: EntityId },

    /// An edge consumed no material.
    #[error("edge {lot} -> {target} has zero quantity")]
    EmptyEdge { lot: LotId, target: EntityId },

    /// A cycle was detected, which violates the DAG invariant.
    #[error("cycle detected involving node {0}")]
    CycleDetected(EntityId),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for DAG results.
pub type DagResult<T> = Result<T, DagError>;
