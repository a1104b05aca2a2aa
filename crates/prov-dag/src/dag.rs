//! The in-memory composition DAG arena.
//!
//! [`CompositionDag`] stores nodes in a `Vec` addressed by index, an edge
//! list, and per-node incoming/outgoing edge indices. Nothing holds a
//! pointer to anything else; ids resolve through `index`.
//!
//! The arena accepts whatever edges it is given (so a corrupted edge set can
//! be loaded and inspected); acyclicity is checked by [`validate`] and by
//! traversal, not assumed.
//!
//! [`validate`]: CompositionDag::validate

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use prov_types::{EntityId, LotId};

use crate::edge::{CompositionEdge, EdgeSource};
use crate::error::{DagError, DagResult};

#[derive(Clone, Debug, Default)]
pub struct CompositionDag {
    nodes: Vec<EntityId>,
    index: HashMap<EntityId, usize>,
    edges: Vec<CompositionEdge>,
    /// Per node: indices into `edges` where the node is the target.
    incoming: Vec<Vec<usize>>,
    /// Per node: indices into `edges` where the node is the source.
    outgoing: Vec<Vec<usize>>,
}

/// Wire form: nodes and edges only; indices are rebuilt on load.
#[derive(Serialize, Deserialize)]
struct DagWire {
    nodes: Vec<EntityId>,
    edges: Vec<CompositionEdge>,
}

impl CompositionDag {
    /// Create an empty DAG.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of nodes in the DAG.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the DAG has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Add a node. Fails if the id is already present.
    pub fn add_node(&mut self, id: impl Into<EntityId>) -> DagResult<()> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(DagError::DuplicateNode(id));
        }
        self.insert_node(id);
        Ok(())
    }

    /// Add a node if absent.
    pub fn ensure_node(&mut self, id: impl Into<EntityId>) {
        let id = id.into();
        if !self.index.contains_key(&id) {
            self.insert_node(id);
        }
    }

    fn insert_node(&mut self, id: EntityId) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(id);
        self.index.insert(id, idx);
        self.incoming.push(Vec::new());
        self.outgoing.push(Vec::new());
        idx
    }

    /// Add an edge between two existing nodes.
    ///
    /// Rejects dangling endpoints, zero quantities, and a second edge between
    /// the same pair. Does not reject cycles.
    pub fn add_edge(&mut self, edge: CompositionEdge) -> DagResult<()> {
        let source = EntityId::Lot(edge.source);
        let (Some(&from), Some(&to)) = (self.index.get(&source), self.index.get(&edge.target))
        else {
            return Err(DagError::DanglingEdge {
                lot: edge.source,
                target: edge.target,
            });
        };
        if edge.quantity.is_zero() {
            return Err(DagError::EmptyEdge {
                lot: edge.source,
                target: edge.target,
            });
        }
        if self.outgoing[from]
            .iter()
            .any(|&e| self.edges[e].target == edge.target)
        {
            return Err(DagError::DuplicateEdge {
                lot: edge.source,
                target: edge.target,
            });
        }

        debug!(edge = %edge, "added composition edge");
        let e = self.edges.len();
        self.edges.push(edge);
        self.outgoing[from].push(e);
        self.incoming[to].push(e);
        Ok(())
    }

    /// Build a DAG from an edge list, creating nodes as they are referenced.
    pub fn from_edges<I: IntoIterator<Item = CompositionEdge>>(edges: I) -> DagResult<Self> {
        let mut dag = Self::new();
        for edge in edges {
            dag.ensure_node(edge.source);
            dag.ensure_node(edge.target);
            dag.add_edge(edge)?;
        }
        Ok(dag)
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub fn contains(&self, id: &EntityId) -> bool {
        self.index.contains_key(id)
    }

    /// All node ids in insertion order.
    pub fn node_ids(&self) -> &[EntityId] {
        &self.nodes
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[CompositionEdge] {
        &self.edges
    }

    pub fn incoming_edges(&self, id: &EntityId) -> Vec<&CompositionEdge> {
        self.index
            .get(id)
            .map(|&i| self.incoming[i].iter().map(|&e| &self.edges[e]).collect())
            .unwrap_or_default()
    }

    pub fn outgoing_edges(&self, lot: &LotId) -> Vec<&CompositionEdge> {
        self.index
            .get(&EntityId::Lot(*lot))
            .map(|&i| self.outgoing[i].iter().map(|&e| &self.edges[e]).collect())
            .unwrap_or_default()
    }

    // ---------------------------------------------------------------
    // Ordering & validation
    // ---------------------------------------------------------------

    /// All nodes in topological order (sources before the things made from
    /// them), using Kahn's algorithm.
    ///
    /// Initial nodes are taken in id order and successors in edge order, so
    /// the result is deterministic. Fails with [`DagError::CycleDetected`] if
    /// some nodes can never be emitted.
    pub fn topological_order(&self) -> DagResult<Vec<EntityId>> {
        let mut in_degree: Vec<usize> = self.incoming.iter().map(Vec::len).collect();

        let mut initial: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        initial.sort_by_key(|&i| self.nodes[i]);
        let mut queue: VecDeque<usize> = initial.into();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(current) = queue.pop_front() {
            order.push(self.nodes[current]);
            for &e in &self.outgoing[current] {
                let target = self.index[&self.edges[e].target];
                in_degree[target] -= 1;
                if in_degree[target] == 0 {
                    queue.push_back(target);
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck = (0..self.nodes.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.nodes[i])
                .min();
            if let Some(node) = stuck {
                return Err(DagError::CycleDetected(node));
            }
        }
        Ok(order)
    }

    /// Check structural invariants: acyclic, no zero-quantity edges.
    pub fn validate(&self) -> DagResult<()> {
        if let Some(edge) = self.edges.iter().find(|e| e.quantity.is_zero()) {
            return Err(DagError::EmptyEdge {
                lot: edge.source,
                target: edge.target,
            });
        }
        self.topological_order().map(|_| ())
    }

    // ---------------------------------------------------------------
    // Serialization
    // ---------------------------------------------------------------

    /// Compact binary encoding (bincode).
    pub fn to_bytes(&self) -> DagResult<Vec<u8>> {
        let wire = DagWire {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        };
        bincode::serialize(&wire).map_err(|e| DagError::Serialization(e.to_string()))
    }
}

impl EdgeSource for CompositionDag {
    type Error = DagError;

    fn incoming(&mut self, node: &EntityId) -> DagResult<Vec<CompositionEdge>> {
        if !self.contains(node) {
            return Err(DagError::NodeNotFound(*node));
        }
        Ok(self.incoming_edges(node).into_iter().cloned().collect())
    }

    fn outgoing(&mut self, lot: &LotId) -> DagResult<Vec<CompositionEdge>> {
        let node = EntityId::Lot(*lot);
        if !self.contains(&node) {
            return Err(DagError::NodeNotFound(node));
        }
        Ok(self.outgoing_edges(lot).into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prov_types::{Grams, PackageId};

    fn g(grams: u64) -> Grams {
        Grams::from_grams(grams).unwrap()
    }

    /// L -> C1, L -> C2, C1 -> P
    fn split_then_package() -> (CompositionDag, LotId, LotId, LotId, PackageId) {
        let (l, c1, c2, p) = (LotId::new(), LotId::new(), LotId::new(), PackageId::new());
        let dag = CompositionDag::from_edges([
            CompositionEdge::new(l, c1, g(400)),
            CompositionEdge::new(l, c2, g(600)),
            CompositionEdge::new(c1, p, g(300)),
        ])
        .unwrap();
        (dag, l, c1, c2, p)
    }

    #[test]
    fn build_and_query() {
        let (dag, l, c1, c2, p) = split_then_package();
        assert_eq!(dag.len(), 4);
        assert_eq!(dag.edge_count(), 3);
        assert_eq!(dag.outgoing_edges(&l).len(), 2);
        assert!(dag.outgoing_edges(&c2).is_empty());
        assert!(dag.incoming_edges(&l.into()).is_empty());
        assert_eq!(dag.incoming_edges(&p.into())[0].source, c1);
    }

    #[test]
    fn add_node_rejects_duplicates() {
        let mut dag = CompositionDag::new();
        let l = LotId::new();
        dag.add_node(l).unwrap();
        assert_eq!(dag.add_node(l), Err(DagError::DuplicateNode(l.into())));
    }

    #[test]
    fn add_edge_rejects_dangling_zero_and_duplicate() {
        let mut dag = CompositionDag::new();
        let (a, b) = (LotId::new(), LotId::new());
        dag.add_node(a).unwrap();
        assert!(matches!(
            dag.add_edge(CompositionEdge::new(a, b, g(1))),
            Err(DagError::DanglingEdge { .. })
        ));
        dag.add_node(b).unwrap();
        assert!(matches!(
            dag.add_edge(CompositionEdge::new(a, b, Grams::ZERO)),
            Err(DagError::EmptyEdge { .. })
        ));
        dag.add_edge(CompositionEdge::new(a, b, g(1))).unwrap();
        assert!(matches!(
            dag.add_edge(CompositionEdge::new(a, b, g(2))),
            Err(DagError::DuplicateEdge { .. })
        ));
    }

    #[test]
    fn topological_order_puts_sources_first() {
        let (dag, l, c1, _, p) = split_then_package();
        let order = dag.topological_order().unwrap();
        let pos = |id: EntityId| order.iter().position(|n| *n == id).unwrap();
        assert!(pos(l.into()) < pos(c1.into()));
        assert!(pos(c1.into()) < pos(p.into()));
        assert!(dag.validate().is_ok());
    }

    #[test]
    fn cycle_is_detected_by_validate() {
        let (a, b) = (LotId::new(), LotId::new());
        let dag = CompositionDag::from_edges([
            CompositionEdge::new(a, b, g(1)),
            CompositionEdge::new(b, a, g(1)),
        ])
        .unwrap();
        assert!(matches!(dag.validate(), Err(DagError::CycleDetected(_))));
    }

    #[test]
    fn bytes_carry_nodes_and_edges() {
        let (dag, ..) = split_then_package();
        let wire: DagWire = bincode::deserialize(&dag.to_bytes().unwrap()).unwrap();
        assert_eq!(wire.nodes, dag.node_ids());
        assert_eq!(wire.edges, dag.edges());
    }

    #[test]
    fn edge_source_for_unknown_node_fails() {
        let mut dag = CompositionDag::new();
        let lot = LotId::new();
        assert_eq!(
            dag.outgoing(&lot),
            Err(DagError::NodeNotFound(lot.into()))
        );
    }
}
