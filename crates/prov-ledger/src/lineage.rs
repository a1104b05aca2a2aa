use serde::{Deserialize, Serialize};
use tracing::debug;

use prov_dag::{forward_impact, reverse_closure, CompositionDag, CompositionEdge, ImpactReport};
use prov_store::Transaction;
use prov_types::{EntityId, LotId};

use crate::chain::EventChain;
use crate::error::LedgerResult;
use crate::events::Event;
use crate::graph::{CompositionGraph, StoredEdges};
use crate::records::PackageRecord;

/// Full lineage of one sealed package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    pub package: PackageRecord,
    /// Lots in the closure with no incoming edge.
    pub origins: Vec<LotId>,
    /// The package, then every ancestor lot in discovery order.
    pub nodes: Vec<EntityId>,
    /// The composition subgraph behind the package.
    pub edges: Vec<CompositionEdge>,
    /// Every event of every node, ordered by timestamp then sequence.
    pub events: Vec<Event>,
}

impl Trace {
    /// The subgraph as a standalone DAG.
    pub fn subgraph(&self) -> LedgerResult<CompositionDag> {
        let mut dag = CompositionDag::new();
        for node in &self.nodes {
            dag.add_node(*node)?;
        }
        for edge in &self.edges {
            dag.add_edge(edge.clone())?;
        }
        Ok(dag)
    }

    pub fn events_for<'a>(&'a self, entity: &'a EntityId) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |e| e.entity == *entity)
    }
}

/// Read-only lineage queries over the stored composition graph.
pub struct LineageResolver;

impl LineageResolver {
    /// Walk backward from the package labelled `label` to every origin lot
    /// and gather the events of everything on the way.
    ///
    /// A lot reached twice through a diamond appears once. Reaching a lot
    /// that is still on the current path means the stored graph has a cycle
    /// and fails with `ChainIntegrityViolation`.
    pub fn trace<T: Transaction>(tx: &mut T, label: &str) -> LedgerResult<Trace> {
        let package = CompositionGraph::package_by_label(tx, label)?;
        let closure = reverse_closure(&mut StoredEdges::new(tx), package.id.into())?;

        let mut events = Vec::new();
        for node in &closure.nodes {
            events.extend(EventChain::history(tx, node)?);
        }
        // Stable: ties keep discovery order.
        events.sort_by_key(|e| (e.timestamp, e.seq));

        debug!(
            label,
            nodes = closure.nodes.len(),
            events = events.len(),
            "traced package"
        );
        Ok(Trace {
            package,
            origins: closure.origins,
            nodes: closure.nodes,
            edges: closure.edges,
            events,
        })
    }

    /// Every lot and package that contains material from `lot`.
    pub fn impact<T: Transaction>(tx: &mut T, lot: LotId) -> LedgerResult<ImpactReport> {
        CompositionGraph::lot(tx, lot)?;
        forward_impact(&mut StoredEdges::new(tx), lot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::events::EventKind;
    use crate::fixtures::*;
    use crate::graph::Division;
    use crate::records::{entity_key, IncomingEdges};
    use prov_store::TransactionExt;

    #[test]
    fn trace_follows_split_into_package() {
        let fx = Fixture::new();
        let lot = fx.harvest(1000);
        let mut tx = fx.tx();
        let children = fx
            .graph()
            .split(&mut tx, lot, &[Division::new(g(400)), Division::new(g(600))], &farmer())
            .unwrap();
        tx.commit().unwrap();
        let (c1, c2) = (children[0].id, children[1].id);
        let package = fx.package(c1, 300, "P1");

        let mut tx = fx.tx();
        let trace = LineageResolver::trace(&mut tx, "P1").unwrap();
        assert_eq!(trace.origins, vec![lot]);
        assert_eq!(trace.nodes, vec![package.id.into(), c1.into(), lot.into()]);
        assert!(!trace.nodes.contains(&c2.into()));

        let steps: Vec<(EntityId, EventKind)> =
            trace.events.iter().map(|e| (e.entity, e.kind)).collect();
        assert_eq!(
            steps,
            vec![
                (lot.into(), EventKind::Created),
                (lot.into(), EventKind::Split),
                (c1.into(), EventKind::Created),
                (c1.into(), EventKind::Consolidated),
                (package.id.into(), EventKind::PackageCreated),
            ]
        );
        let sub = trace.subgraph().unwrap();
        assert!(sub.validate().is_ok());
        assert_eq!(sub.edge_count(), 2);
    }

    #[test]
    fn trace_is_idempotent() {
        let fx = Fixture::new();
        let lot = fx.harvest(100);
        fx.package(lot, 50, "P1");
        let mut tx = fx.tx();
        let first = LineageResolver::trace(&mut tx, "P1").unwrap();
        let second = LineageResolver::trace(&mut tx, "P1").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn diamond_lineage_lists_each_lot_once() {
        let fx = Fixture::new();
        let lot = fx.harvest(100);
        let mut tx = fx.tx();
        let children = fx
            .graph()
            .split(&mut tx, lot, &[Division::new(g(50)), Division::new(g(50))], &farmer())
            .unwrap();
        fx.graph()
            .consolidate(
                &mut tx,
                &[(children[0].id, g(50)), (children[1].id, g(50))],
                "BOTH",
                &farmer(),
            )
            .unwrap();
        tx.commit().unwrap();

        let mut tx = fx.tx();
        let trace = LineageResolver::trace(&mut tx, "BOTH").unwrap();
        assert_eq!(trace.origins, vec![lot]);
        assert_eq!(trace.nodes.len(), 4);
        assert_eq!(trace.edges.len(), 4);
        assert_eq!(trace.events_for(&lot.into()).count(), 2);
    }

    #[test]
    fn unknown_label_is_not_found() {
        let fx = Fixture::new();
        let mut tx = fx.tx();
        assert!(matches!(
            LineageResolver::trace(&mut tx, "missing"),
            Err(LedgerError::NotFound { kind: "label", .. })
        ));
    }

    #[test]
    fn corrupted_cycle_is_reported() {
        let fx = Fixture::new();
        let lot = fx.harvest(100);
        let mut tx = fx.tx();
        let children = fx
            .graph()
            .split(&mut tx, lot, &[Division::new(g(60))], &farmer())
            .unwrap();
        let child = children[0].id;
        fx.graph()
            .consolidate(&mut tx, &[(child, g(10))], "LOOP", &farmer())
            .unwrap();
        // Claim that the origin was itself made from its own child.
        let bogus = IncomingEdges {
            edges: vec![CompositionEdge::new(child, lot, g(1))],
        };
        tx.put(&entity_key(&lot.into()), &bogus).unwrap();
        tx.commit().unwrap();

        let mut tx = fx.tx();
        let err = LineageResolver::trace(&mut tx, "LOOP").unwrap_err();
        assert!(matches!(err, LedgerError::ChainIntegrityViolation { .. }));
    }

    #[test]
    fn impact_reaches_packages_through_children() {
        let fx = Fixture::new();
        let lot = fx.harvest(1000);
        let mut tx = fx.tx();
        let children = fx
            .graph()
            .split(&mut tx, lot, &[Division::new(g(400)), Division::new(g(600))], &farmer())
            .unwrap();
        tx.commit().unwrap();
        let package = fx.package(children[0].id, 100, "P1");

        let mut tx = fx.tx();
        let report = LineageResolver::impact(&mut tx, lot).unwrap();
        assert_eq!(report.lots.len(), 2);
        assert_eq!(report.packages.len(), 1);
        assert_eq!(report.packages[0].id, package.id);
        assert_eq!(report.cascade_depth, 2);
        assert!(matches!(
            LineageResolver::impact(&mut tx, LotId::new()),
            Err(LedgerError::NotFound { kind: "lot", .. })
        ));
    }
}
