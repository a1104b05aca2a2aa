use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use prov_types::{EntityId, LotId};

use crate::dag::CompositionDag;
use crate::edge::{CompositionEdge, EdgeSource};
use crate::error::{DagError, DagResult};

/// Everything reachable backward from one node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Closure {
    /// Where the walk started (usually a package).
    pub root: EntityId,
    /// Every node touched, root first, then in depth-first discovery order.
    pub nodes: Vec<EntityId>,
    /// Every edge followed, each exactly once.
    pub edges: Vec<CompositionEdge>,
    /// Lots in the closure with no incoming edge, in discovery order.
    pub origins: Vec<LotId>,
}

impl Closure {
    /// The closure as a standalone DAG.
    pub fn to_dag(&self) -> DagResult<CompositionDag> {
        let mut dag = CompositionDag::new();
        for node in &self.nodes {
            dag.add_node(*node)?;
        }
        for edge in &self.edges {
            dag.add_edge(edge.clone())?;
        }
        Ok(dag)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.nodes.contains(id)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current depth-first path.
    OnPath,
    /// Fully expanded.
    Done,
}

struct Frame {
    node: EntityId,
    edges: Vec<CompositionEdge>,
    next: usize,
}

/// Walk incoming edges backward from `root` until every branch ends at a lot
/// with no incoming edge.
///
/// Iterative depth-first search with on-path marking. Reaching a node that
/// is already fully expanded (a diamond: two children of the same source
/// meeting again downstream) is not a cycle; the node is recorded once.
/// Reaching a node that is still on the current path is a cycle and fails
/// with [`DagError::CycleDetected`].
pub fn reverse_closure<S: EdgeSource>(source: &mut S, root: EntityId) -> Result<Closure, S::Error> {
    let mut marks: HashMap<EntityId, Mark> = HashMap::new();
    let mut closure = Closure {
        root,
        nodes: vec![root],
        edges: Vec::new(),
        origins: Vec::new(),
    };

    marks.insert(root, Mark::OnPath);
    let mut stack = vec![Frame {
        node: root,
        edges: source.incoming(&root)?,
        next: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        if frame.next == frame.edges.len() {
            let node = frame.node;
            let is_origin = frame.edges.is_empty();
            stack.pop();
            marks.insert(node, Mark::Done);
            if let (true, Some(lot)) = (is_origin, node.as_lot()) {
                closure.origins.push(lot);
            }
            continue;
        }

        let edge = frame.edges[frame.next].clone();
        frame.next += 1;

        let parent = EntityId::Lot(edge.source);
        closure.edges.push(edge);
        match marks.get(&parent) {
            Some(Mark::OnPath) => {
                warn!(node = %parent, root = %root, "cycle in composition graph");
                return Err(DagError::CycleDetected(parent).into());
            }
            Some(Mark::Done) => {}
            None => {
                marks.insert(parent, Mark::OnPath);
                closure.nodes.push(parent);
                let edges = source.incoming(&parent)?;
                stack.push(Frame {
                    node: parent,
                    edges,
                    next: 0,
                });
            }
        }
    }

    debug!(
        root = %root,
        nodes = closure.nodes.len(),
        origins = closure.origins.len(),
        "computed reverse closure"
    );
    Ok(closure)
}
