//! Forward impact analysis: everything made from a given lot.
//!
//! This is the recall query. Given a lot found to be contaminated, the
//! [`ImpactReport`] lists every descendant lot and every sealed package that
//! contains material from it, with how many hops away each one is.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use prov_types::{EntityId, LotId, PackageId};

use crate::edge::EdgeSource;

/// A node reached from the origin, and its distance in edges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reached<T> {
    pub id: T,
    pub depth: usize,
}

/// Impact analysis report for a lot: what was affected downstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactReport {
    /// The lot being analyzed.
    pub origin: LotId,
    /// Descendant lots in breadth-first order.
    pub lots: Vec<Reached<LotId>>,
    /// Packages containing material from the origin, in breadth-first order.
    pub packages: Vec<Reached<PackageId>>,
    /// Maximum depth of the cascade from the origin.
    pub cascade_depth: usize,
}

impl ImpactReport {
    /// Create an empty impact report for the given origin.
    pub fn new(origin: LotId) -> Self {
        Self {
            origin,
            lots: Vec::new(),
            packages: Vec::new(),
            cascade_depth: 0,
        }
    }

    /// Returns `true` if there is no downstream impact.
    pub fn is_empty(&self) -> bool {
        self.lots.is_empty() && self.packages.is_empty()
    }
}

/// Breadth-first walk over outgoing edges from `origin`.
///
/// Each node is reported once, at its shortest distance. A node reached
/// again through another path is skipped, which also bounds the walk if the
/// edge set is corrupt.
pub fn forward_impact<S: EdgeSource>(source: &mut S, origin: LotId) -> Result<ImpactReport, S::Error> {
    let mut report = ImpactReport::new(origin);
    let mut visited: HashSet<EntityId> = HashSet::from([EntityId::Lot(origin)]);
    let mut queue: VecDeque<(LotId, usize)> = VecDeque::from([(origin, 0)]);

    while let Some((lot, depth)) = queue.pop_front() {
        for edge in source.outgoing(&lot)? {
            if !visited.insert(edge.target) {
                continue;
            }
            let reached = depth + 1;
            report.cascade_depth = report.cascade_depth.max(reached);
            match edge.target {
                EntityId::Lot(child) => {
                    report.lots.push(Reached {
                        id: child,
                        depth: reached,
                    });
                    queue.push_back((child, reached));
                }
                EntityId::Package(package) => report.packages.push(Reached {
                    id: package,
                    depth: reached,
                }),
            }
        }
    }

    Ok(report)
}
