//! Whole-store invariant audit.
//!
//! Runs inside one snapshot and reports every violation it finds. Nothing is
//! repaired: a failing audit means the store was corrupted or tampered with
//! outside the engine.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use prov_dag::{CompositionDag, DagError};
use prov_store::{Transaction, TransactionExt};
use prov_types::{EntityId, Grams, LotId, PackageId, ParticipantId};

use crate::chain::EventChain;
use crate::error::{LedgerError, LedgerResult};
use crate::events::{
    CreatedPayload, Event, EventKind, PackageCreatedPayload, PackageTransferredPayload,
    TransferredPayload,
};
use crate::records::{BalanceRecord, IncomingEdges, LotRecord, OutgoingEdges, PackageRecord};

/// One broken invariant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    MissingBalance {
        lot: LotId,
    },
    /// More was drawn from the lot than it was created with.
    OverConsumed {
        lot: LotId,
        consumed: Grams,
        recorded: Grams,
    },
    /// Balance plus everything drawn does not add up to the recorded quantity.
    BalanceMismatch {
        lot: LotId,
        available: Grams,
        consumed: Grams,
        recorded: Grams,
    },
    PackageTotalMismatch {
        package: PackageId,
        total: Grams,
        contents: Grams,
        edges: Grams,
    },
    Cycle {
        node: EntityId,
    },
    BrokenGraph {
        reason: String,
    },
    BrokenChain {
        entity: EntityId,
        seq: u64,
        reason: String,
    },
    CustodyMismatch {
        entity: EntityId,
        seq: u64,
        reason: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBalance { lot } => write!(f, "{lot} has no balance"),
            Self::OverConsumed {
                lot,
                consumed,
                recorded,
            } => write!(f, "{lot} consumed {consumed} of {recorded}"),
            Self::BalanceMismatch {
                lot,
                available,
                consumed,
                recorded,
            } => write!(
                f,
                "{lot} available {available} + consumed {consumed} != recorded {recorded}"
            ),
            Self::PackageTotalMismatch {
                package,
                total,
                contents,
                edges,
            } => write!(
                f,
                "{package} total {total}, contents {contents}, edges {edges}"
            ),
            Self::Cycle { node } => write!(f, "composition cycle through {node}"),
            Self::BrokenGraph { reason } => write!(f, "composition graph: {reason}"),
            Self::BrokenChain { entity, seq, reason } => {
                write!(f, "{entity} chain broken at seq {seq}: {reason}")
            }
            Self::CustodyMismatch { entity, seq, reason } => {
                write!(f, "{entity} custody at seq {seq}: {reason}")
            }
        }
    }
}

/// Result of [`audit`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub lots_checked: usize,
    pub packages_checked: usize,
    pub edges_checked: usize,
    pub events_checked: u64,
    pub violations: Vec<Violation>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check every ledger invariant over the snapshot seen by `tx`.
pub fn audit<T: Transaction>(tx: &mut T) -> LedgerResult<AuditReport> {
    let lots: Vec<LotRecord> = tx.scan_all::<LotRecord>()?.into_iter().map(|(_, r)| r).collect();
    let packages: Vec<PackageRecord> =
        tx.scan_all::<PackageRecord>()?.into_iter().map(|(_, r)| r).collect();
    let balances: HashMap<LotId, Grams> = tx
        .scan_all::<BalanceRecord>()?
        .into_iter()
        .map(|(_, b)| (b.lot, b.available))
        .collect();
    let outgoing: Vec<OutgoingEdges> =
        tx.scan_all::<OutgoingEdges>()?.into_iter().map(|(_, r)| r).collect();
    let incoming: Vec<IncomingEdges> =
        tx.scan_all::<IncomingEdges>()?.into_iter().map(|(_, r)| r).collect();

    let mut report = AuditReport {
        lots_checked: lots.len(),
        packages_checked: packages.len(),
        ..AuditReport::default()
    };

    // Conservation per lot.
    let mut consumed: HashMap<LotId, Grams> = HashMap::new();
    for edge in outgoing.iter().flat_map(|o| o.edges.iter()) {
        let total = consumed.entry(edge.source).or_default();
        *total = total.checked_add(edge.quantity).unwrap_or(Grams::MAX);
    }
    for lot in &lots {
        let used = consumed.get(&lot.id).copied().unwrap_or_default();
        let Some(&available) = balances.get(&lot.id) else {
            report.violations.push(Violation::MissingBalance { lot: lot.id });
            continue;
        };
        if used > lot.quantity_recorded {
            report.violations.push(Violation::OverConsumed {
                lot: lot.id,
                consumed: used,
                recorded: lot.quantity_recorded,
            });
        } else if available.checked_add(used) != Some(lot.quantity_recorded) {
            report.violations.push(Violation::BalanceMismatch {
                lot: lot.id,
                available,
                consumed: used,
                recorded: lot.quantity_recorded,
            });
        }
    }

    // Package totals against contents and incoming edges.
    let mut into_node: HashMap<EntityId, Grams> = HashMap::new();
    for edge in incoming.iter().flat_map(|i| i.edges.iter()) {
        let total = into_node.entry(edge.target).or_default();
        *total = total.checked_add(edge.quantity).unwrap_or(Grams::MAX);
    }
    for package in &packages {
        let contents = Grams::checked_sum(package.contents.iter().map(|c| c.quantity))
            .unwrap_or(Grams::MAX);
        let edges = into_node
            .get(&EntityId::from(package.id))
            .copied()
            .unwrap_or_default();
        if contents != package.total || edges != package.total {
            report.violations.push(Violation::PackageTotalMismatch {
                package: package.id,
                total: package.total,
                contents,
                edges,
            });
        }
    }

    // Structure and acyclicity of the global graph.
    let mut dag = CompositionDag::new();
    for lot in &lots {
        dag.ensure_node(lot.id);
    }
    for package in &packages {
        dag.ensure_node(package.id);
    }
    for edge in outgoing.iter().flat_map(|o| o.edges.iter()) {
        report.edges_checked += 1;
        if let Err(e) = dag.add_edge(edge.clone()) {
            report.violations.push(Violation::BrokenGraph {
                reason: e.to_string(),
            });
        }
    }
    let mirrored: usize = incoming.iter().map(|i| i.edges.len()).sum();
    if mirrored != report.edges_checked {
        report.violations.push(Violation::BrokenGraph {
            reason: format!(
                "{} outgoing edges but {mirrored} incoming edges",
                report.edges_checked
            ),
        });
    }
    match dag.topological_order() {
        Ok(_) => {}
        Err(DagError::CycleDetected(node)) => report.violations.push(Violation::Cycle { node }),
        Err(e) => report.violations.push(Violation::BrokenGraph {
            reason: e.to_string(),
        }),
    }

    // Hash chains, then custody replayed from each intact chain.
    let entities = lots
        .iter()
        .map(|l| (EntityId::from(l.id), l.custodian.clone()))
        .chain(packages.iter().map(|p| (EntityId::from(p.id), p.custodian.clone())));
    for (entity, custodian) in entities {
        match EventChain::verify(tx, &entity) {
            Ok(count) => {
                report.events_checked += count;
                let events = EventChain::history(tx, &entity)?;
                if let Some(v) = replay_custody(&entity, &events, &custodian)? {
                    report.violations.push(v);
                }
            }
            Err(LedgerError::ChainIntegrityViolation { seq, reason, .. }) => {
                report.violations.push(Violation::BrokenChain {
                    entity,
                    seq,
                    reason,
                });
            }
            Err(LedgerError::NotFound { .. }) => report.violations.push(Violation::BrokenChain {
                entity,
                seq: 0,
                reason: "no event chain".into(),
            }),
            Err(e) => return Err(e),
        }
    }

    if report.is_clean() {
        info!(
            lots = report.lots_checked,
            packages = report.packages_checked,
            events = report.events_checked,
            "audit clean"
        );
    } else {
        warn!(violations = report.violations.len(), "audit found violations");
    }
    Ok(report)
}

/// Follow custody through an entity's events. Every disposition must be
/// issued by the custodian of the moment, and the final custodian must match
/// the stored record.
fn replay_custody(
    entity: &EntityId,
    events: &[Event],
    expected: &ParticipantId,
) -> LedgerResult<Option<Violation>> {
    let mismatch = |seq: u64, reason: String| Violation::CustodyMismatch {
        entity: *entity,
        seq,
        reason,
    };

    let mut custodian: Option<ParticipantId> = None;
    for event in events {
        match event.kind {
            EventKind::Created => custodian = Some(event.payload_as::<CreatedPayload>()?.custodian),
            EventKind::PackageCreated => {
                custodian = Some(event.payload_as::<PackageCreatedPayload>()?.custodian)
            }
            _ => {}
        }
        let Some(current) = custodian.as_ref() else {
            return Ok(Some(mismatch(event.seq, "chain does not start with creation".into())));
        };
        if event.kind.is_disposition() && event.actor != *current {
            return Ok(Some(mismatch(
                event.seq,
                format!("{} acted while {current} held custody", event.actor),
            )));
        }
        match event.kind {
            EventKind::Transferred => {
                custodian = Some(event.payload_as::<TransferredPayload>()?.to)
            }
            EventKind::PackageTransferred => {
                custodian = Some(event.payload_as::<PackageTransferredPayload>()?.to)
            }
            _ => {}
        }
    }

    match custodian {
        Some(c) if c == *expected => Ok(None),
        Some(c) => Ok(Some(mismatch(
            events.last().map_or(0, |e| e.seq),
            format!("events end with {c} but record names {expected}"),
        ))),
        None => Ok(Some(mismatch(0, "no creation event".into()))),
    }
}
