//! Lot creation, splitting, and consolidation into packages.
//!
//! Every operation here validates everything it needs before its first
//! write, then performs the balance changes, composition edges, lot
//! records, and events inside the caller's transaction. Nothing is visible
//! to other readers until that transaction commits.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use prov_dag::{CompositionEdge, EdgeSource};
use prov_store::{Transaction, TransactionExt};
use prov_types::{
    Action, ActorContext, CommodityId, EntityId, Grams, GramsDelta, LotId, PackageId,
    ParticipantId,
};

use crate::chain::EventChain;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::events::{
    ConsolidatedPayload, CreatedPayload, Event, EventKind, LotOrigin, PackageCreatedPayload,
    SplitChild, SplitPayload, TestReport, TestedPayload,
};
use crate::lifecycle::{LifecycleEvent, LotState};
use crate::records::{
    entity_key, lot_key, package_key, CommodityRecord, IncomingEdges, LabelRecord, LotRecord,
    OutgoingEdges, PackageContent, PackageRecord,
};
use crate::registry::OwnershipRegistry;
use crate::stock::StockLedger;

/// One share of a split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Division {
    pub quantity: Grams,
    /// Custodian of the new lot. Defaults to the initiating actor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ParticipantId>,
}

impl Division {
    pub fn new(quantity: Grams) -> Self {
        Self {
            quantity,
            recipient: None,
        }
    }

    pub fn to(quantity: Grams, recipient: ParticipantId) -> Self {
        Self {
            quantity,
            recipient: Some(recipient),
        }
    }
}

/// The composition DAG as stored: lots, packages, and the edges between
/// them.
#[derive(Clone, Copy)]
pub struct CompositionGraph<'c> {
    chain: EventChain<'c>,
    config: &'c LedgerConfig,
}

impl<'c> CompositionGraph<'c> {
    pub fn new(chain: EventChain<'c>, config: &'c LedgerConfig) -> Self {
        Self { chain, config }
    }

    pub fn chain(&self) -> &EventChain<'c> {
        &self.chain
    }

    // ---------------------------------------------------------------
    // Lookups
    // ---------------------------------------------------------------

    pub fn lot<T: Transaction>(tx: &mut T, id: LotId) -> LedgerResult<LotRecord> {
        tx.get::<LotRecord>(&lot_key(&id))?
            .ok_or_else(|| LedgerError::not_found("lot", id))
    }

    pub fn package<T: Transaction>(tx: &mut T, id: PackageId) -> LedgerResult<PackageRecord> {
        tx.get::<PackageRecord>(&package_key(&id))?
            .ok_or_else(|| LedgerError::not_found("package", id))
    }

    pub fn package_by_label<T: Transaction>(tx: &mut T, label: &str) -> LedgerResult<PackageRecord> {
        let reservation = tx
            .get::<LabelRecord>(label)?
            .ok_or_else(|| LedgerError::not_found("label", label))?;
        Self::package(tx, reservation.package)
    }

    /// Edges ending at `node`, in insertion order.
    pub fn edges_into<T: Transaction>(tx: &mut T, node: &EntityId) -> LedgerResult<Vec<CompositionEdge>> {
        Ok(tx
            .get::<IncomingEdges>(&entity_key(node))?
            .unwrap_or_default()
            .edges)
    }

    /// Edges starting at `lot`, in insertion order.
    pub fn edges_from<T: Transaction>(tx: &mut T, lot: &LotId) -> LedgerResult<Vec<CompositionEdge>> {
        Ok(tx
            .get::<OutgoingEdges>(&lot_key(lot))?
            .unwrap_or_default()
            .edges)
    }

    // ---------------------------------------------------------------
    // Lots
    // ---------------------------------------------------------------

    /// Register an origin lot held by the producing actor.
    pub fn create_lot<T: Transaction>(
        &self,
        tx: &mut T,
        commodity: &CommodityId,
        quantity: Grams,
        actor: &ActorContext,
    ) -> LedgerResult<LotRecord> {
        OwnershipRegistry::authorize(tx, actor, Action::CreateLot)?;
        OwnershipRegistry::commodity(tx, commodity)?;
        if quantity.is_zero() {
            return Err(LedgerError::InvalidQuantity("lot quantity must be positive".into()));
        }

        let lot = self.insert_lot(
            tx,
            LotId::new(),
            commodity.clone(),
            quantity,
            actor.participant_id.clone(),
            LotOrigin::Harvest,
            &actor.participant_id,
        )?;
        info!(lot = %lot.id, commodity = %commodity, %quantity, "created lot");
        Ok(lot)
    }

    /// Attest a quality test. Balance and custody are untouched.
    pub fn record_test<T: Transaction>(
        &self,
        tx: &mut T,
        lot_id: LotId,
        report: TestReport,
        actor: &ActorContext,
    ) -> LedgerResult<Event> {
        OwnershipRegistry::authorize(tx, actor, Action::RecordTest)?;
        if report.test_type.trim().is_empty() {
            return Err(LedgerError::InvalidInput("test type is empty".into()));
        }
        let mut lot = Self::lot(tx, lot_id)?;
        let next = lot.state.next(LifecycleEvent::Tested).ok_or_else(|| {
            LedgerError::InvalidInput(format!("{lot_id} is {} and cannot be tested", lot.state))
        })?;

        let event = self.chain.append(
            tx,
            lot_id.into(),
            EventKind::Tested,
            &actor.participant_id,
            GramsDelta::ZERO,
            &TestedPayload {
                report,
                custodian: lot.custodian.clone(),
            },
        )?;
        if next != lot.state {
            lot.state = next;
            tx.put(&lot_key(&lot_id), &lot)?;
        }
        info!(lot = %lot_id, seq = event.seq, "recorded test");
        Ok(event)
    }

    /// Divide `source` into new child lots, one per division.
    pub fn split<T: Transaction>(
        &self,
        tx: &mut T,
        source: LotId,
        divisions: &[Division],
        actor: &ActorContext,
    ) -> LedgerResult<Vec<LotRecord>> {
        OwnershipRegistry::authorize(tx, actor, Action::Split)?;
        let children = self.divide(tx, source, divisions, actor, None)?;
        info!(lot = %source, children = children.len(), "split lot");
        Ok(children)
    }

    /// Shared body of split and partial transfer. `transfer_to` marks the
    /// split as a custody hand-off, which drives the source lot's lifecycle
    /// differently and is recorded in the event payload.
    pub(crate) fn divide<T: Transaction>(
        &self,
        tx: &mut T,
        source: LotId,
        divisions: &[Division],
        actor: &ActorContext,
        transfer_to: Option<&ParticipantId>,
    ) -> LedgerResult<Vec<LotRecord>> {
        if divisions.is_empty() {
            return Err(LedgerError::InvalidQuantity("split needs at least one division".into()));
        }
        if divisions.len() > self.config.max_divisions_per_split {
            return Err(LedgerError::InvalidQuantity(format!(
                "split into {} divisions exceeds the limit of {}",
                divisions.len(),
                self.config.max_divisions_per_split
            )));
        }
        if divisions.iter().any(|d| d.quantity.is_zero()) {
            return Err(LedgerError::InvalidQuantity("every division must be positive".into()));
        }
        let total = Grams::checked_sum(divisions.iter().map(|d| d.quantity))
            .ok_or_else(|| LedgerError::InvalidQuantity("division total overflows".into()))?;

        let mut lot = Self::lot(tx, source)?;
        OwnershipRegistry::require_custodian(&lot.custodian, actor, source)?;
        for recipient in divisions.iter().filter_map(|d| d.recipient.as_ref()) {
            OwnershipRegistry::require_recipient(tx, recipient)?;
        }
        if lot.state.is_terminal() {
            return Err(LedgerError::InsufficientStock {
                lot: source,
                requested: total,
                available: StockLedger::available(tx, source)?,
            });
        }
        let remaining = StockLedger::check(tx, source, total)?;
        let lifecycle = match transfer_to {
            Some(_) => LifecycleEvent::Transferred { remaining },
            None => LifecycleEvent::Split { remaining },
        };
        let next = lot.state.next(lifecycle).ok_or(LedgerError::InsufficientStock {
            lot: source,
            requested: total,
            available: remaining,
        })?;

        let planned: Vec<SplitChild> = divisions
            .iter()
            .map(|d| SplitChild {
                lot: LotId::new(),
                quantity: d.quantity,
                custodian: d
                    .recipient
                    .clone()
                    .unwrap_or_else(|| actor.participant_id.clone()),
            })
            .collect();

        self.chain.append(
            tx,
            source.into(),
            EventKind::Split,
            &actor.participant_id,
            GramsDelta::debit(total),
            &SplitPayload {
                children: planned.clone(),
                remaining,
                transfer_to: transfer_to.cloned(),
            },
        )?;
        StockLedger::debit(tx, source, total)?;

        let mut children = Vec::with_capacity(planned.len());
        for child in planned {
            Self::add_edge(tx, CompositionEdge::new(source, child.lot, child.quantity))?;
            children.push(self.insert_lot(
                tx,
                child.lot,
                lot.commodity.clone(),
                child.quantity,
                child.custodian,
                LotOrigin::Split { source },
                &actor.participant_id,
            )?);
        }

        lot.state = next;
        tx.put(&lot_key(&source), &lot)?;
        Ok(children)
    }

    // ---------------------------------------------------------------
    // Packages
    // ---------------------------------------------------------------

    /// Seal quantities drawn from one or more lots into a labelled package.
    ///
    /// The label is reserved in the same transaction that creates the
    /// package, so two racing requests for one label cannot both commit.
    pub fn consolidate<T: Transaction>(
        &self,
        tx: &mut T,
        contents: &[(LotId, Grams)],
        label: &str,
        actor: &ActorContext,
    ) -> LedgerResult<PackageRecord> {
        OwnershipRegistry::authorize(tx, actor, Action::Consolidate)?;
        self.validate_label(label)?;
        if contents.is_empty() {
            return Err(LedgerError::InvalidQuantity("package needs at least one lot".into()));
        }
        let mut seen = HashSet::new();
        for (lot, quantity) in contents {
            if !seen.insert(*lot) {
                return Err(LedgerError::InvalidQuantity(format!("{lot} appears more than once")));
            }
            if quantity.is_zero() {
                return Err(LedgerError::InvalidQuantity(format!(
                    "quantity drawn from {lot} must be positive"
                )));
            }
        }
        let total = Grams::checked_sum(contents.iter().map(|(_, q)| *q))
            .ok_or_else(|| LedgerError::InvalidQuantity("package total overflows".into()))?;
        if tx.get::<LabelRecord>(label)?.is_some() {
            return Err(LedgerError::DuplicateLabel(label.to_string()));
        }

        let mut sources: Vec<(LotRecord, Grams, LotState)> = Vec::with_capacity(contents.len());
        let mut commodities: Vec<CommodityRecord> = Vec::new();
        for &(lot_id, quantity) in contents {
            let lot = Self::lot(tx, lot_id)?;
            OwnershipRegistry::require_custodian(&lot.custodian, actor, lot_id)?;
            let available = StockLedger::available(tx, lot_id)?;
            if lot.state.is_terminal() {
                return Err(LedgerError::InsufficientStock {
                    lot: lot_id,
                    requested: quantity,
                    available,
                });
            }
            let remaining = StockLedger::check(tx, lot_id, quantity)?;
            let next = lot
                .state
                .next(LifecycleEvent::Consolidated { remaining })
                .ok_or(LedgerError::InsufficientStock {
                    lot: lot_id,
                    requested: quantity,
                    available,
                })?;
            if commodities.iter().all(|c| c.commodity.id != lot.commodity) {
                commodities.push(OwnershipRegistry::commodity(tx, &lot.commodity)?);
            }
            sources.push((lot, quantity, next));
        }

        let package_id = PackageId::new();
        tx.put(
            label,
            &LabelRecord {
                label: label.to_string(),
                package: package_id,
            },
        )?;

        let mut package_contents = Vec::with_capacity(sources.len());
        let mut sealed_at = None;
        for (mut lot, quantity, next) in sources {
            let remaining = StockLedger::debit(tx, lot.id, quantity)?;
            Self::add_edge(tx, CompositionEdge::new(lot.id, package_id, quantity))?;
            let event = self.chain.append(
                tx,
                lot.id.into(),
                EventKind::Consolidated,
                &actor.participant_id,
                GramsDelta::debit(quantity),
                &ConsolidatedPayload {
                    package: package_id,
                    label: label.to_string(),
                    quantity,
                    remaining,
                },
            )?;
            sealed_at = Some(event.timestamp);
            lot.state = next;
            tx.put(&lot_key(&lot.id), &lot)?;
            package_contents.push(PackageContent {
                lot: lot.id,
                commodity: lot.commodity,
                quantity,
            });
        }

        // Expiry counts from the moment the last content was sealed, using
        // the shortest shelf life among the contents.
        let expires_at = match (
            sealed_at,
            commodities
                .iter()
                .filter(|c| c.commodity.shelf_life_months.is_some())
                .min_by_key(|c| c.commodity.shelf_life_months),
        ) {
            (Some(at), Some(shortest)) => shortest.commodity.expiry_from(at.to_datetime()),
            _ => None,
        };

        let event = self.chain.append(
            tx,
            package_id.into(),
            EventKind::PackageCreated,
            &actor.participant_id,
            GramsDelta::credit(total),
            &PackageCreatedPayload {
                label: label.to_string(),
                contents: package_contents.clone(),
                total,
                custodian: actor.participant_id.clone(),
                expires_at,
            },
        )?;
        let package = PackageRecord {
            id: package_id,
            label: label.to_string(),
            custodian: actor.participant_id.clone(),
            contents: package_contents,
            total,
            created_at: event.timestamp,
            expires_at,
        };
        tx.put(&package_key(&package_id), &package)?;

        info!(package = %package_id, label, lots = package.contents.len(), %total, "sealed package");
        Ok(package)
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn validate_label(&self, label: &str) -> LedgerResult<()> {
        if label.trim().is_empty() {
            return Err(LedgerError::InvalidInput("package label is empty".into()));
        }
        if label.len() > self.config.max_label_len {
            return Err(LedgerError::InvalidInput(format!(
                "package label exceeds {} bytes",
                self.config.max_label_len
            )));
        }
        if label.chars().any(char::is_control) {
            return Err(LedgerError::InvalidInput("package label contains control characters".into()));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_lot<T: Transaction>(
        &self,
        tx: &mut T,
        id: LotId,
        commodity: CommodityId,
        quantity: Grams,
        custodian: ParticipantId,
        origin: LotOrigin,
        actor: &ParticipantId,
    ) -> LedgerResult<LotRecord> {
        StockLedger::initialize(tx, id, quantity)?;
        let event = self.chain.append(
            tx,
            id.into(),
            EventKind::Created,
            actor,
            GramsDelta::credit(quantity),
            &CreatedPayload {
                commodity: commodity.clone(),
                quantity,
                custodian: custodian.clone(),
                origin,
            },
        )?;
        let record = LotRecord {
            id,
            commodity,
            quantity_recorded: quantity,
            custodian,
            state: LotState::Created,
            created_at: event.timestamp,
        };
        tx.put(&lot_key(&id), &record)?;
        Ok(record)
    }

    /// Append an edge to both adjacency lists. Edges are never rewritten.
    fn add_edge<T: Transaction>(tx: &mut T, edge: CompositionEdge) -> LedgerResult<()> {
        let in_key = entity_key(&edge.target);
        let mut incoming = tx.get::<IncomingEdges>(&in_key)?.unwrap_or_default();
        incoming.edges.push(edge.clone());
        tx.put(&in_key, &incoming)?;

        let out_key = lot_key(&edge.source);
        let mut outgoing = tx.get::<OutgoingEdges>(&out_key)?.unwrap_or_default();
        outgoing.edges.push(edge);
        tx.put(&out_key, &outgoing)?;
        Ok(())
    }
}

/// Composition edges read through a store transaction, for the traversals
/// in `prov-dag`.
pub struct StoredEdges<'t, T> {
    tx: &'t mut T,
}

impl<'t, T: Transaction> StoredEdges<'t, T> {
    pub fn new(tx: &'t mut T) -> Self {
        Self { tx }
    }
}

impl<T: Transaction> EdgeSource for StoredEdges<'_, T> {
    type Error = LedgerError;

    fn incoming(&mut self, node: &EntityId) -> LedgerResult<Vec<CompositionEdge>> {
        CompositionGraph::edges_into(self.tx, node)
    }

    fn outgoing(&mut self, lot: &LotId) -> LedgerResult<Vec<CompositionEdge>> {
        CompositionGraph::edges_from(self.tx, lot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TestOutcome;
    use crate::fixtures::*;
    use prov_store::Store;

    fn kinds(events: &[Event]) -> Vec<EventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn create_lot_requires_producer_and_known_commodity() {
        let fx = Fixture::new();
        let mut tx = fx.tx();
        let graph = fx.graph();
        assert!(matches!(
            graph.create_lot(&mut tx, &cid("pepper"), g(10), &trader()),
            Err(LedgerError::Unauthorized(_))
        ));
        assert!(matches!(
            graph.create_lot(&mut tx, &cid("saffron"), g(10), &farmer()),
            Err(LedgerError::NotFound { kind: "commodity", .. })
        ));
        assert!(matches!(
            graph.create_lot(&mut tx, &cid("pepper"), Grams::ZERO, &farmer()),
            Err(LedgerError::InvalidQuantity(_))
        ));

        let lot = graph.create_lot(&mut tx, &cid("pepper"), g(10), &farmer()).unwrap();
        assert_eq!(lot.state, LotState::Created);
        assert_eq!(lot.custodian, pid("farmer"));
        assert_eq!(StockLedger::available(&mut tx, lot.id).unwrap(), g(10));
        let events = EventChain::history(&mut tx, &lot.id.into()).unwrap();
        assert_eq!(kinds(&events), vec![EventKind::Created]);
        assert_eq!(events[0].quantity_delta, GramsDelta::credit(g(10)));
    }

    #[test]
    fn split_creates_children_edges_and_events() {
        let fx = Fixture::new();
        let lot = fx.harvest(1000);
        let mut tx = fx.tx();
        let children = fx
            .graph()
            .split(
                &mut tx,
                lot,
                &[Division::new(g(400)), Division::to(g(600), pid("trader"))],
                &farmer(),
            )
            .unwrap();
        tx.commit().unwrap();

        let mut tx = fx.tx();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].custodian, pid("farmer"));
        assert_eq!(children[1].custodian, pid("trader"));
        assert_eq!(StockLedger::available(&mut tx, lot).unwrap(), Grams::ZERO);
        assert_eq!(CompositionGraph::lot(&mut tx, lot).unwrap().state, LotState::Depleted);

        let edges = CompositionGraph::edges_from(&mut tx, &lot).unwrap();
        let targets: Vec<EntityId> = edges.iter().map(|e| e.target).collect();
        assert_eq!(targets, vec![children[0].id.into(), children[1].id.into()]);

        let source_events = EventChain::history(&mut tx, &lot.into()).unwrap();
        assert_eq!(kinds(&source_events), vec![EventKind::Created, EventKind::Split]);
        let child_events = EventChain::history(&mut tx, &children[0].id.into()).unwrap();
        assert_eq!(kinds(&child_events), vec![EventKind::Created]);
        assert!(source_events[1].timestamp < child_events[0].timestamp);
    }

    #[test]
    fn split_validation_writes_nothing() {
        let fx = Fixture::new();
        let lot = fx.harvest(1000);
        let graph = fx.graph();
        let cases: Vec<(Vec<Division>, ActorContext)> = vec![
            (vec![], farmer()),
            (vec![Division::new(g(600)), Division::new(g(500))], farmer()),
            (vec![Division::new(Grams::ZERO)], farmer()),
            (vec![Division::new(g(10))], trader()),
            (vec![Division::to(g(10), pid("lab"))], farmer()),
        ];
        for (divisions, actor) in cases {
            let mut tx = fx.tx();
            assert!(graph.split(&mut tx, lot, &divisions, &actor).is_err());
            tx.rollback();
        }
        let mut tx = fx.tx();
        assert_eq!(StockLedger::available(&mut tx, lot).unwrap(), g(1000));
        assert_eq!(EventChain::history(&mut tx, &lot.into()).unwrap().len(), 1);
    }

    #[test]
    fn split_respects_division_limit() {
        let mut fx = Fixture::new();
        fx.config.max_divisions_per_split = 2;
        let lot = fx.harvest(1000);
        let mut tx = fx.tx();
        let divisions = vec![Division::new(g(1)); 3];
        assert!(matches!(
            fx.graph().split(&mut tx, lot, &divisions, &farmer()),
            Err(LedgerError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn depleted_lot_cannot_be_split_again() {
        let fx = Fixture::new();
        let lot = fx.harvest(100);
        let mut tx = fx.tx();
        let graph = fx.graph();
        graph.split(&mut tx, lot, &[Division::new(g(100))], &farmer()).unwrap();
        assert!(matches!(
            graph.split(&mut tx, lot, &[Division::new(g(1))], &farmer()),
            Err(LedgerError::InsufficientStock { .. })
        ));
    }

    #[test]
    fn record_test_moves_to_tested_once() {
        let fx = Fixture::new();
        let lot = fx.harvest(100);
        let mut tx = fx.tx();
        let graph = fx.graph();
        let report = TestReport {
            test_type: "moisture".into(),
            outcome: TestOutcome::Passed,
            grade: Some("A".into()),
            notes: None,
        };
        assert!(matches!(
            graph.record_test(&mut tx, lot, report.clone(), &farmer()),
            Err(LedgerError::Unauthorized(_))
        ));
        let event = graph.record_test(&mut tx, lot, report.clone(), &lab()).unwrap();
        assert_eq!(event.seq, 2);
        assert_eq!(event.payload["custodian"], "farmer");
        assert_eq!(CompositionGraph::lot(&mut tx, lot).unwrap().state, LotState::Tested);

        graph.split(&mut tx, lot, &[Division::new(g(10))], &farmer()).unwrap();
        graph.record_test(&mut tx, lot, report, &lab()).unwrap();
        assert_eq!(CompositionGraph::lot(&mut tx, lot).unwrap().state, LotState::Split);
        assert_eq!(StockLedger::available(&mut tx, lot).unwrap(), g(90));
    }

    #[test]
    fn consolidate_seals_package() {
        let fx = Fixture::new();
        let a = fx.harvest(500);
        let b = {
            let mut tx = fx.tx();
            let lot = fx
                .graph()
                .create_lot(&mut tx, &cid("cumin"), g(200), &farmer())
                .unwrap();
            tx.commit().unwrap();
            lot.id
        };

        let mut tx = fx.tx();
        let package = fx
            .graph()
            .consolidate(&mut tx, &[(a, g(300)), (b, g(200))], "P1", &farmer())
            .unwrap();
        tx.commit().unwrap();

        assert_eq!(package.total, g(500));
        assert_eq!(package.contents.len(), 2);
        let expires = package.expires_at.unwrap();
        let created = package.created_at.to_datetime();
        assert!(expires > created + chrono::Duration::days(27 * 6));
        assert!(expires < created + chrono::Duration::days(32 * 6));

        let mut tx = fx.tx();
        assert_eq!(CompositionGraph::package_by_label(&mut tx, "P1").unwrap(), package);
        assert_eq!(CompositionGraph::lot(&mut tx, a).unwrap().state, LotState::PartiallyPackaged);
        assert_eq!(CompositionGraph::lot(&mut tx, b).unwrap().state, LotState::Packaged);
        assert_eq!(StockLedger::available(&mut tx, a).unwrap(), g(200));
        let incoming = CompositionGraph::edges_into(&mut tx, &package.id.into()).unwrap();
        assert_eq!(incoming.len(), 2);
        let a_events = EventChain::history(&mut tx, &a.into()).unwrap();
        let p_events = EventChain::history(&mut tx, &package.id.into()).unwrap();
        assert_eq!(kinds(&a_events), vec![EventKind::Created, EventKind::Consolidated]);
        assert_eq!(kinds(&p_events), vec![EventKind::PackageCreated]);
        assert!(a_events[1].timestamp < p_events[0].timestamp);
    }

    #[test]
    fn consolidate_rejects_bad_requests() {
        let fx = Fixture::new();
        let lot = fx.harvest(150);
        fx.package(lot, 10, "TAKEN");
        let graph = fx.graph();
        let long = "x".repeat(fx.config.max_label_len + 1);

        let mut tx = fx.tx();
        assert!(matches!(
            graph.consolidate(&mut tx, &[(lot, g(1))], "TAKEN", &farmer()),
            Err(LedgerError::DuplicateLabel(_))
        ));
        assert!(matches!(
            graph.consolidate(&mut tx, &[(lot, g(1))], "  ", &farmer()),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            graph.consolidate(&mut tx, &[(lot, g(1))], &long, &farmer()),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            graph.consolidate(&mut tx, &[(lot, g(1)), (lot, g(1))], "P2", &farmer()),
            Err(LedgerError::InvalidQuantity(_))
        ));
        assert!(matches!(
            graph.consolidate(&mut tx, &[(lot, g(141))], "P2", &farmer()),
            Err(LedgerError::InsufficientStock { .. })
        ));
        assert!(matches!(
            graph.consolidate(&mut tx, &[(lot, g(1))], "P2", &packer()),
            Err(LedgerError::Unauthorized(_))
        ));
        assert!(matches!(
            graph.consolidate(&mut tx, &[(LotId::new(), g(1))], "P2", &farmer()),
            Err(LedgerError::NotFound { kind: "lot", .. })
        ));
        assert!(matches!(
            CompositionGraph::package_by_label(&mut tx, "P2"),
            Err(LedgerError::NotFound { kind: "label", .. })
        ));
        assert_eq!(StockLedger::available(&mut tx, lot).unwrap(), g(140));
    }

    #[test]
    fn racing_labels_cannot_both_commit() {
        let fx = Fixture::new();
        let a = fx.harvest(100);
        let b = fx.harvest(100);
        let graph = fx.graph();
        let mut t1 = fx.store.begin_transaction().unwrap();
        let mut t2 = fx.store.begin_transaction().unwrap();
        graph.consolidate(&mut t1, &[(a, g(10))], "SAME", &farmer()).unwrap();
        graph.consolidate(&mut t2, &[(b, g(10))], "SAME", &farmer()).unwrap();
        t1.commit().unwrap();
        assert!(t2.commit().unwrap_err().is_conflict());
    }

    #[test]
    fn stored_edges_feed_traversal() {
        let fx = Fixture::new();
        let lot = fx.harvest(100);
        let package = fx.package(lot, 40, "P1");
        let mut tx = fx.tx();
        let closure =
            prov_dag::reverse_closure(&mut StoredEdges::new(&mut tx), package.id.into()).unwrap();
        assert_eq!(closure.origins, vec![lot]);
        let impact = prov_dag::forward_impact(&mut StoredEdges::new(&mut tx), lot).unwrap();
        assert_eq!(impact.packages.len(), 1);
    }
}
