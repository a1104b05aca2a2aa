use tracing::{debug, info, warn};

use prov_dag::ImpactReport;
use prov_store::{Store, Transaction};
use prov_types::{
    ActorContext, CommodityId, CommodityType, EntityId, Grams, HybridClock, LotId, PackageId,
    ParticipantId, Role,
};

use crate::audit::{audit, AuditReport};
use crate::chain::EventChain;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::events::{Event, TestReport};
use crate::graph::{CompositionGraph, Division};
use crate::lineage::{LineageResolver, Trace};
use crate::records::{CommodityRecord, LotView, PackageRecord, ParticipantRecord};
use crate::registry::OwnershipRegistry;
use crate::stock::StockLedger;

/// The boundary facade over a transactional store.
///
/// Every mutating call runs as one store transaction: either all of its
/// balances, edges, records, and events commit together or none do. A
/// commit conflict re-runs the whole unit of work against a fresh snapshot,
/// up to `max_commit_retries` times. Queries run on a read-only snapshot.
pub struct Provenance<S: Store> {
    store: S,
    clock: HybridClock,
    config: LedgerConfig,
}

impl<S: Store> Provenance<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self {
            store,
            clock: HybridClock::new(config.node_id),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn graph(&self) -> CompositionGraph<'_> {
        CompositionGraph::new(EventChain::new(&self.clock), &self.config)
    }

    fn registry(&self) -> OwnershipRegistry<'_> {
        OwnershipRegistry::new(self.graph())
    }

    /// Run `work` in a transaction and commit, retrying on conflict.
    fn write<R>(
        &self,
        op: &'static str,
        mut work: impl FnMut(&Self, &mut S::Tx) -> LedgerResult<R>,
    ) -> LedgerResult<R> {
        let mut attempt = 0;
        loop {
            let mut tx = self.store.begin_transaction()?;
            let value = match work(self, &mut tx) {
                Ok(value) => value,
                Err(e) => {
                    tx.rollback();
                    debug!(op, error = %e, "rolled back");
                    return Err(e);
                }
            };
            match tx.commit() {
                Ok(commit_seq) => {
                    debug!(op, commit_seq, attempt, "committed");
                    return Ok(value);
                }
                Err(e) if e.is_conflict() && attempt < self.config.max_commit_retries => {
                    attempt += 1;
                    warn!(op, attempt, error = %e, "commit conflict, retrying");
                }
                Err(e) => {
                    warn!(op, attempt, error = %e, "commit failed");
                    return Err(e.into());
                }
            }
        }
    }

    /// Run `query` on a snapshot and discard the transaction.
    fn read<R>(&self, query: impl FnOnce(&mut S::Tx) -> LedgerResult<R>) -> LedgerResult<R> {
        let mut tx = self.store.begin_transaction()?;
        let result = query(&mut tx);
        tx.rollback();
        result
    }

    // ---------------------------------------------------------------
    // Registry
    // ---------------------------------------------------------------

    pub fn register_participant(
        &self,
        id: ParticipantId,
        role: Role,
        display_name: &str,
    ) -> LedgerResult<ParticipantRecord> {
        self.write("register_participant", |_, tx| {
            OwnershipRegistry::register_participant(tx, id.clone(), role, display_name)
        })
    }

    pub fn register_commodity(&self, commodity: CommodityType) -> LedgerResult<CommodityRecord> {
        self.write("register_commodity", |_, tx| {
            OwnershipRegistry::register_commodity(tx, commodity.clone())
        })
    }

    pub fn participant(&self, id: &ParticipantId) -> LedgerResult<ParticipantRecord> {
        self.read(|tx| OwnershipRegistry::participant(tx, id))
    }

    pub fn commodity(&self, id: &CommodityId) -> LedgerResult<CommodityRecord> {
        self.read(|tx| OwnershipRegistry::commodity(tx, id))
    }

    // ---------------------------------------------------------------
    // Dispositions
    // ---------------------------------------------------------------

    pub fn create_lot(
        &self,
        commodity: &CommodityId,
        quantity: Grams,
        actor: &ActorContext,
    ) -> LedgerResult<LotId> {
        self.write("create_lot", |engine, tx| {
            Ok(engine.graph().create_lot(tx, commodity, quantity, actor)?.id)
        })
    }

    pub fn record_test(
        &self,
        lot: LotId,
        report: TestReport,
        actor: &ActorContext,
    ) -> LedgerResult<Event> {
        self.write("record_test", |engine, tx| {
            engine.graph().record_test(tx, lot, report.clone(), actor)
        })
    }

    /// Split a lot; returns the child lot ids in division order.
    pub fn split(
        &self,
        lot: LotId,
        divisions: &[Division],
        actor: &ActorContext,
    ) -> LedgerResult<Vec<LotId>> {
        self.write("split", |engine, tx| {
            let children = engine.graph().split(tx, lot, divisions, actor)?;
            Ok(children.into_iter().map(|c| c.id).collect())
        })
    }

    /// Transfer custody; returns the lot now held by `to`.
    pub fn transfer(
        &self,
        lot: LotId,
        to: &ParticipantId,
        quantity: Grams,
        actor: &ActorContext,
    ) -> LedgerResult<LotId> {
        self.write("transfer", |engine, tx| {
            engine.registry().transfer(tx, lot, to, quantity, actor)
        })
    }

    pub fn consolidate(
        &self,
        contents: &[(LotId, Grams)],
        label: &str,
        actor: &ActorContext,
    ) -> LedgerResult<PackageId> {
        self.write("consolidate", |engine, tx| {
            Ok(engine.graph().consolidate(tx, contents, label, actor)?.id)
        })
    }

    pub fn transfer_package(
        &self,
        label: &str,
        to: &ParticipantId,
        actor: &ActorContext,
    ) -> LedgerResult<PackageRecord> {
        self.write("transfer_package", |engine, tx| {
            engine.registry().transfer_package(tx, label, to, actor)
        })
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub fn trace(&self, label: &str) -> LedgerResult<Trace> {
        self.read(|tx| LineageResolver::trace(tx, label))
    }

    pub fn impact(&self, lot: LotId) -> LedgerResult<ImpactReport> {
        self.read(|tx| LineageResolver::impact(tx, lot))
    }

    /// Replay an entity's chain from genesis.
    ///
    /// Returns `true` when every stored hash is reproduced. A break is never
    /// reported as `false`: it surfaces as `ChainIntegrityViolation` carrying
    /// the first offending sequence number.
    pub fn verify_chain(&self, entity: &EntityId) -> LedgerResult<bool> {
        match self.read(|tx| EventChain::verify(tx, entity)) {
            Ok(events) => {
                info!(entity = %entity, events, "chain verified");
                Ok(true)
            }
            Err(e @ LedgerError::ChainIntegrityViolation { .. }) => {
                warn!(entity = %entity, error = %e, "chain verification failed");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub fn audit(&self) -> LedgerResult<AuditReport> {
        self.read(|tx| audit(tx))
    }

    pub fn lot(&self, id: LotId) -> LedgerResult<LotView> {
        self.read(|tx| {
            let lot = CompositionGraph::lot(tx, id)?;
            let available = StockLedger::available(tx, id)?;
            Ok(LotView { lot, available })
        })
    }

    pub fn package(&self, label: &str) -> LedgerResult<PackageRecord> {
        self.read(|tx| CompositionGraph::package_by_label(tx, label))
    }

    pub fn history(&self, entity: &EntityId) -> LedgerResult<Vec<Event>> {
        self.read(|tx| {
            let events = EventChain::history(tx, entity)?;
            if events.is_empty() {
                return Err(LedgerError::not_found("entity", entity));
            }
            Ok(events)
        })
    }
}
