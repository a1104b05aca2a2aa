//! Shared test setup: a store with one participant per role and one
//! commodity.

use prov_store::{InMemoryStore, InMemoryTransaction, Store, Transaction};
use prov_types::{ActorContext, CommodityId, CommodityType, Grams, LotId, ParticipantId, Role};

use crate::chain::EventChain;
use crate::config::LedgerConfig;
use crate::graph::CompositionGraph;
use crate::records::PackageRecord;
use crate::registry::OwnershipRegistry;

pub(crate) struct Fixture {
    pub store: InMemoryStore,
    pub clock: prov_types::HybridClock,
    pub config: LedgerConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let fx = Self {
            store: InMemoryStore::new(),
            clock: prov_types::HybridClock::new(0),
            config: LedgerConfig::default(),
        };
        let mut tx = fx.tx();
        for (name, role) in [
            ("farmer", Role::Producer),
            ("trader", Role::Intermediary),
            ("lab", Role::Tester),
            ("packer", Role::Consolidator),
        ] {
            OwnershipRegistry::register_participant(&mut tx, pid(name), role, name).unwrap();
        }
        OwnershipRegistry::register_commodity(&mut tx, pepper()).unwrap();
        OwnershipRegistry::register_commodity(
            &mut tx,
            CommodityType::new(cid("cumin"), "Cumin", "spice", Some(6)),
        )
        .unwrap();
        tx.commit().unwrap();
        fx
    }

    pub fn tx(&self) -> InMemoryTransaction {
        self.store.begin_transaction().unwrap()
    }

    pub fn graph(&self) -> CompositionGraph<'_> {
        CompositionGraph::new(EventChain::new(&self.clock), &self.config)
    }

    pub fn registry(&self) -> OwnershipRegistry<'_> {
        OwnershipRegistry::new(self.graph())
    }

    /// A committed origin lot of `grams` pepper held by the farmer.
    pub fn harvest(&self, grams: u64) -> LotId {
        let mut tx = self.tx();
        let lot = self
            .graph()
            .create_lot(&mut tx, &cid("pepper"), g(grams), &farmer())
            .unwrap();
        tx.commit().unwrap();
        lot.id
    }

    /// A committed package of `grams` drawn from `lot` by the farmer.
    pub fn package(&self, lot: LotId, grams: u64, label: &str) -> PackageRecord {
        let mut tx = self.tx();
        let package = self
            .graph()
            .consolidate(&mut tx, &[(lot, g(grams))], label, &farmer())
            .unwrap();
        tx.commit().unwrap();
        package
    }
}

pub(crate) fn g(grams: u64) -> Grams {
    Grams::from_grams(grams).unwrap()
}

pub(crate) fn pid(name: &str) -> ParticipantId {
    ParticipantId::new(name).unwrap()
}

pub(crate) fn cid(name: &str) -> CommodityId {
    CommodityId::new(name).unwrap()
}

pub(crate) fn pepper() -> CommodityType {
    CommodityType::new(cid("pepper"), "Black pepper", "spice", Some(12))
}

pub(crate) fn farmer() -> ActorContext {
    ActorContext::new(pid("farmer"), Role::Producer)
}

pub(crate) fn trader() -> ActorContext {
    ActorContext::new(pid("trader"), Role::Intermediary)
}

pub(crate) fn lab() -> ActorContext {
    ActorContext::new(pid("lab"), Role::Tester)
}

pub(crate) fn packer() -> ActorContext {
    ActorContext::new(pid("packer"), Role::Consolidator)
}
