use serde::Serialize;
use tracing::{debug, warn};

use prov_crypto::{HashChainVerifier, GENESIS_SEQ};
use prov_store::{Transaction, TransactionExt};
use prov_types::{EntityId, GramsDelta, HybridClock, ParticipantId};

use crate::error::{LedgerError, LedgerResult};
use crate::events::{Event, EventKind};
use crate::records::{entity_key, event_key, ChainHead};

/// Append-only, hash-linked event log per lot and per package.
///
/// Appends happen inside the caller's transaction. Reading the chain head
/// puts it in the transaction's read set, so two transactions appending to
/// the same entity cannot both commit and `prev_hash` always names the true
/// predecessor.
#[derive(Clone, Copy)]
pub struct EventChain<'c> {
    clock: &'c HybridClock,
}

impl<'c> EventChain<'c> {
    pub fn new(clock: &'c HybridClock) -> Self {
        Self { clock }
    }

    pub fn head<T: Transaction>(tx: &mut T, entity: &EntityId) -> LedgerResult<Option<ChainHead>> {
        Ok(tx.get::<ChainHead>(&entity_key(entity))?)
    }

    /// Append one event to `entity`'s chain and return it.
    pub fn append<T: Transaction, P: Serialize>(
        &self,
        tx: &mut T,
        entity: EntityId,
        kind: EventKind,
        actor: &ParticipantId,
        quantity_delta: GramsDelta,
        payload: &P,
    ) -> LedgerResult<Event> {
        let payload = serde_json::to_value(payload)?;
        let (seq, prev_hash, timestamp) = match Self::head(tx, &entity)? {
            Some(head) => (
                head.seq + 1,
                Some(head.hash),
                self.clock.tick_after(&head.timestamp),
            ),
            None => (GENESIS_SEQ, None, self.clock.now()),
        };

        let body = Event::hashed_body(
            &entity,
            seq,
            kind,
            actor,
            quantity_delta,
            &payload,
            &timestamp,
        );
        let hash = HashChainVerifier::compute_hash(prev_hash.as_ref(), &body);

        let event = Event {
            entity,
            seq,
            kind,
            actor: actor.clone(),
            timestamp,
            quantity_delta,
            payload,
            prev_hash,
            hash,
        };
        tx.put(&event_key(&entity, seq), &event)?;
        tx.put(
            &entity_key(&entity),
            &ChainHead {
                entity,
                seq,
                hash,
                timestamp,
            },
        )?;

        debug!(entity = %entity, seq, kind = %kind, hash = %hash.short_hex(), "appended event");
        Ok(event)
    }

    /// Every event of `entity`, oldest first. Empty if the entity has no chain.
    pub fn history<T: Transaction>(tx: &mut T, entity: &EntityId) -> LedgerResult<Vec<Event>> {
        let Some(head) = Self::head(tx, entity)? else {
            return Ok(Vec::new());
        };
        (GENESIS_SEQ..=head.seq)
            .map(|seq| {
                tx.get::<Event>(&event_key(entity, seq))?
                    .ok_or_else(|| LedgerError::ChainIntegrityViolation {
                        entity: *entity,
                        seq,
                        reason: "event missing from chain".into(),
                    })
            })
            .collect()
    }

    /// Replay `entity`'s chain from genesis and return the number of events.
    ///
    /// Fails with `ChainIntegrityViolation` at the first offending sequence
    /// number, and with `NotFound` if the entity has no chain.
    pub fn verify<T: Transaction>(tx: &mut T, entity: &EntityId) -> LedgerResult<u64> {
        let head = Self::head(tx, entity)?.ok_or_else(|| LedgerError::not_found("chain", entity))?;
        let events = Self::history(tx, entity)?;

        let violation = |seq: u64, reason: &str| LedgerError::ChainIntegrityViolation {
            entity: *entity,
            seq,
            reason: reason.to_string(),
        };

        if let Some(stray) = events.iter().find(|e| e.entity != *entity) {
            return Err(violation(stray.seq, "event belongs to another entity"));
        }
        if let Err(e) = HashChainVerifier::verify_chain(&events) {
            warn!(entity = %entity, seq = e.seq(), error = %e, "hash chain verification failed");
            return Err(LedgerError::from_chain(*entity, e));
        }
        match events.last() {
            Some(last) if last.hash == head.hash && last.timestamp == head.timestamp => {}
            _ => return Err(violation(head.seq, "chain head does not match last event")),
        }
        if let Some(pair) = events.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(violation(pair[1].seq, "timestamp does not advance"));
        }

        Ok(events.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prov_store::{InMemoryStore, Store};
    use prov_types::LotId;
    use serde_json::json;

    fn actor() -> ParticipantId {
        ParticipantId::new("farmer-1").unwrap()
    }

    fn append_n(store: &InMemoryStore, clock: &HybridClock, entity: EntityId, n: usize) {
        let chain = EventChain::new(clock);
        let mut tx = store.begin_transaction().unwrap();
        for i in 0..n {
            chain
                .append(&mut tx, entity, EventKind::Tested, &actor(), GramsDelta::ZERO, &json!({ "i": i }))
                .unwrap();
        }
        tx.commit().unwrap();
    }

    #[test]
    fn appends_link_and_verify() {
        let store = InMemoryStore::new();
        let clock = HybridClock::new(0);
        let entity = EntityId::from(LotId::new());
        append_n(&store, &clock, entity, 3);

        let mut tx = store.begin_transaction().unwrap();
        let events = EventChain::history(&mut tx, &entity).unwrap();
        assert_eq!(events.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(events[0].prev_hash, None);
        assert_eq!(events[1].prev_hash, Some(events[0].hash));
        assert!(events[0].timestamp < events[1].timestamp);
        assert_eq!(EventChain::verify(&mut tx, &entity).unwrap(), 3);
    }

    #[test]
    fn chains_are_independent_per_entity() {
        let store = InMemoryStore::new();
        let clock = HybridClock::new(0);
        let (a, b) = (EntityId::from(LotId::new()), EntityId::from(LotId::new()));
        append_n(&store, &clock, a, 2);
        append_n(&store, &clock, b, 1);

        let mut tx = store.begin_transaction().unwrap();
        assert_eq!(EventChain::head(&mut tx, &b).unwrap().unwrap().seq, 1);
        assert_eq!(EventChain::verify(&mut tx, &a).unwrap(), 2);
    }

    #[test]
    fn tampered_payload_reports_seq() {
        let store = InMemoryStore::new();
        let clock = HybridClock::new(0);
        let entity = EntityId::from(LotId::new());
        append_n(&store, &clock, entity, 3);

        let mut tx = store.begin_transaction().unwrap();
        let mut second = tx.get::<Event>(&event_key(&entity, 2)).unwrap().unwrap();
        second.payload = json!({ "i": 99 });
        tx.put(&event_key(&entity, 2), &second).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin_transaction().unwrap();
        let err = EventChain::verify(&mut tx, &entity).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ChainIntegrityViolation { seq: 2, .. }
        ));
    }

    #[test]
    fn truncated_chain_is_detected() {
        let store = InMemoryStore::new();
        let clock = HybridClock::new(0);
        let entity = EntityId::from(LotId::new());
        append_n(&store, &clock, entity, 2);

        // Roll the head back to seq 1 so the last event is orphaned.
        let mut tx = store.begin_transaction().unwrap();
        let first = tx.get::<Event>(&event_key(&entity, 1)).unwrap().unwrap();
        let mut head = EventChain::head(&mut tx, &entity).unwrap().unwrap();
        head.seq = 1;
        tx.put(&entity_key(&entity), &head).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin_transaction().unwrap();
        let err = EventChain::verify(&mut tx, &entity).unwrap_err();
        assert!(matches!(err, LedgerError::ChainIntegrityViolation { seq: 1, .. }));
        assert_ne!(head.hash, first.hash);
    }

    #[test]
    fn unknown_entity_is_not_found() {
        let store = InMemoryStore::new();
        let mut tx = store.begin_transaction().unwrap();
        let entity = EntityId::from(LotId::new());
        assert!(matches!(
            EventChain::verify(&mut tx, &entity),
            Err(LedgerError::NotFound { kind: "chain", .. })
        ));
        assert!(EventChain::history(&mut tx, &entity).unwrap().is_empty());
    }

    #[test]
    fn concurrent_appends_to_one_entity_conflict() {
        let store = InMemoryStore::new();
        let clock = HybridClock::new(0);
        let entity = EntityId::from(LotId::new());
        append_n(&store, &clock, entity, 1);

        let chain = EventChain::new(&clock);
        let mut t1 = store.begin_transaction().unwrap();
        let mut t2 = store.begin_transaction().unwrap();
        chain
            .append(&mut t1, entity, EventKind::Tested, &actor(), GramsDelta::ZERO, &json!({}))
            .unwrap();
        chain
            .append(&mut t2, entity, EventKind::Tested, &actor(), GramsDelta::ZERO, &json!({}))
            .unwrap();
        t1.commit().unwrap();
        assert!(t2.commit().unwrap_err().is_conflict());
    }
}
