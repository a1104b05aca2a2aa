use chrono::Utc;
use tracing::{debug, info};

use prov_store::{Transaction, TransactionExt};
use prov_types::{
    Action, ActorContext, CommodityId, CommodityType, Grams, GramsDelta, LotId, ParticipantId,
    Role,
};

use crate::error::{LedgerError, LedgerResult};
use crate::events::{EventKind, PackageTransferredPayload, TransferredPayload};
use crate::graph::{CompositionGraph, Division};
use crate::lifecycle::LifecycleEvent;
use crate::records::{lot_key, package_key, CommodityRecord, PackageRecord, ParticipantRecord};
use crate::stock::StockLedger;

/// Participants, reference data, and custody.
///
/// Every mutating operation passes through [`authorize`](Self::authorize)
/// (registered participant, matching role, role permits the action) and,
/// for dispositions, [`require_custodian`](Self::require_custodian).
#[derive(Clone, Copy)]
pub struct OwnershipRegistry<'c> {
    graph: CompositionGraph<'c>,
}

impl<'c> OwnershipRegistry<'c> {
    pub fn new(graph: CompositionGraph<'c>) -> Self {
        Self { graph }
    }

    // ---------------------------------------------------------------
    // Participants and commodities
    // ---------------------------------------------------------------

    /// Register a participant. Idempotent for the same role; a participant's
    /// role is never reassigned.
    pub fn register_participant<T: Transaction>(
        tx: &mut T,
        id: ParticipantId,
        role: Role,
        display_name: &str,
    ) -> LedgerResult<ParticipantRecord> {
        if let Some(existing) = tx.get::<ParticipantRecord>(id.as_str())? {
            if existing.role != role {
                return Err(LedgerError::Unauthorized(format!(
                    "{id} is already registered as {}",
                    existing.role
                )));
            }
            return Ok(existing);
        }

        let record = ParticipantRecord {
            id: id.clone(),
            role,
            display_name: display_name.to_string(),
            registered_at: Utc::now(),
        };
        tx.put(id.as_str(), &record)?;
        info!(participant = %id, %role, "registered participant");
        Ok(record)
    }

    pub fn participant<T: Transaction>(tx: &mut T, id: &ParticipantId) -> LedgerResult<ParticipantRecord> {
        tx.get::<ParticipantRecord>(id.as_str())?
            .ok_or_else(|| LedgerError::not_found("participant", id))
    }

    /// Register reference data for a commodity. Immutable once written.
    pub fn register_commodity<T: Transaction>(
        tx: &mut T,
        commodity: CommodityType,
    ) -> LedgerResult<CommodityRecord> {
        if commodity.name.trim().is_empty() {
            return Err(LedgerError::InvalidInput("commodity name is empty".into()));
        }
        let key = commodity.id.as_str().to_string();
        if let Some(existing) = tx.get::<CommodityRecord>(&key)? {
            if existing.commodity != commodity {
                return Err(LedgerError::DuplicateLabel(format!(
                    "commodity {} is already registered with different attributes",
                    commodity.id
                )));
            }
            return Ok(existing);
        }

        let record = CommodityRecord {
            commodity,
            registered_at: Utc::now(),
        };
        tx.put(&key, &record)?;
        info!(commodity = %record.commodity.id, "registered commodity");
        Ok(record)
    }

    pub fn commodity<T: Transaction>(tx: &mut T, id: &CommodityId) -> LedgerResult<CommodityRecord> {
        tx.get::<CommodityRecord>(id.as_str())?
            .ok_or_else(|| LedgerError::not_found("commodity", id))
    }

    // ---------------------------------------------------------------
    // Checks
    // ---------------------------------------------------------------

    /// The actor must be registered under the role it claims, and that role
    /// must permit `action`.
    pub fn authorize<T: Transaction>(
        tx: &mut T,
        actor: &ActorContext,
        action: Action,
    ) -> LedgerResult<ParticipantRecord> {
        let id = &actor.participant_id;
        let record = tx.get::<ParticipantRecord>(id.as_str())?.ok_or_else(|| {
            LedgerError::Unauthorized(format!("{id} is not a registered participant"))
        })?;
        if record.role != actor.role {
            return Err(LedgerError::Unauthorized(format!(
                "{id} is registered as {}, not {}",
                record.role, actor.role
            )));
        }
        if !actor.role.permits(action) {
            return Err(LedgerError::Unauthorized(format!(
                "role {} may not {action}",
                actor.role
            )));
        }
        debug!(actor = %id, %action, "authorized");
        Ok(record)
    }

    pub fn require_custodian(
        custodian: &ParticipantId,
        actor: &ActorContext,
        entity: impl std::fmt::Display,
    ) -> LedgerResult<()> {
        if *custodian != actor.participant_id {
            return Err(LedgerError::Unauthorized(format!(
                "{} is not the custodian of {entity}",
                actor.participant_id
            )));
        }
        Ok(())
    }

    /// A recipient of custody must exist and hold a custody role.
    pub fn require_recipient<T: Transaction>(
        tx: &mut T,
        recipient: &ParticipantId,
    ) -> LedgerResult<ParticipantRecord> {
        let record = Self::participant(tx, recipient)?;
        if record.role == Role::Tester {
            return Err(LedgerError::Unauthorized(format!(
                "{recipient} is a tester and cannot take custody"
            )));
        }
        Ok(record)
    }

    // ---------------------------------------------------------------
    // Custody changes
    // ---------------------------------------------------------------

    /// Hand `quantity` of a lot to `to`.
    ///
    /// The whole balance changes custody in place and keeps the lot id. Any
    /// smaller quantity becomes a new lot owned by `to`, created through a
    /// single-division split so the balance change is carried by exactly one
    /// composition edge. Returns the lot now held by `to`.
    pub fn transfer<T: Transaction>(
        &self,
        tx: &mut T,
        lot_id: LotId,
        to: &ParticipantId,
        quantity: Grams,
        actor: &ActorContext,
    ) -> LedgerResult<LotId> {
        Self::authorize(tx, actor, Action::Transfer)?;
        if quantity.is_zero() {
            return Err(LedgerError::InvalidQuantity(format!(
                "transfer from {lot_id} must be positive"
            )));
        }
        let mut lot = CompositionGraph::lot(tx, lot_id)?;
        Self::require_custodian(&lot.custodian, actor, lot_id)?;
        Self::require_recipient(tx, to)?;
        if *to == lot.custodian {
            return Err(LedgerError::InvalidInput(format!(
                "{to} already holds {lot_id}"
            )));
        }

        let available = StockLedger::available(tx, lot_id)?;
        if lot.state.is_terminal() || quantity > available {
            return Err(LedgerError::InsufficientStock {
                lot: lot_id,
                requested: quantity,
                available,
            });
        }

        if quantity < available {
            let children = self.graph.divide(
                tx,
                lot_id,
                &[Division::to(quantity, to.clone())],
                actor,
                Some(to),
            )?;
            let child = children
                .first()
                .map(|c| c.id)
                .ok_or_else(|| LedgerError::InvalidQuantity("transfer produced no lot".into()))?;
            info!(lot = %lot_id, child = %child, to = %to, %quantity, "partial transfer");
            return Ok(child);
        }

        self.graph.chain().append(
            tx,
            lot_id.into(),
            EventKind::Transferred,
            &actor.participant_id,
            GramsDelta::ZERO,
            &TransferredPayload {
                from: lot.custodian.clone(),
                to: to.clone(),
                quantity,
            },
        )?;
        lot.state = lot
            .state
            .next(LifecycleEvent::Transferred {
                remaining: available,
            })
            .ok_or(LedgerError::InsufficientStock {
                lot: lot_id,
                requested: quantity,
                available,
            })?;
        lot.custodian = to.clone();
        tx.put(&lot_key(&lot_id), &lot)?;

        info!(lot = %lot_id, to = %to, %quantity, "transferred custody");
        Ok(lot_id)
    }

    /// Hand a sealed package to `to`. Packages change custody only whole.
    pub fn transfer_package<T: Transaction>(
        &self,
        tx: &mut T,
        label: &str,
        to: &ParticipantId,
        actor: &ActorContext,
    ) -> LedgerResult<PackageRecord> {
        Self::authorize(tx, actor, Action::TransferPackage)?;
        let mut package = CompositionGraph::package_by_label(tx, label)?;
        Self::require_custodian(&package.custodian, actor, package.id)?;
        Self::require_recipient(tx, to)?;
        if *to == package.custodian {
            return Err(LedgerError::InvalidInput(format!("{to} already holds {label}")));
        }

        self.graph.chain().append(
            tx,
            package.id.into(),
            EventKind::PackageTransferred,
            &actor.participant_id,
            GramsDelta::ZERO,
            &PackageTransferredPayload {
                from: package.custodian.clone(),
                to: to.clone(),
            },
        )?;
        package.custodian = to.clone();
        tx.put(&package_key(&package.id), &package)?;

        info!(package = %package.id, label, to = %to, "transferred package");
        Ok(package)
    }
}
