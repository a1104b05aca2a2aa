//! Foundation types for the provenance ledger.
//!
//! Every other crate in the workspace depends on `prov-types`. Nothing here
//! touches storage; these are plain values with validation at construction.
//!
//! # Key Types
//!
//! - [`LotId`] / [`PackageId`] -- UUID v7 identifiers for tracked entities
//! - [`EntityId`] -- either a lot or a package; the unit of event history
//! - [`Grams`] / [`GramsDelta`] -- fixed-point quantities (milligram resolution)
//! - [`Role`] / [`Action`] -- closed role set with its permission table
//! - [`ActorContext`] -- identity and role supplied by the auth collaborator
//! - [`TemporalAnchor`] / [`HybridClock`] -- monotonic event timestamps
//! - [`CommodityType`] -- static reference data for a harvested good

pub mod actor;
pub mod commodity;
pub mod error;
pub mod id;
pub mod quantity;
pub mod temporal;

pub use actor::{Action, ActorContext, Role};
pub use commodity::CommodityType;
pub use error::TypeError;
pub use id::{CommodityId, EntityId, LotId, PackageId, ParticipantId};
pub use quantity::{Grams, GramsDelta};
pub use temporal::{HybridClock, TemporalAnchor};
