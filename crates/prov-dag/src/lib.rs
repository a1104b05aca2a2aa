//! Composition DAG for the provenance ledger.
//!
//! Every unit of material that moves from one lot into another lot or into a
//! package is recorded as a [`CompositionEdge`]. The set of all edges forms a
//! DAG whose interior nodes are lots and whose sinks are packages.
//!
//! Traversals are written against the [`EdgeSource`] trait so they run
//! equally over the in-memory [`CompositionDag`] arena and over edges read
//! lazily from a store transaction:
//!
//! - [`reverse_closure`] -- walk backward from a package to every origin lot,
//!   rejecting any revisit of a node on the current path
//! - [`forward_impact`] -- walk forward from a lot to everything made from it

pub mod dag;
pub mod edge;
pub mod error;
pub mod impact;
pub mod traverse;

pub use dag::CompositionDag;
pub use edge::{CompositionEdge, EdgeSource};
pub use error::{DagError, DagResult};
pub use impact::{forward_impact, ImpactReport, Reached};
pub use traverse::{reverse_closure, Closure};
