//! Dependency Graph
//!
//! This module holds the dataflow graph of a notebook: one [`Binding`] per
//! code or setup cell, owned by the [`Registry`].
//!
//! # Overview
//!
//! The graph is implicit in the bindings' inputs:
//!
//! - Nodes are bindings, keyed by [`CellId`] and reachable by name
//! - Edges are derived: if B's inputs contain A's name, there is an edge
//!   from A to B
//!
//! When a binding is redefined, the scheduler in [`crate::reactive`] asks
//! the registry for the forward closure of the binding and for the members
//! of that closure that sit on a cycle, then re-runs the rest.
//!
//! # Design Decisions
//!
//! 1. The registry is a plain owned structure with `define`, `remove` and
//!    `resolve` as its mutation and query surface. There is no global state
//!    and no interior mutability.
//!
//! 2. Bindings are indexed by cell for O(1) lookups and by name so that a
//!    dependent's inputs can be resolved without scanning.
//!
//! 3. Unresolved names are not errors. A reader of a missing name simply
//!    has no edge until something defines that name.

mod binding;
mod registry;

pub use binding::{Binding, BindingState, CellId, Computation, ComputationKind, Definition};
pub use registry::Registry;
