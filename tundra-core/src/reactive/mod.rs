//! Reactive Propagation
//!
//! This module drives the dataflow graph: when a cell is defined, everything
//! downstream of it is re-evaluated, and every settled result is pushed to
//! the cell's output sink.
//!
//! # Concepts
//!
//! ## Runtime
//!
//! The [`Runtime`] is the propagation scheduler. It owns the registry and
//! all in-flight evaluations. Callers define cells and then drive the
//! runtime with `settle_next` or `run_until_idle`.
//!
//! ## Output Sinks
//!
//! An [`OutputSink`] receives one binding's transitions: pending, then a
//! single fulfilled or rejected report per generation. [`RecordingSink`]
//! keeps them for polling; [`FnSink`] forwards them to a callback.
//!
//! ## Script Loaders
//!
//! Setup cells evaluate to a URL that a [`ScriptLoader`] turns into a
//! value. [`NoLoader`] rejects everything; [`StaticLoader`] serves values
//! registered up front.
//!
//! # Generations
//!
//! Every binding carries a generation counter, bumped whenever it becomes
//! pending. An evaluation remembers the generation it started at, and its
//! result is applied only if the counter has not moved. This is the only
//! form of cancellation: superseded work finishes and is thrown away.

mod loader;
mod runtime;
mod sink;

pub use loader::{NoLoader, ScriptLoader, StaticLoader};
pub use runtime::{Runtime, SettleOutcome};
pub use sink::{FnSink, NullSink, OutputSink, RecordingSink, SinkEvent};
