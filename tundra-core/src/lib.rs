//! Tundra Core
//!
//! This crate provides the reactive evaluation engine behind the Tundra
//! notebook. It implements:
//!
//! - Dependency extraction from cell source
//! - A registry of named bindings and the dataflow graph between them
//! - An asynchronous expression evaluator
//! - A propagation scheduler that re-runs dependents, guards against
//!   cycles and discards superseded results
//! - The notebook cell model and its markdown document format
//!
//! # Architecture
//!
//! - `extract`: which other cells a source mentions
//! - `graph`: bindings, their states and the registry that indexes them
//! - `eval`: the `Evaluator` seam and the built-in interpreter
//! - `reactive`: the runtime, output sinks and script loaders
//! - `notebook`: ordered cells, id allocation and naming
//! - `document`: markdown import and export
//!
//! # Example
//!
//! ```rust,no_run
//! use tundra_core::{CellKind, EngineConfig, Notebook};
//!
//! # async fn demo() -> tundra_core::Result<()> {
//! let mut notebook = Notebook::new(EngineConfig::default());
//! let a = notebook.push(CellKind::Code, "4 + 5")?;
//! let b = notebook.push(CellKind::Code, "c0 * 2")?;
//! notebook.settle().await;
//! // c1 is now Fulfilled(18)
//!
//! notebook.edit(a, "10 + 5")?;
//! notebook.settle().await;
//! // c1 re-ran and is now Fulfilled(30)
//! # let _ = b;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod eval;
pub mod extract;
pub mod graph;
pub mod notebook;
pub mod reactive;
pub mod value;

pub use config::EngineConfig;
pub use document::CellDraft;
pub use error::{CellError, ConfigError, DocumentError, EngineError, Result};
pub use eval::{Evaluator, Interpreter, Scope};
pub use graph::{BindingState, CellId, Computation, Definition};
pub use notebook::{Cell, CellKind, Notebook};
pub use reactive::{OutputSink, RecordingSink, Runtime, ScriptLoader, SinkEvent};
pub use value::Value;
