//! Notebook
//!
//! A [`Notebook`] is the ordered list of cells a user sees, wired to a
//! [`Runtime`]. It owns id allocation and the naming scheme: a code or setup
//! cell with id `n` is bound as `c{n}`, so edits and reorders never rename
//! anything.
//!
//! Every mutation that changes what a cell computes goes through
//! [`Runtime::define`], which schedules the cell and its dependents. Nothing
//! is evaluated until [`Notebook::settle`] is awaited.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::document::CellDraft;
use crate::error::{EngineError, Result};
use crate::extract::{binding_name, extract, mentions};
use crate::graph::{BindingState, CellId, Computation, Definition};
use crate::reactive::{RecordingSink, Runtime};

/// What a cell holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    /// An expression or block evaluated by the interpreter.
    Code,
    /// Source evaluating to a script URL handed to the loader.
    Setup,
    /// Markdown. Never evaluated.
    Text,
}

impl CellKind {
    /// Whether cells of this kind own a binding.
    pub fn is_executable(self) -> bool {
        !matches!(self, CellKind::Text)
    }

    fn computation(self, source: &str) -> Option<Computation> {
        match self {
            CellKind::Code => Some(Computation::expression(source)),
            CellKind::Setup => Some(Computation::script(source)),
            CellKind::Text => None,
        }
    }
}

/// One notebook cell.
#[derive(Debug, Clone)]
pub struct Cell {
    id: CellId,
    kind: CellKind,
    source: String,
    output: Option<Arc<RecordingSink>>,
}

impl Cell {
    fn new(id: CellId, kind: CellKind, source: String) -> Self {
        Self {
            id,
            kind,
            source,
            output: None,
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The binding name, for code and setup cells.
    pub fn name(&self) -> Option<String> {
        self.kind.is_executable().then(|| binding_name(self.id))
    }

    /// The sink recording this cell's reported transitions.
    pub fn output(&self) -> Option<&Arc<RecordingSink>> {
        self.output.as_ref()
    }
}

/// An ordered list of cells backed by a reactive runtime.
#[derive(Debug)]
pub struct Notebook {
    cells: Vec<Cell>,
    runtime: Runtime,
    next_id: u64,
}

impl Notebook {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_runtime(Runtime::new(config))
    }

    /// Build a notebook around a preconfigured runtime (custom evaluator
    /// or script loader).
    pub fn with_runtime(runtime: Runtime) -> Self {
        Self {
            cells: Vec::new(),
            runtime,
            next_id: 0,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.iter().find(|cell| cell.id == id)
    }

    /// Position of `id` in display order.
    pub fn position(&self, id: CellId) -> Option<usize> {
        self.cells.iter().position(|cell| cell.id == id)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The binding state of a code or setup cell.
    pub fn state(&self, id: CellId) -> Option<&BindingState> {
        self.runtime.state(id)
    }

    /// The recording sink of a code or setup cell.
    pub fn output(&self, id: CellId) -> Option<Arc<RecordingSink>> {
        self.cell(id).and_then(|cell| cell.output.clone())
    }

    /// Append a cell and define it.
    pub fn push(&mut self, kind: CellKind, source: impl Into<String>) -> Result<CellId> {
        let index = self.cells.len();
        self.insert_at(index, kind, source.into())
    }

    /// Insert a cell directly below `anchor`.
    pub fn insert_after(
        &mut self,
        anchor: CellId,
        kind: CellKind,
        source: impl Into<String>,
    ) -> Result<CellId> {
        let index = self.index_of(anchor)? + 1;
        self.insert_at(index, kind, source.into())
    }

    /// Copy `id` into a new cell below it. The copy gets its own name.
    pub fn duplicate(&mut self, id: CellId) -> Result<CellId> {
        let index = self.index_of(id)?;
        let original = &self.cells[index];
        let (kind, source) = (original.kind, original.source.clone());
        self.insert_at(index + 1, kind, source)
    }

    /// Replace a cell's source. Code and setup cells are re-defined.
    pub fn edit(&mut self, id: CellId, source: impl Into<String>) -> Result<()> {
        let index = self.index_of(id)?;
        self.cells[index].source = source.into();
        if self.cells[index].kind.is_executable() {
            self.define(id)?;
        }
        Ok(())
    }

    /// Remove a cell. Its dependents keep their last state.
    pub fn delete(&mut self, id: CellId) -> Result<Cell> {
        let index = self.index_of(id)?;
        let cell = self.cells.remove(index);
        if cell.kind.is_executable() {
            self.runtime.remove(id)?;
        }
        tracing::debug!(cell = %id, "delete");
        Ok(cell)
    }

    /// Move a cell to `index` in display order.
    pub fn move_to(&mut self, id: CellId, index: usize) -> Result<()> {
        let len = self.cells.len();
        if index >= len {
            return Err(EngineError::OutOfRange { index, len });
        }
        let from = self.index_of(id)?;
        let cell = self.cells.remove(from);
        self.cells.insert(index, cell);
        Ok(())
    }

    /// Change what a cell holds.
    pub fn set_kind(&mut self, id: CellId, kind: CellKind) -> Result<()> {
        let index = self.index_of(id)?;
        let previous = self.cells[index].kind;
        if previous == kind {
            return Ok(());
        }
        self.cells[index].kind = kind;

        match (previous.is_executable(), kind.is_executable()) {
            (true, false) => {
                self.cells[index].output = None;
                self.runtime.remove(id)
            }
            (false, true) => {
                self.define(id)?;
                self.refresh_readers(id)
            }
            _ => self.define(id),
        }
    }

    /// Define every code and setup cell, top to bottom.
    pub fn run_all(&mut self) -> Result<()> {
        let ids: Vec<CellId> = self
            .cells
            .iter()
            .filter(|cell| cell.kind.is_executable())
            .map(|cell| cell.id)
            .collect();
        tracing::debug!(cells = ids.len(), "run all");
        for id in ids {
            self.define(id)?;
        }
        Ok(())
    }

    /// Evaluate until nothing is in flight.
    pub async fn settle(&mut self) {
        self.runtime.run_until_idle().await;
    }

    /// Append imported cells without defining them. Call
    /// [`run_all`](Self::run_all) to evaluate.
    pub fn load(&mut self, drafts: impl IntoIterator<Item = CellDraft>) -> Vec<CellId> {
        drafts
            .into_iter()
            .map(|draft| {
                let id = self.allocate();
                self.cells.push(Cell::new(id, draft.kind, draft.source));
                id
            })
            .collect()
    }

    /// The cells as document drafts, in display order.
    pub fn drafts(&self) -> Vec<CellDraft> {
        self.cells
            .iter()
            .map(|cell| CellDraft::new(cell.kind, cell.source.clone()))
            .collect()
    }

    // ---- Internals ----

    fn allocate(&mut self) -> CellId {
        let id = CellId::from(self.next_id);
        self.next_id += 1;
        id
    }

    fn index_of(&self, id: CellId) -> Result<usize> {
        self.position(id).ok_or(EngineError::UnknownCell(id))
    }

    fn insert_at(&mut self, index: usize, kind: CellKind, source: String) -> Result<CellId> {
        let id = self.allocate();
        self.cells.insert(index, Cell::new(id, kind, source));
        if kind.is_executable() {
            self.define(id)?;
            self.refresh_readers(id)?;
        }
        Ok(id)
    }

    /// Extract `id`'s inputs against every other bound cell and hand the
    /// definition to the runtime.
    ///
    /// A cell that mentions its own name also lists itself as an input, so
    /// the runtime rejects it as circular.
    fn define(&mut self, id: CellId) -> Result<()> {
        let index = self.index_of(id)?;
        let names: Vec<String> = self
            .cells
            .iter()
            .filter(|cell| cell.id != id)
            .filter_map(Cell::name)
            .collect();

        let cell = &mut self.cells[index];
        let Some(computation) = cell.kind.computation(&cell.source) else {
            return Ok(());
        };
        let name = binding_name(id);
        let mut inputs = extract(&cell.source, &names, &name);
        if mentions(&cell.source, &name) {
            inputs.push(name.clone());
        }
        let sink = Arc::clone(
            cell.output
                .get_or_insert_with(|| Arc::new(RecordingSink::new())),
        );

        self.runtime
            .define(id, Definition::new(name, inputs, computation), sink)
    }

    /// Re-define cells that mention `id`'s name but were extracted before
    /// it existed.
    fn refresh_readers(&mut self, id: CellId) -> Result<()> {
        let name = binding_name(id);
        let stale: Vec<CellId> = self
            .cells
            .iter()
            .filter(|cell| cell.id != id && cell.kind.is_executable())
            .filter(|cell| mentions(&cell.source, &name))
            .filter(|cell| {
                self.runtime
                    .binding(cell.id)
                    .is_some_and(|binding| !binding.inputs().iter().any(|input| *input == name))
            })
            .map(|cell| cell.id)
            .collect();

        for reader in stale {
            tracing::debug!(cell = %reader, name = %name, "reference now resolves");
            self.define(reader)?;
        }
        Ok(())
    }
}

impl Default for Notebook {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CellError;
    use crate::reactive::SinkEvent;
    use crate::value::Value;

    fn value(notebook: &Notebook, id: CellId) -> Option<Value> {
        notebook.state(id).and_then(BindingState::value).cloned()
    }

    #[tokio::test]
    async fn push_defines_and_chains() {
        let mut nb = Notebook::default();
        let a = nb.push(CellKind::Code, "4 + 5").unwrap();
        let b = nb.push(CellKind::Code, "c0 * 2").unwrap();
        nb.settle().await;

        assert_eq!(value(&nb, a), Some(Value::Number(9.0)));
        assert_eq!(value(&nb, b), Some(Value::Number(18.0)));
        assert_eq!(nb.cell(b).and_then(Cell::name).as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn edit_propagates() {
        let mut nb = Notebook::default();
        let a = nb.push(CellKind::Code, "4 + 5").unwrap();
        let b = nb.push(CellKind::Code, "c0 * 2").unwrap();
        nb.settle().await;

        nb.edit(a, "10 + 5").unwrap();
        nb.settle().await;
        assert_eq!(value(&nb, b), Some(Value::Number(30.0)));
    }

    #[tokio::test]
    async fn insert_after_places_below_anchor() {
        let mut nb = Notebook::default();
        let a = nb.push(CellKind::Code, "1").unwrap();
        let b = nb.push(CellKind::Code, "2").unwrap();
        let c = nb.insert_after(a, CellKind::Text, "# notes").unwrap();

        let order: Vec<CellId> = nb.cells().iter().map(Cell::id).collect();
        assert_eq!(order, vec![a, c, b]);
        assert!(nb.state(c).is_none());
        assert!(nb.output(c).is_none());
    }

    #[tokio::test]
    async fn duplicate_gets_its_own_name() {
        let mut nb = Notebook::default();
        let a = nb.push(CellKind::Code, "4 + 5").unwrap();
        let b = nb.push(CellKind::Code, "c0 * 2").unwrap();
        let copy = nb.duplicate(b).unwrap();
        nb.settle().await;

        assert_eq!(nb.position(copy), Some(2));
        assert_eq!(nb.cell(copy).and_then(Cell::name).as_deref(), Some("c2"));
        assert_eq!(value(&nb, copy), Some(Value::Number(18.0)));
        assert_eq!(nb.runtime().registry().dependents(a).len(), 2);
    }

    #[tokio::test]
    async fn delete_leaves_dependents_alone() {
        let mut nb = Notebook::default();
        let a = nb.push(CellKind::Code, "4 + 5").unwrap();
        let b = nb.push(CellKind::Code, "c0 * 2").unwrap();
        nb.settle().await;
        let before = nb.output(b).unwrap().settle_count();

        let removed = nb.delete(a).unwrap();
        assert_eq!(removed.source(), "4 + 5");
        nb.settle().await;

        assert_eq!(value(&nb, b), Some(Value::Number(18.0)));
        assert_eq!(nb.output(b).unwrap().settle_count(), before);
        assert!(matches!(nb.delete(a), Err(EngineError::UnknownCell(_))));
    }

    #[tokio::test]
    async fn move_to_does_not_redefine() {
        let mut nb = Notebook::default();
        let a = nb.push(CellKind::Code, "1").unwrap();
        let b = nb.push(CellKind::Code, "c0 + 1").unwrap();
        nb.settle().await;
        let generation = nb.runtime().generation(b);

        nb.move_to(b, 0).unwrap();
        assert_eq!(nb.position(b), Some(0));
        assert_eq!(nb.position(a), Some(1));
        assert_eq!(nb.runtime().generation(b), generation);
        assert!(nb.runtime().is_idle());

        assert_eq!(
            nb.move_to(a, 2),
            Err(EngineError::OutOfRange { index: 2, len: 2 })
        );
    }

    #[tokio::test]
    async fn text_cells_have_no_binding() {
        let mut nb = Notebook::default();
        let a = nb.push(CellKind::Code, "4 + 5").unwrap();
        nb.settle().await;

        nb.set_kind(a, CellKind::Text).unwrap();
        assert!(nb.state(a).is_none());
        assert!(nb.output(a).is_none());

        nb.set_kind(a, CellKind::Code).unwrap();
        nb.settle().await;
        assert_eq!(value(&nb, a), Some(Value::Number(9.0)));
    }

    #[tokio::test]
    async fn self_reference_is_circular_until_edited() {
        let mut nb = Notebook::default();
        let a = nb.push(CellKind::Code, "c0 + 1").unwrap();
        nb.settle().await;
        assert_eq!(
            nb.state(a).and_then(BindingState::error),
            Some(&CellError::CircularDependency { name: "c0".into() })
        );
        assert!(nb.runtime().is_idle());

        nb.edit(a, "1").unwrap();
        nb.settle().await;
        assert_eq!(value(&nb, a), Some(Value::Number(1.0)));
    }

    #[tokio::test]
    async fn forward_reference_resolves_once_target_exists() {
        let mut nb = Notebook::default();
        let reader = nb.push(CellKind::Code, "c1 + 1").unwrap();
        nb.settle().await;
        assert!(matches!(
            nb.state(reader),
            Some(BindingState::Rejected(_))
        ));

        nb.push(CellKind::Code, "41").unwrap();
        nb.settle().await;
        assert_eq!(value(&nb, reader), Some(Value::Number(42.0)));
    }

    #[tokio::test]
    async fn run_all_defines_loaded_cells() {
        let mut nb = Notebook::default();
        let ids = nb.load(vec![
            CellDraft::new(CellKind::Text, "# Title"),
            CellDraft::new(CellKind::Code, "c2 * 3"),
            CellDraft::new(CellKind::Code, "7"),
        ]);
        assert!(nb.state(ids[1]).is_none());

        nb.run_all().unwrap();
        nb.settle().await;
        assert_eq!(value(&nb, ids[1]), Some(Value::Number(21.0)));
        assert_eq!(nb.drafts().len(), 3);
    }

    #[tokio::test]
    async fn output_records_transitions() {
        let mut nb = Notebook::default();
        let a = nb.push(CellKind::Code, "fail(\"nope\")").unwrap();
        nb.settle().await;

        let output = nb.output(a).unwrap();
        assert_eq!(output.events().first(), Some(&SinkEvent::Pending));
        assert!(matches!(output.latest(), Some(SinkEvent::Rejected(_))));
    }
}
