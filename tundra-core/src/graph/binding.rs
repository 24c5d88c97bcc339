//! Bindings
//!
//! A [`Binding`] is the engine-side record of one code or setup cell: the
//! name other cells read it by, the names it reads, what to evaluate, and
//! where evaluation currently stands.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CellError;
use crate::extract::Inputs;
use crate::reactive::OutputSink;
use crate::value::Value;

/// Unique identifier for a cell.
///
/// Ids are allocated by whoever owns the cells (normally a
/// [`Notebook`](crate::notebook::Notebook)) and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(u64);

impl CellId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for CellId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a binding's source turns into its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputationKind {
    /// The source is evaluated and its value is the result.
    Expression,
    /// The source is evaluated to a URL and the script loader's result is
    /// the value.
    Script,
}

/// The thing to evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Computation {
    pub kind: ComputationKind,
    pub source: Arc<str>,
}

impl Computation {
    pub fn expression(source: impl Into<Arc<str>>) -> Self {
        Self {
            kind: ComputationKind::Expression,
            source: source.into(),
        }
    }

    pub fn script(source: impl Into<Arc<str>>) -> Self {
        Self {
            kind: ComputationKind::Script,
            source: source.into(),
        }
    }
}

/// Everything `define` needs to know about a cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: String,
    pub inputs: Inputs,
    pub computation: Computation,
}

impl Definition {
    pub fn new(name: impl Into<String>, inputs: Inputs, computation: Computation) -> Self {
        Self {
            name: name.into(),
            inputs,
            computation,
        }
    }
}

/// Where a binding's evaluation stands.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingState {
    /// Never defined.
    Unresolved,
    /// Waiting for inputs or for its evaluation to settle.
    Pending,
    Fulfilled(Value),
    Rejected(CellError),
}

impl BindingState {
    pub fn is_pending(&self) -> bool {
        matches!(self, BindingState::Pending)
    }

    /// Fulfilled or rejected.
    pub fn is_settled(&self) -> bool {
        matches!(self, BindingState::Fulfilled(_) | BindingState::Rejected(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            BindingState::Fulfilled(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&CellError> {
        match self {
            BindingState::Rejected(error) => Some(error),
            _ => None,
        }
    }

    /// Short lowercase name of the state.
    pub fn label(&self) -> &'static str {
        match self {
            BindingState::Unresolved => "unresolved",
            BindingState::Pending => "pending",
            BindingState::Fulfilled(_) => "fulfilled",
            BindingState::Rejected(_) => "rejected",
        }
    }
}

impl fmt::Display for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingState::Fulfilled(value) => write!(f, "{value}"),
            BindingState::Rejected(error) => write!(f, "{error}"),
            other => f.write_str(other.label()),
        }
    }
}

/// A cell's binding in the registry.
pub struct Binding {
    cell: CellId,
    name: String,
    inputs: Inputs,
    computation: Computation,
    state: BindingState,

    /// Bumped on every transition to `Pending`. An evaluation started at an
    /// older generation is stale.
    generation: u64,

    /// Generation of the evaluation currently in flight, if any.
    running: Option<u64>,

    /// Value of the most recent fulfilment, kept across later rejections.
    last_fulfilled: Option<Value>,

    sink: Arc<dyn OutputSink>,
}

impl Binding {
    pub(crate) fn new(cell: CellId, definition: Definition, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            cell,
            name: definition.name,
            inputs: definition.inputs,
            computation: definition.computation,
            state: BindingState::Unresolved,
            generation: 0,
            running: None,
            last_fulfilled: None,
            sink,
        }
    }

    /// Continue counting from `generation`, the last one a removed
    /// binding for the same cell reached.
    pub(crate) fn resumed_from(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn cell(&self) -> CellId {
        self.cell
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn computation(&self) -> &Computation {
        &self.computation
    }

    pub fn state(&self) -> &BindingState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn sink(&self) -> &Arc<dyn OutputSink> {
        &self.sink
    }

    /// Whether an evaluation of the current generation is in flight.
    pub fn is_running(&self) -> bool {
        self.running == Some(self.generation)
    }

    /// The value dependents should read, if there is one.
    ///
    /// A rejected binding still offers its last fulfilled value, unless it
    /// was rejected for sitting on a cycle.
    pub fn usable_value(&self) -> Option<&Value> {
        match &self.state {
            BindingState::Fulfilled(value) => Some(value),
            BindingState::Rejected(error) if !error.is_circular() => self.last_fulfilled.as_ref(),
            _ => None,
        }
    }

    /// Swap in a new definition. The caller re-marks the binding pending.
    pub(crate) fn replace(&mut self, definition: Definition, sink: Arc<dyn OutputSink>) {
        self.name = definition.name;
        self.inputs = definition.inputs;
        self.computation = definition.computation;
        self.sink = sink;
    }

    /// Start a new generation in the `Pending` state.
    ///
    /// Returns whether the state changed, i.e. whether the sink should hear
    /// about it.
    pub(crate) fn mark_pending(&mut self) -> bool {
        self.generation += 1;
        let changed = !self.state.is_pending();
        self.state = BindingState::Pending;
        changed
    }

    pub(crate) fn mark_running(&mut self) {
        self.running = Some(self.generation);
    }

    /// Record the outcome of the current generation.
    pub(crate) fn settle(&mut self, result: Result<Value, CellError>) {
        self.running = None;
        self.state = match result {
            Ok(value) => {
                self.last_fulfilled = Some(value.clone());
                BindingState::Fulfilled(value)
            }
            Err(error) => BindingState::Rejected(error),
        };
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("cell", &self.cell)
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("computation", &self.computation)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::NullSink;
    use smallvec::smallvec;

    fn binding(source: &str) -> Binding {
        Binding::new(
            CellId::from(1),
            Definition::new("c1", smallvec!["c0".to_string()], Computation::expression(source)),
            Arc::new(NullSink),
        )
    }

    #[test]
    fn cell_ids_display_with_hash() {
        assert_eq!(CellId::from(7).to_string(), "#7");
        assert_eq!(CellId::from(7).raw(), 7);
    }

    #[test]
    fn new_binding_is_unresolved() {
        let binding = binding("c0 * 2");
        assert_eq!(binding.state(), &BindingState::Unresolved);
        assert_eq!(binding.generation(), 0);
        assert_eq!(binding.inputs(), ["c0"]);
    }

    #[test]
    fn pending_transitions_bump_generation() {
        let mut binding = binding("c0 * 2");
        assert!(binding.mark_pending());
        assert!(!binding.mark_pending());
        assert_eq!(binding.generation(), 2);
    }

    #[test]
    fn running_is_per_generation() {
        let mut binding = binding("c0 * 2");
        binding.mark_pending();
        binding.mark_running();
        assert!(binding.is_running());
        binding.mark_pending();
        assert!(!binding.is_running());
    }

    #[test]
    fn rejection_keeps_last_value_usable() {
        let mut binding = binding("c0 * 2");
        binding.mark_pending();
        binding.settle(Ok(Value::Number(18.0)));
        binding.mark_pending();
        assert_eq!(binding.usable_value(), None);

        binding.settle(Err(CellError::Thrown("boom".into())));
        assert_eq!(binding.usable_value(), Some(&Value::Number(18.0)));
    }

    #[test]
    fn circular_rejection_is_never_usable() {
        let mut binding = binding("c0 * 2");
        binding.mark_pending();
        binding.settle(Ok(Value::Number(1.0)));
        binding.mark_pending();
        binding.settle(Err(CellError::CircularDependency { name: "c1".into() }));
        assert_eq!(binding.usable_value(), None);
    }
}
