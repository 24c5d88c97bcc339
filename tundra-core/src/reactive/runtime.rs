//! Reactive Runtime
//!
//! The runtime is the propagation scheduler. It owns the [`Registry`], the
//! evaluator and every in-flight evaluation, and it is the only thing that
//! changes a binding's state.
//!
//! # How It Works
//!
//! 1. `define` records the new definition and marks the binding pending,
//!    bumping its generation.
//!
//! 2. The cascade walks the forward closure of the binding breadth first.
//!    Every dependent is marked pending too, so nothing downstream keeps a
//!    value derived from the old definition.
//!
//! 3. Members of the closure that sit on a cycle are rejected with a
//!    circular-definition error and never evaluated.
//!
//! 4. Every other member whose inputs all have a usable value is started.
//!    The rest wait: they are started when their last missing input settles.
//!
//! 5. `settle_next` drives the in-flight evaluations. A result whose
//!    generation no longer matches its binding is dropped without reaching
//!    the sink. Otherwise it is stored and reported, and the binding's
//!    dependents get a chance to start.
//!
//! # Concurrency
//!
//! Evaluations are owned futures in a [`FuturesUnordered`] that only the
//! runtime polls. Nothing is spawned and nothing is locked: every state
//! change happens inside a `&mut self` method, between polls, so no
//! evaluation can observe a half-applied update. There is no cancellation.
//! A superseded evaluation runs to completion and its result is discarded.
//! An evaluation that never completes leaves its binding pending.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};

use super::loader::{NoLoader, ScriptLoader};
use super::sink::OutputSink;
use crate::config::EngineConfig;
use crate::error::{CellError, EngineError, Result};
use crate::eval::{Evaluator, Interpreter, Scope};
use crate::graph::{Binding, BindingState, CellId, Computation, ComputationKind, Definition, Registry};
use crate::value::Value;

/// What [`Runtime::settle_next`] did with the evaluation it drove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The result was stored and reported.
    Applied(CellId),
    /// The binding was redefined while the evaluation ran.
    Stale(CellId),
    /// The binding was removed while the evaluation ran.
    Removed(CellId),
}

impl SettleOutcome {
    pub fn cell(&self) -> CellId {
        match *self {
            SettleOutcome::Applied(cell)
            | SettleOutcome::Stale(cell)
            | SettleOutcome::Removed(cell) => cell,
        }
    }
}

/// A finished evaluation, tagged with the generation it was started for.
struct Settlement {
    cell: CellId,
    generation: u64,
    result: std::result::Result<Value, CellError>,
}

/// The propagation scheduler.
pub struct Runtime {
    config: EngineConfig,
    registry: Registry,
    evaluator: Arc<dyn Evaluator>,
    loader: Arc<dyn ScriptLoader>,
    in_flight: FuturesUnordered<BoxFuture<'static, Settlement>>,
}

impl Runtime {
    /// A runtime using the built-in interpreter and no script loader.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_loader(config, Arc::new(NoLoader))
    }

    /// A runtime using the built-in interpreter and the given loader.
    pub fn with_loader(config: EngineConfig, loader: Arc<dyn ScriptLoader>) -> Self {
        let evaluator = Arc::new(Interpreter::new(&config));
        Self::with_evaluator(config, evaluator, loader)
    }

    pub fn with_evaluator(
        config: EngineConfig,
        evaluator: Arc<dyn Evaluator>,
        loader: Arc<dyn ScriptLoader>,
    ) -> Self {
        Self {
            config,
            registry: Registry::new(),
            evaluator,
            loader,
            in_flight: FuturesUnordered::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn binding(&self, cell: CellId) -> Option<&Binding> {
        self.registry.get(cell)
    }

    pub fn state(&self, cell: CellId) -> Option<&BindingState> {
        self.registry.get(cell).map(Binding::state)
    }

    pub fn resolve(&self, name: &str) -> Option<&BindingState> {
        self.registry.resolve(name)
    }

    pub fn generation(&self, cell: CellId) -> Option<u64> {
        self.registry.get(cell).map(Binding::generation)
    }

    /// Number of evaluations not yet driven to completion, stale ones
    /// included.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Define or redefine `cell` and cascade to its dependents.
    ///
    /// The sink receives this binding's transitions from now on. Nothing is
    /// evaluated until the runtime is driven with [`settle_next`] or
    /// [`run_until_idle`].
    ///
    /// [`settle_next`]: Runtime::settle_next
    /// [`run_until_idle`]: Runtime::run_until_idle
    pub fn define(
        &mut self,
        cell: CellId,
        definition: Definition,
        sink: Arc<dyn OutputSink>,
    ) -> Result<()> {
        tracing::debug!(
            cell = %cell,
            name = %definition.name,
            inputs = ?definition.inputs,
            "define"
        );
        if self.registry.define(cell, definition, Arc::clone(&sink))? {
            sink.on_pending();
        }
        self.cascade(cell);
        Ok(())
    }

    /// Delete `cell`'s binding.
    ///
    /// Dependents are left as they are; their next cascade finds the name
    /// unresolved and they wait.
    pub fn remove(&mut self, cell: CellId) -> Result<()> {
        let binding = self
            .registry
            .remove(cell)
            .ok_or(EngineError::UnknownCell(cell))?;
        tracing::debug!(cell = %cell, name = %binding.name(), "remove");
        Ok(())
    }

    /// Drive one in-flight evaluation to completion and apply it.
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn settle_next(&mut self) -> Option<SettleOutcome> {
        let Settlement {
            cell,
            generation,
            result,
        } = self.in_flight.next().await?;
        Some(self.apply(cell, generation, result))
    }

    /// Drive evaluations, including those started by cascades, until none
    /// are left.
    pub async fn run_until_idle(&mut self) {
        while self.settle_next().await.is_some() {}
    }

    fn cascade(&mut self, root: CellId) {
        let order = self.registry.closure(root);
        let cyclic: HashSet<CellId> = self.registry.cyclic_members(&order);
        tracing::debug!(
            cell = %root,
            affected = order.len(),
            cyclic = cyclic.len(),
            "cascade"
        );

        for &cell in order.iter().skip(1) {
            self.invalidate(cell);
        }
        for &cell in order.iter().filter(|cell| cyclic.contains(*cell)) {
            self.reject_circular(cell);
        }
        for &cell in order.iter().filter(|cell| !cyclic.contains(*cell)) {
            self.try_start(cell);
        }
    }

    fn invalidate(&mut self, cell: CellId) {
        if let Some(binding) = self.registry.get_mut(cell) {
            if binding.mark_pending() {
                Arc::clone(binding.sink()).on_pending();
            }
        }
    }

    fn reject_circular(&mut self, cell: CellId) {
        let Some(binding) = self.registry.get_mut(cell) else {
            return;
        };
        tracing::warn!(cell = %cell, name = %binding.name(), "circular definition");
        let error = CellError::CircularDependency {
            name: binding.name().to_string(),
        };
        binding.settle(Err(error.clone()));
        Arc::clone(binding.sink()).on_rejected(&error);
    }

    /// Start evaluating `cell` if it is pending, idle and all its inputs
    /// have a usable value.
    fn try_start(&mut self, cell: CellId) -> bool {
        let Some(binding) = self.registry.get(cell) else {
            return false;
        };
        if !binding.state().is_pending() || binding.is_running() {
            return false;
        }

        let mut scope = Scope::new();
        for name in binding.inputs() {
            match self.registry.lookup(name).and_then(Binding::usable_value) {
                Some(value) => scope.bind(name.clone(), value.clone()),
                None => {
                    tracing::trace!(cell = %cell, input = %name, "waiting on input");
                    return false;
                }
            }
        }

        let generation = binding.generation();
        let evaluation = self.launch(binding.computation(), scope);
        tracing::trace!(cell = %cell, generation, "evaluate");

        self.in_flight.push(
            async move {
                Settlement {
                    cell,
                    generation,
                    result: evaluation.await,
                }
            }
            .boxed(),
        );
        if let Some(binding) = self.registry.get_mut(cell) {
            binding.mark_running();
        }
        true
    }

    fn launch(
        &self,
        computation: &Computation,
        scope: Scope,
    ) -> BoxFuture<'static, std::result::Result<Value, CellError>> {
        let evaluation = self.evaluator.evaluate(computation, scope);
        match computation.kind {
            ComputationKind::Expression => evaluation,
            ComputationKind::Script => {
                let loader = Arc::clone(&self.loader);
                async move {
                    match evaluation.await? {
                        Value::String(url) => loader.load(&url).await,
                        other => Err(CellError::type_error(format!(
                            "a setup cell must evaluate to a URL string, got {}",
                            other.type_name()
                        ))),
                    }
                }
                .boxed()
            }
        }
    }

    fn apply(
        &mut self,
        cell: CellId,
        generation: u64,
        result: std::result::Result<Value, CellError>,
    ) -> SettleOutcome {
        let trace_values = self.config.trace_values;
        let Some(binding) = self.registry.get_mut(cell) else {
            tracing::debug!(cell = %cell, generation, "discarding result of removed cell");
            return SettleOutcome::Removed(cell);
        };
        if binding.generation() != generation {
            tracing::debug!(
                cell = %cell,
                generation,
                current = binding.generation(),
                "discarding stale result"
            );
            return SettleOutcome::Stale(cell);
        }

        match &result {
            Ok(value) if trace_values => {
                tracing::trace!(cell = %cell, generation, value = %value, "fulfilled")
            }
            Ok(_) => tracing::trace!(cell = %cell, generation, "fulfilled"),
            Err(error) => tracing::trace!(cell = %cell, generation, error = %error, "rejected"),
        }

        binding.settle(result);
        let sink = Arc::clone(binding.sink());
        match binding.state() {
            BindingState::Fulfilled(value) => sink.on_fulfilled(value),
            BindingState::Rejected(error) => sink.on_rejected(error),
            BindingState::Pending | BindingState::Unresolved => {}
        }

        for dependent in self.registry.dependents(cell) {
            self.try_start(dependent);
        }
        SettleOutcome::Applied(cell)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Inputs;
    use crate::reactive::{NullSink, RecordingSink, SinkEvent, StaticLoader};

    fn def(name: &str, inputs: &[&str], source: &str) -> Definition {
        Definition::new(
            name,
            inputs.iter().map(|s| s.to_string()).collect::<Inputs>(),
            Computation::expression(source),
        )
    }

    fn id(n: u64) -> CellId {
        CellId::from(n)
    }

    #[tokio::test]
    async fn chain_settles_in_order() {
        let mut runtime = Runtime::default();
        runtime.define(id(0), def("c0", &[], "4 + 5"), Arc::new(NullSink)).unwrap();
        runtime.define(id(1), def("c1", &["c0"], "c0 * 2"), Arc::new(NullSink)).unwrap();
        assert_eq!(runtime.state(id(1)), Some(&BindingState::Pending));

        runtime.run_until_idle().await;
        assert_eq!(runtime.resolve("c0"), Some(&BindingState::Fulfilled(Value::Number(9.0))));
        assert_eq!(runtime.resolve("c1"), Some(&BindingState::Fulfilled(Value::Number(18.0))));
        assert!(runtime.is_idle());
    }

    #[tokio::test]
    async fn define_reports_pending_once() {
        let mut runtime = Runtime::default();
        let sink = Arc::new(RecordingSink::new());
        runtime.define(id(0), def("c0", &[], "1"), sink.clone()).unwrap();
        runtime.define(id(0), def("c0", &[], "2"), sink.clone()).unwrap();
        runtime.run_until_idle().await;

        assert_eq!(
            sink.events(),
            vec![SinkEvent::Pending, SinkEvent::Fulfilled(Value::Number(2.0))]
        );
    }

    #[tokio::test]
    async fn failed_input_keeps_last_value_flowing() {
        let mut runtime = Runtime::default();
        runtime.define(id(0), def("c0", &[], "3"), Arc::new(NullSink)).unwrap();
        runtime.define(id(1), def("c1", &["c0"], "c0 + 1"), Arc::new(NullSink)).unwrap();
        runtime.run_until_idle().await;

        runtime
            .define(id(0), def("c0", &[], "fail(\"broken\")"), Arc::new(NullSink))
            .unwrap();
        runtime.run_until_idle().await;

        assert!(matches!(runtime.state(id(0)), Some(BindingState::Rejected(_))));
        assert_eq!(runtime.state(id(1)), Some(&BindingState::Fulfilled(Value::Number(4.0))));
    }

    #[tokio::test]
    async fn failed_input_without_history_leaves_dependent_pending() {
        let mut runtime = Runtime::default();
        runtime.define(id(0), def("c0", &[], "nope"), Arc::new(NullSink)).unwrap();
        runtime.define(id(1), def("c1", &["c0"], "c0 + 1"), Arc::new(NullSink)).unwrap();
        runtime.run_until_idle().await;

        assert_eq!(
            runtime.state(id(0)),
            Some(&BindingState::Rejected(CellError::Reference("nope".into())))
        );
        assert_eq!(runtime.state(id(1)), Some(&BindingState::Pending));
    }

    #[tokio::test]
    async fn unresolved_input_waits() {
        let mut runtime = Runtime::default();
        runtime.define(id(1), def("c1", &["c0"], "c0 * 2"), Arc::new(NullSink)).unwrap();
        runtime.run_until_idle().await;
        assert_eq!(runtime.state(id(1)), Some(&BindingState::Pending));

        // Defining the missing name releases the reader.
        runtime.define(id(0), def("c0", &[], "21"), Arc::new(NullSink)).unwrap();
        runtime.run_until_idle().await;
        assert_eq!(runtime.state(id(1)), Some(&BindingState::Fulfilled(Value::Number(42.0))));
    }

    #[tokio::test]
    async fn setup_cells_go_through_the_loader() {
        let loader = StaticLoader::new().with("https://cdn.example/answer.js", Value::Number(42.0));
        let mut runtime = Runtime::with_loader(EngineConfig::default(), Arc::new(loader));
        let setup = Definition::new(
            "c0",
            Inputs::new(),
            Computation::script("\"https://cdn.example/answer.js\""),
        );
        runtime.define(id(0), setup, Arc::new(NullSink)).unwrap();
        runtime.define(id(1), def("c1", &["c0"], "c0 + 1"), Arc::new(NullSink)).unwrap();
        runtime.run_until_idle().await;

        assert_eq!(runtime.state(id(1)), Some(&BindingState::Fulfilled(Value::Number(43.0))));
    }

    #[tokio::test]
    async fn setup_cell_must_produce_a_url() {
        let mut runtime = Runtime::default();
        let setup = Definition::new("c0", Inputs::new(), Computation::script("42"));
        runtime.define(id(0), setup, Arc::new(NullSink)).unwrap();
        runtime.run_until_idle().await;

        let Some(BindingState::Rejected(CellError::Type(message))) = runtime.state(id(0)) else {
            panic!("expected a type error");
        };
        assert!(message.contains("URL string"));
    }

    #[tokio::test]
    async fn without_a_loader_setup_cells_reject() {
        let mut runtime = Runtime::default();
        let setup = Definition::new("c0", Inputs::new(), Computation::script("\"lib.js\""));
        runtime.define(id(0), setup, Arc::new(NullSink)).unwrap();
        runtime.run_until_idle().await;

        assert!(matches!(
            runtime.state(id(0)),
            Some(BindingState::Rejected(CellError::Load { .. }))
        ));
    }

    #[test]
    fn removing_an_unknown_cell_is_an_error() {
        let mut runtime = Runtime::default();
        assert_eq!(runtime.remove(id(3)), Err(EngineError::UnknownCell(id(3))));
    }

    #[test]
    fn invalid_names_are_rejected_before_anything_runs() {
        let mut runtime = Runtime::default();
        let result = runtime.define(id(0), def("not a name", &[], "1"), Arc::new(NullSink));
        assert_eq!(result, Err(EngineError::InvalidName("not a name".into())));
        assert!(runtime.is_idle());
        assert!(runtime.registry().is_empty());
    }
}
