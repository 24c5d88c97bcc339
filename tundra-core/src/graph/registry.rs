//! Variable Registry
//!
//! The registry owns every [`Binding`] and answers graph questions about
//! them. Edges are not stored on the bindings: B depends on A exactly when
//! A's name is in B's inputs. A reverse index from name to readers keeps
//! "who reads this name" cheap, and it survives the named binding going
//! away so that a binding defined later under the same name reaches the
//! cells that were waiting for it.
//!
//! # Cycles
//!
//! [`Registry::cyclic_members`] runs Kahn's algorithm over a cascade. Nodes
//! the sort cannot place either sit on a cycle or depend on one; only those
//! that can reach themselves are reported, the rest simply wait on inputs
//! that never settle.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use indexmap::map::Entry;
use indexmap::{IndexMap, IndexSet};

use super::binding::{Binding, BindingState, CellId, Definition};
use crate::error::{EngineError, Result};
use crate::extract::is_identifier;
use crate::reactive::OutputSink;

/// All bindings, indexed by cell and by name.
#[derive(Debug, Default)]
pub struct Registry {
    /// Bindings in definition order.
    bindings: IndexMap<CellId, Binding>,

    /// Which cell holds each name.
    names: HashMap<String, CellId>,

    /// Cells whose inputs mention each name.
    readers: HashMap<String, IndexSet<CellId>>,

    /// Last generation of each removed cell. A cell defined again resumes
    /// from here so that evaluations started before the removal stay stale.
    retired: HashMap<CellId, u64>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the binding for `cell` and mark it pending.
    ///
    /// Returns whether the binding transitioned into `Pending`.
    pub fn define(
        &mut self,
        cell: CellId,
        definition: Definition,
        sink: Arc<dyn OutputSink>,
    ) -> Result<bool> {
        if !is_identifier(&definition.name) {
            return Err(EngineError::InvalidName(definition.name));
        }
        if let Some(&owner) = self.names.get(&definition.name) {
            if owner != cell {
                return Err(EngineError::DuplicateName {
                    name: definition.name,
                    owner,
                });
            }
        }

        // Drop the old name and edges before installing the new ones.
        if let Some(old) = self.bindings.get(&cell) {
            let (old_name, old_inputs) = (old.name().to_string(), old.inputs().to_vec());
            self.names.remove(&old_name);
            self.unlink_reader(cell, &old_inputs);
        }

        self.names.insert(definition.name.clone(), cell);
        for input in &definition.inputs {
            self.readers.entry(input.clone()).or_default().insert(cell);
        }

        let binding = match self.bindings.entry(cell) {
            Entry::Occupied(entry) => {
                let binding = entry.into_mut();
                binding.replace(definition, sink);
                binding
            }
            Entry::Vacant(entry) => {
                let generation = self.retired.remove(&cell).unwrap_or(0);
                entry.insert(Binding::new(cell, definition, sink).resumed_from(generation))
            }
        };
        Ok(binding.mark_pending())
    }

    /// Delete the binding for `cell` and the edges from its inputs.
    ///
    /// Cells reading its name keep their inputs; the name just stops
    /// resolving.
    pub fn remove(&mut self, cell: CellId) -> Option<Binding> {
        let binding = self.bindings.shift_remove(&cell)?;
        if self.names.get(binding.name()) == Some(&cell) {
            self.names.remove(binding.name());
        }
        self.unlink_reader(cell, binding.inputs());
        self.retired.insert(cell, binding.generation());
        Some(binding)
    }

    fn unlink_reader(&mut self, cell: CellId, inputs: &[String]) {
        for input in inputs {
            if let Some(readers) = self.readers.get_mut(input) {
                readers.shift_remove(&cell);
                if readers.is_empty() {
                    self.readers.remove(input);
                }
            }
        }
    }

    pub fn get(&self, cell: CellId) -> Option<&Binding> {
        self.bindings.get(&cell)
    }

    pub(crate) fn get_mut(&mut self, cell: CellId) -> Option<&mut Binding> {
        self.bindings.get_mut(&cell)
    }

    /// The binding currently holding `name`.
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.names.get(name).and_then(|cell| self.bindings.get(cell))
    }

    /// Current state of the binding holding `name`.
    pub fn resolve(&self, name: &str) -> Option<&BindingState> {
        self.lookup(name).map(Binding::state)
    }

    pub fn contains(&self, cell: CellId) -> bool {
        self.bindings.contains_key(&cell)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    /// Cells whose inputs resolve to `cell`.
    pub fn dependencies(&self, cell: CellId) -> Vec<CellId> {
        self.bindings
            .get(&cell)
            .map(|binding| {
                binding
                    .inputs()
                    .iter()
                    .filter_map(|name| self.names.get(name).copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Cells that read `cell`'s name.
    pub fn dependents(&self, cell: CellId) -> Vec<CellId> {
        self.bindings
            .get(&cell)
            .and_then(|binding| self.readers.get(binding.name()))
            .map(|readers| {
                readers
                    .iter()
                    .copied()
                    .filter(|reader| self.bindings.contains_key(reader))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `root` followed by everything reachable from it, breadth first.
    pub fn closure(&self, root: CellId) -> Vec<CellId> {
        if !self.bindings.contains_key(&root) {
            return Vec::new();
        }
        let mut order = vec![root];
        let mut visited = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);

        while let Some(cell) = queue.pop_front() {
            for dependent in self.dependents(cell) {
                if visited.insert(dependent) {
                    order.push(dependent);
                    queue.push_back(dependent);
                }
            }
        }
        order
    }

    /// Members of `cells` that lie on a dependency cycle.
    pub fn cyclic_members(&self, cells: &[CellId]) -> HashSet<CellId> {
        let set: HashSet<_> = cells.iter().copied().collect();
        let mut in_degree: HashMap<CellId, usize> = HashMap::new();
        let mut queue = VecDeque::new();

        // In-degrees count only edges inside the set.
        for &cell in cells {
            let degree = self
                .dependencies(cell)
                .iter()
                .filter(|d| set.contains(d))
                .count();
            in_degree.insert(cell, degree);
            if degree == 0 {
                queue.push_back(cell);
            }
        }

        // Kahn's algorithm
        while let Some(cell) = queue.pop_front() {
            for dependent in self.dependents(cell) {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    // Each reader edge is counted once per matching input.
                    let edges = self
                        .dependencies(dependent)
                        .iter()
                        .filter(|d| **d == cell)
                        .count();
                    *degree = degree.saturating_sub(edges);
                    if *degree == 0 && edges > 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        in_degree
            .into_iter()
            .filter(|&(cell, degree)| degree > 0 && self.reaches(cell, cell))
            .map(|(cell, _)| cell)
            .collect()
    }

    /// Whether a path of one or more edges leads from `from` to `to`.
    fn reaches(&self, from: CellId, to: CellId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = self.dependents(from);
        while let Some(cell) = stack.pop() {
            if cell == to {
                return true;
            }
            if visited.insert(cell) {
                stack.extend(self.dependents(cell));
            }
        }
        false
    }
}
