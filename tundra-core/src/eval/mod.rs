//! Expression Evaluation
//!
//! This module turns a cell's source into a [`Value`]. The runtime only sees
//! the [`Evaluator`] trait: it hands over a [`Computation`] and a [`Scope`]
//! holding the resolved inputs, and gets back a future that settles to a
//! value or a [`CellError`].
//!
//! The default evaluator is [`Interpreter`], a tree-walking interpreter for
//! a small JavaScript-flavoured language:
//!
//! ```text
//! c0 * 2
//! [1, 2, 3].map(x => x * 2)
//! { let total = sum(c1); return total / len(c1) }
//! html`<b>${c0}</b>`
//! ```
//!
//! The pipeline is `lexer` → `parser` → [`Interpreter`]. Parsing happens
//! inside the returned future, so a syntax error rejects the cell like any
//! other failure.

mod ast;
mod builtins;
mod interp;
mod lexer;
mod ops;
mod parser;

use futures_util::future::BoxFuture;
use indexmap::IndexMap;

pub use ast::{ArrowBody, BinaryOp, Expr, Lambda, LogicalOp, Program, Stmt, TemplateSegment, UnaryOp};
pub use builtins::Builtin;
pub use interp::Interpreter;
pub use parser::parse_program;

pub(crate) use lexer::{is_ident_continue, is_ident_start};
pub(crate) use parser::is_keyword;

use crate::error::CellError;
use crate::graph::Computation;
use crate::value::Value;

/// Something that can run a cell's computation.
///
/// The returned future owns everything it needs. The runtime polls it
/// alongside every other in-flight evaluation and may drop it at any time
/// once the result is no longer wanted.
pub trait Evaluator: Send + Sync {
    fn evaluate(
        &self,
        computation: &Computation,
        scope: Scope,
    ) -> BoxFuture<'static, Result<Value, CellError>>;
}

/// Named values visible to an evaluation, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    bindings: IndexMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing any earlier value.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Scope {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut scope = Scope::new();
        for (name, value) in iter {
            scope.bind(name, value);
        }
        scope
    }
}
