//! Tree-walking interpreter.
//!
//! Evaluation is asynchronous all the way down so that `sleep` (and any
//! helper that suspends) can yield back to the runtime mid-expression. The
//! recursive entry points return boxed futures to give the recursion a
//! finite type.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use super::ast::{ArrowBody, Expr, LogicalOp, Program, Stmt, TemplateSegment};
use super::builtins::{self, Builtin};
use super::parser::parse_program;
use super::{ops, Evaluator, Scope};
use crate::config::EngineConfig;
use crate::error::CellError;
use crate::graph::Computation;
use crate::value::{Closure, Function, Value};

/// The default [`Evaluator`].
#[derive(Debug, Clone)]
pub struct Interpreter {
    helpers: bool,
    max_call_depth: usize,
}

impl Interpreter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            helpers: config.helpers,
            max_call_depth: config.max_call_depth,
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl Evaluator for Interpreter {
    fn evaluate(
        &self,
        computation: &Computation,
        scope: Scope,
    ) -> BoxFuture<'static, Result<Value, CellError>> {
        let source = Arc::clone(&computation.source);
        let machine = Machine {
            helpers: self.helpers,
            max_depth: self.max_call_depth,
        };
        async move {
            let program = parse_program(&source)?;
            machine.run(&program, scope).await
        }
        .boxed()
    }
}

struct Machine {
    helpers: bool,
    max_depth: usize,
}

impl Machine {
    async fn run(&self, program: &Program, mut scope: Scope) -> Result<Value, CellError> {
        match program {
            Program::Expression(expr) => self.eval(expr, &scope, 0).await,
            Program::Block(stmts) => Ok(self.exec(stmts, &mut scope, 0).await?.unwrap_or_default()),
        }
    }

    /// Run statements until the first `return`.
    async fn exec(
        &self,
        stmts: &[Stmt],
        scope: &mut Scope,
        depth: usize,
    ) -> Result<Option<Value>, CellError> {
        for stmt in stmts {
            match stmt {
                Stmt::Let { name, value } => {
                    let value = self.eval(value, scope, depth).await?;
                    scope.bind(name.clone(), value);
                }
                Stmt::Return(expr) => return self.eval(expr, scope, depth).await.map(Some),
                Stmt::Throw(expr) => {
                    let value = self.eval(expr, scope, depth).await?;
                    return Err(CellError::Thrown(value.to_string()));
                }
                Stmt::Expr(expr) => {
                    self.eval(expr, scope, depth).await?;
                }
            }
        }
        Ok(None)
    }

    fn eval<'a>(
        &'a self,
        expr: &'a Expr,
        scope: &'a Scope,
        depth: usize,
    ) -> BoxFuture<'a, Result<Value, CellError>> {
        async move {
            match expr {
                Expr::Number(n) => Ok(Value::Number(*n)),
                Expr::Str(s) => Ok(Value::String(s.clone())),
                Expr::Bool(b) => Ok(Value::Bool(*b)),
                Expr::Null => Ok(Value::Null),
                Expr::Undefined => Ok(Value::Undefined),
                Expr::Template(segments) => {
                    Ok(Value::String(self.interpolate(segments, scope, depth).await?))
                }
                Expr::Ident(name) => self.lookup(name, scope),
                Expr::List(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.eval(item, scope, depth).await?);
                    }
                    Ok(Value::List(out))
                }
                Expr::Record(fields) => {
                    let mut out = crate::value::Record::with_capacity(fields.len());
                    for (key, value) in fields {
                        out.insert(key.clone(), self.eval(value, scope, depth).await?);
                    }
                    Ok(Value::Record(out))
                }
                Expr::Unary { op, operand } => {
                    ops::unary(*op, self.eval(operand, scope, depth).await?)
                }
                Expr::Binary { op, left, right } => {
                    let left = self.eval(left, scope, depth).await?;
                    let right = self.eval(right, scope, depth).await?;
                    ops::binary(*op, left, right)
                }
                Expr::Logical { op, left, right } => {
                    let left = self.eval(left, scope, depth).await?;
                    match (op, left.is_truthy()) {
                        (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                        _ => self.eval(right, scope, depth).await,
                    }
                }
                Expr::Conditional {
                    test,
                    then,
                    otherwise,
                } => {
                    let branch = if self.eval(test, scope, depth).await?.is_truthy() {
                        then
                    } else {
                        otherwise
                    };
                    self.eval(branch, scope, depth).await
                }
                Expr::Member { object, property } => {
                    ops::member(&self.eval(object, scope, depth).await?, property)
                }
                Expr::Index { object, index } => {
                    let object = self.eval(object, scope, depth).await?;
                    let index = self.eval(index, scope, depth).await?;
                    ops::index(&object, &index)
                }
                Expr::Call { callee, args } => self.eval_call(callee, args, scope, depth).await,
                Expr::TaggedTemplate { tag, segments } => {
                    let func = self.eval(tag, scope, depth).await?;
                    let text = self.interpolate(segments, scope, depth).await?;
                    self.call(callable(func, tag)?, vec![Value::String(text)], depth)
                        .await
                }
                Expr::Arrow(lambda) => Ok(Value::Function(Function::Closure(Arc::new(Closure {
                    lambda: Arc::clone(lambda),
                    captured: scope.clone(),
                })))),
                Expr::Await(inner) => self.eval(inner, scope, depth).await,
            }
        }
        .boxed()
    }

    fn helper(&self, name: &str) -> Option<Builtin> {
        if self.helpers {
            Builtin::from_name(name)
        } else {
            None
        }
    }

    fn lookup(&self, name: &str, scope: &Scope) -> Result<Value, CellError> {
        if let Some(value) = scope.get(name) {
            return Ok(value.clone());
        }
        self.helper(name)
            .map(Value::from)
            .ok_or_else(|| CellError::Reference(name.to_string()))
    }

    async fn interpolate(
        &self,
        segments: &[TemplateSegment],
        scope: &Scope,
        depth: usize,
    ) -> Result<String, CellError> {
        let mut out = String::new();
        for segment in segments {
            match segment {
                TemplateSegment::Text(text) => out.push_str(text),
                TemplateSegment::Expr(expr) => {
                    splice(&mut out, &self.eval(expr, scope, depth).await?);
                }
            }
        }
        Ok(out)
    }

    /// `callee(args)`, with `x.f(args)` falling back to helper `f(x, args)`
    /// unless `x` is a record holding a field `f`.
    async fn eval_call(
        &self,
        callee: &Expr,
        args: &[Expr],
        scope: &Scope,
        depth: usize,
    ) -> Result<Value, CellError> {
        let (func, mut values) = match callee {
            Expr::Member { object, property } => {
                let receiver = self.eval(object, scope, depth).await?;
                let field = match &receiver {
                    Value::Record(fields) => fields.get(property).cloned(),
                    _ => None,
                };
                match (field, self.helper(property)) {
                    (Some(field), _) => (field, Vec::with_capacity(args.len())),
                    (None, Some(builtin)) => (Value::from(builtin), vec![receiver]),
                    (None, None) => (ops::member(&receiver, property)?, Vec::new()),
                }
            }
            other => (self.eval(other, scope, depth).await?, Vec::with_capacity(args.len())),
        };
        let func = callable(func, callee)?;
        for arg in args {
            values.push(self.eval(arg, scope, depth).await?);
        }
        self.call(func, values, depth).await
    }

    fn call<'a>(
        &'a self,
        func: Function,
        args: Vec<Value>,
        depth: usize,
    ) -> BoxFuture<'a, Result<Value, CellError>> {
        async move {
            let closure = match func {
                Function::Builtin(builtin) => return self.call_builtin(builtin, args, depth).await,
                Function::Closure(closure) => closure,
            };
            if depth >= self.max_depth {
                return Err(CellError::CallDepth(self.max_depth));
            }

            let mut scope = closure.captured.clone();
            let mut args = args.into_iter();
            for param in &closure.lambda.params {
                scope.bind(param.clone(), args.next().unwrap_or_default());
            }
            match &closure.lambda.body {
                ArrowBody::Expr(expr) => self.eval(expr, &scope, depth + 1).await,
                ArrowBody::Block(stmts) => Ok(self
                    .exec(stmts, &mut scope, depth + 1)
                    .await?
                    .unwrap_or_default()),
            }
        }
        .boxed()
    }

    async fn call_builtin(
        &self,
        builtin: Builtin,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Value, CellError> {
        match builtin {
            Builtin::Map | Builtin::Filter => {
                builtins::arity(builtin, &args, 2, 2)?;
                let mut args = args.into_iter();
                let items = builtins::list(builtin, args.next().unwrap_or_default())?;
                let func = builtins::function(builtin, args.next().unwrap_or_default())?;

                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let result = self
                        .call(func.clone(), vec![item.clone(), Value::Number(i as f64)], depth)
                        .await?;
                    if builtin == Builtin::Map {
                        out.push(result);
                    } else if result.is_truthy() {
                        out.push(item);
                    }
                }
                Ok(Value::List(out))
            }
            Builtin::Reduce => {
                builtins::arity(builtin, &args, 2, 3)?;
                let has_initial = args.len() == 3;
                let mut args = args.into_iter();
                let items = builtins::list(builtin, args.next().unwrap_or_default())?;
                let func = builtins::function(builtin, args.next().unwrap_or_default())?;

                let mut items = items.into_iter().enumerate();
                let mut acc = match (has_initial, args.next()) {
                    (true, Some(initial)) => initial,
                    _ => match items.next() {
                        Some((_, first)) => first,
                        None => {
                            return Err(CellError::type_error(
                                "reduce() of empty list with no initial value",
                            ))
                        }
                    },
                };
                for (i, item) in items {
                    acc = self
                        .call(func.clone(), vec![acc, item, Value::Number(i as f64)], depth)
                        .await?;
                }
                Ok(acc)
            }
            Builtin::Sleep => {
                let (delay, value) = builtins::sleep_args(args)?;
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            _ => builtins::apply(builtin, args),
        }
    }
}

/// Require a function value, naming the callee in the error.
fn callable(value: Value, callee: &Expr) -> Result<Function, CellError> {
    match value {
        Value::Function(func) => Ok(func),
        other => {
            let name = match callee {
                Expr::Ident(name) => name.clone(),
                Expr::Member { property, .. } => property.clone(),
                _ => other.type_name().to_string(),
            };
            Err(CellError::type_error(format!("{name} is not a function")))
        }
    }
}

/// Append a template substitution. Lists are spliced item by item.
fn splice(out: &mut String, value: &Value) {
    match value {
        Value::List(items) => items.iter().for_each(|item| splice(out, item)),
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn eval_with(source: &str, inputs: &[(&str, Value)], config: &EngineConfig) -> Result<Value, CellError> {
        let scope = inputs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        Interpreter::new(config)
            .evaluate(&Computation::expression(source), scope)
            .await
    }

    async fn eval(source: &str, inputs: &[(&str, Value)]) -> Result<Value, CellError> {
        eval_with(source, inputs, &EngineConfig::default()).await
    }

    fn nums(values: &[f64]) -> Value {
        Value::List(values.iter().copied().map(Value::Number).collect())
    }

    #[tokio::test]
    async fn arithmetic_over_inputs() {
        assert_eq!(eval("4 + 5", &[]).await.unwrap(), Value::Number(9.0));
        assert_eq!(
            eval("c0 * 2", &[("c0", Value::Number(9.0))]).await.unwrap(),
            Value::Number(18.0)
        );
    }

    #[tokio::test]
    async fn empty_source_is_undefined() {
        assert_eq!(eval("  // nothing\n", &[]).await.unwrap(), Value::Undefined);
    }

    #[tokio::test]
    async fn block_with_bindings() {
        let source = "{ let total = sum(xs); const n = len(xs); return total / n }";
        let value = eval(source, &[("xs", nums(&[10.0, 20.0, 30.0]))]).await.unwrap();
        assert_eq!(value, Value::Number(20.0));
    }

    #[tokio::test]
    async fn block_without_return_is_undefined() {
        assert_eq!(eval("{ let a = 1 }", &[]).await.unwrap(), Value::Undefined);
    }

    #[tokio::test]
    async fn record_literal_cell() {
        let value = eval(r#"{ name: "A", value: 10 }"#, &[]).await.unwrap();
        assert_eq!(value.to_string(), r#"{ name: "A", value: 10 }"#);
    }

    #[tokio::test]
    async fn method_sugar_calls_helpers() {
        assert_eq!(
            eval("[1, 2, 3].map(x => x * 2)", &[]).await.unwrap(),
            nums(&[2.0, 4.0, 6.0])
        );
        assert_eq!(
            eval("xs.filter((x, i) => i > 0).reduce((a, b) => a + b, 0)", &[("xs", nums(&[5.0, 6.0, 7.0]))])
                .await
                .unwrap(),
            Value::Number(13.0)
        );
    }

    #[tokio::test]
    async fn record_fields_win_over_helpers() {
        let value = eval("({ len: x => 42 }).len(1)", &[]).await.unwrap();
        assert_eq!(value, Value::Number(42.0));
    }

    #[tokio::test]
    async fn closures_capture_their_scope() {
        let source = "{ let k = 3; let times = x => x * k; return [1, 2].map(times) }";
        assert_eq!(eval(source, &[]).await.unwrap(), nums(&[3.0, 6.0]));
    }

    #[tokio::test]
    async fn logical_operators_short_circuit() {
        assert_eq!(eval("0 || \"fallback\"", &[]).await.unwrap(), Value::from("fallback"));
        assert_eq!(eval("null && fail(\"never\")", &[]).await.unwrap(), Value::Null);
        assert_eq!(eval("2 > 1 ? \"yes\" : \"no\"", &[]).await.unwrap(), Value::from("yes"));
    }

    #[tokio::test]
    async fn html_template_splices_lists() {
        let source = "html`<ul>${xs.map(x => html`<li>${x}</li>`)}</ul>`";
        let value = eval(source, &[("xs", nums(&[1.0, 2.0]))]).await.unwrap();
        assert_eq!(value, Value::Html("<ul><li>1</li><li>2</li></ul>".into()));
    }

    #[tokio::test]
    async fn plain_template_is_a_string() {
        let value = eval("`n = ${n}`", &[("n", Value::Number(4.0))]).await.unwrap();
        assert_eq!(value, Value::from("n = 4"));
    }

    #[tokio::test]
    async fn unknown_identifier_is_a_reference_error() {
        assert_eq!(
            eval("c3 + 1", &[]).await.unwrap_err(),
            CellError::Reference("c3".into())
        );
    }

    #[tokio::test]
    async fn inputs_shadow_helpers() {
        assert_eq!(
            eval("sum + 1", &[("sum", Value::Number(1.0))]).await.unwrap(),
            Value::Number(2.0)
        );
    }

    #[tokio::test]
    async fn helpers_can_be_disabled() {
        let config = EngineConfig {
            helpers: false,
            ..EngineConfig::default()
        };
        assert_eq!(
            eval_with("sum([1])", &[], &config).await.unwrap_err(),
            CellError::Reference("sum".into())
        );
    }

    #[tokio::test]
    async fn calling_a_number_is_a_type_error() {
        assert_eq!(
            eval("c0(1)", &[("c0", Value::Number(1.0))]).await.unwrap_err(),
            CellError::Type("c0 is not a function".into())
        );
    }

    #[tokio::test]
    async fn throw_rejects() {
        assert_eq!(
            eval("{ throw \"bad input\" }", &[]).await.unwrap_err(),
            CellError::Thrown("bad input".into())
        );
    }

    #[tokio::test]
    async fn runaway_recursion_hits_the_depth_limit() {
        let config = EngineConfig {
            max_call_depth: 8,
            ..EngineConfig::default()
        };
        assert_eq!(
            eval_with("(f => f(f))(f => f(f))", &[], &config).await.unwrap_err(),
            CellError::CallDepth(8)
        );
    }

    #[tokio::test]
    async fn deeply_nested_source_rejects_instead_of_overflowing() {
        let shallow = format!("{}c0{}", "(".repeat(60), " + 1)".repeat(60));
        assert_eq!(
            eval(&shallow, &[("c0", Value::Number(0.0))]).await.unwrap(),
            Value::Number(60.0)
        );

        let deep = format!("{}1{}", "[".repeat(100_000), "]".repeat(100_000));
        assert!(matches!(
            eval(&deep, &[]).await.unwrap_err(),
            CellError::Syntax { .. }
        ));
    }

    #[tokio::test]
    async fn sleep_resolves_to_its_value() {
        assert_eq!(
            eval("await sleep(1, c0 + 1)", &[("c0", Value::Number(1.0))]).await.unwrap(),
            Value::Number(2.0)
        );
    }

    #[tokio::test]
    async fn syntax_errors_reject() {
        assert!(matches!(
            eval("4 +", &[]).await.unwrap_err(),
            CellError::Syntax { .. }
        ));
    }

    #[tokio::test]
    async fn reduce_of_empty_list_needs_initial_value() {
        assert!(eval("reduce([], (a, b) => a + b)", &[]).await.is_err());
        assert_eq!(
            eval("reduce([], (a, b) => a + b, 0)", &[]).await.unwrap(),
            Value::Number(0.0)
        );
    }
}
