//! Helper functions available to every cell.
//!
//! Helpers are looked up only when a name is not bound in the cell's scope,
//! so an input named like a helper shadows it. The higher-order helpers
//! (`map`, `filter`, `reduce`) and `sleep` need the interpreter and are
//! dispatched there; everything else is a plain function of its arguments.

use std::time::Duration;

use crate::error::CellError;
use crate::value::{Function, Record, Value};

/// Longest list `range` will build.
pub const MAX_RANGE_LEN: usize = 1_000_000;

/// The fixed helper set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Html,
    Len,
    Sum,
    Min,
    Max,
    Range,
    Map,
    Filter,
    Reduce,
    Join,
    Keys,
    Values,
    Str,
    Num,
    Round,
    Floor,
    Abs,
    Sqrt,
    Sleep,
    Fail,
}

impl Builtin {
    pub const ALL: [Builtin; 20] = [
        Builtin::Html,
        Builtin::Len,
        Builtin::Sum,
        Builtin::Min,
        Builtin::Max,
        Builtin::Range,
        Builtin::Map,
        Builtin::Filter,
        Builtin::Reduce,
        Builtin::Join,
        Builtin::Keys,
        Builtin::Values,
        Builtin::Str,
        Builtin::Num,
        Builtin::Round,
        Builtin::Floor,
        Builtin::Abs,
        Builtin::Sqrt,
        Builtin::Sleep,
        Builtin::Fail,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Html => "html",
            Builtin::Len => "len",
            Builtin::Sum => "sum",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Range => "range",
            Builtin::Map => "map",
            Builtin::Filter => "filter",
            Builtin::Reduce => "reduce",
            Builtin::Join => "join",
            Builtin::Keys => "keys",
            Builtin::Values => "values",
            Builtin::Str => "str",
            Builtin::Num => "num",
            Builtin::Round => "round",
            Builtin::Floor => "floor",
            Builtin::Abs => "abs",
            Builtin::Sqrt => "sqrt",
            Builtin::Sleep => "sleep",
            Builtin::Fail => "fail",
        }
    }
}

pub(crate) fn arity(
    builtin: Builtin,
    args: &[Value],
    min: usize,
    max: usize,
) -> Result<(), CellError> {
    let n = args.len();
    if n < min || n > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(CellError::type_error(format!(
            "{}() expects {expected} argument{}, got {n}",
            builtin.name(),
            if max == 1 { "" } else { "s" }
        )));
    }
    Ok(())
}

fn number(builtin: Builtin, value: &Value) -> Result<f64, CellError> {
    value.as_number().ok_or_else(|| {
        CellError::type_error(format!(
            "{}() expects a number, got {}",
            builtin.name(),
            value.type_name()
        ))
    })
}

pub(crate) fn list(builtin: Builtin, value: Value) -> Result<Vec<Value>, CellError> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(CellError::type_error(format!(
            "{}() expects a list, got {}",
            builtin.name(),
            other.type_name()
        ))),
    }
}

pub(crate) fn function(builtin: Builtin, value: Value) -> Result<Function, CellError> {
    match value {
        Value::Function(func) => Ok(func),
        other => Err(CellError::type_error(format!(
            "{}() expects a function, got {}",
            builtin.name(),
            other.type_name()
        ))),
    }
}

fn record(builtin: Builtin, value: Value) -> Result<Record, CellError> {
    match value {
        Value::Record(fields) => Ok(fields),
        other => Err(CellError::type_error(format!(
            "{}() expects a record, got {}",
            builtin.name(),
            other.type_name()
        ))),
    }
}

/// Arguments of `sleep(ms[, value])`: the delay and the value to resolve to.
pub(crate) fn sleep_args(args: Vec<Value>) -> Result<(Duration, Value), CellError> {
    arity(Builtin::Sleep, &args, 1, 2)?;
    let mut args = args.into_iter();
    let ms = number(Builtin::Sleep, &args.next().unwrap_or_default())?;
    let ms = if ms.is_finite() && ms > 0.0 { ms } else { 0.0 };
    Ok((
        Duration::from_secs_f64(ms / 1000.0),
        args.next().unwrap_or_default(),
    ))
}

/// Numbers from either one list argument or several number arguments.
fn numbers(builtin: Builtin, args: Vec<Value>) -> Result<Vec<f64>, CellError> {
    let values = match <[Value; 1]>::try_from(args) {
        Ok([Value::List(items)]) => items,
        Ok([single]) => vec![single],
        Err(args) => args,
    };
    values.iter().map(|v| number(builtin, v)).collect()
}

/// Apply a helper that needs nothing but its arguments.
pub(crate) fn apply(builtin: Builtin, args: Vec<Value>) -> Result<Value, CellError> {
    match builtin {
        Builtin::Html => {
            arity(builtin, &args, 1, 1)?;
            Ok(Value::Html(args[0].to_string()))
        }
        Builtin::Len => {
            arity(builtin, &args, 1, 1)?;
            let len = match &args[0] {
                Value::List(items) => items.len(),
                Value::Record(fields) => fields.len(),
                Value::String(s) | Value::Html(s) => s.chars().count(),
                other => {
                    return Err(CellError::type_error(format!(
                        "len() has no meaning for {}",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Number(len as f64))
        }
        Builtin::Sum => Ok(Value::Number(numbers(builtin, args)?.into_iter().sum())),
        Builtin::Min | Builtin::Max => {
            let values = numbers(builtin, args)?;
            let pick = if builtin == Builtin::Min { f64::min } else { f64::max };
            Ok(values
                .into_iter()
                .reduce(pick)
                .map(Value::Number)
                .unwrap_or_default())
        }
        Builtin::Range => {
            arity(builtin, &args, 1, 3)?;
            let bounds = args
                .iter()
                .map(|v| number(builtin, v))
                .collect::<Result<Vec<_>, _>>()?;
            let (start, end, step) = match bounds.as_slice() {
                [end] => (0.0, *end, 1.0),
                [start, end] => (*start, *end, 1.0),
                [start, end, step] => (*start, *end, *step),
                _ => unreachable!("arity checked"),
            };
            if step == 0.0 || !step.is_finite() {
                return Err(CellError::type_error("range() step must be a non-zero number"));
            }
            // NaN bounds give an empty range.
            let span = ((end - start) / step).ceil();
            if span > MAX_RANGE_LEN as f64 {
                return Err(CellError::type_error(format!(
                    "range() would produce more than {MAX_RANGE_LEN} items"
                )));
            }
            let len = if span > 0.0 { span as usize } else { 0 };
            Ok(Value::List(
                (0..len)
                    .map(|i| Value::Number(start + step * i as f64))
                    .collect(),
            ))
        }
        Builtin::Join => {
            arity(builtin, &args, 1, 2)?;
            let mut args = args.into_iter();
            let items = list(builtin, args.next().unwrap_or_default())?;
            let separator = match args.next() {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => ",".to_string(),
            };
            Ok(Value::String(
                items
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(&separator),
            ))
        }
        Builtin::Keys | Builtin::Values => {
            arity(builtin, &args, 1, 1)?;
            let fields = record(builtin, args.into_iter().next().unwrap_or_default())?;
            let out = if builtin == Builtin::Keys {
                fields.into_keys().map(Value::String).collect()
            } else {
                fields.into_values().collect()
            };
            Ok(Value::List(out))
        }
        Builtin::Str => {
            arity(builtin, &args, 1, 1)?;
            Ok(Value::String(args[0].to_string()))
        }
        Builtin::Num => {
            arity(builtin, &args, 1, 1)?;
            let n = match &args[0] {
                Value::Number(n) => *n,
                Value::Bool(b) => f64::from(u8::from(*b)),
                Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
                Value::Null => 0.0,
                _ => f64::NAN,
            };
            Ok(Value::Number(n))
        }
        Builtin::Round | Builtin::Floor | Builtin::Abs | Builtin::Sqrt => {
            arity(builtin, &args, 1, 1)?;
            let n = number(builtin, &args[0])?;
            let out = match builtin {
                Builtin::Round => n.round(),
                Builtin::Floor => n.floor(),
                Builtin::Abs => n.abs(),
                _ => n.sqrt(),
            };
            Ok(Value::Number(out))
        }
        Builtin::Fail => {
            arity(builtin, &args, 0, 1)?;
            let message = args
                .first()
                .map(Value::to_string)
                .unwrap_or_else(|| "fail() called".to_string());
            Err(CellError::Thrown(message))
        }
        Builtin::Map | Builtin::Filter | Builtin::Reduce | Builtin::Sleep => {
            Err(CellError::type_error(format!(
                "{}() must be run by the interpreter",
                builtin.name()
            )))
        }
    }
}

impl From<Builtin> for Value {
    fn from(builtin: Builtin) -> Self {
        Value::Function(Function::Builtin(builtin))
    }
}
