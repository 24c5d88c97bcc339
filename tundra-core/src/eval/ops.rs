//! Operator semantics.
//!
//! Operators are strict about types: arithmetic needs numbers, `+` also
//! concatenates when either side is text, comparison needs two numbers or two
//! strings. Equality is structural.

use super::ast::{BinaryOp, UnaryOp};
use crate::error::CellError;
use crate::value::Value;

pub(crate) fn unary(op: UnaryOp, operand: Value) -> Result<Value, CellError> {
    match (op, operand) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Plus, Value::Number(n)) => Ok(Value::Number(n)),
        (UnaryOp::Neg | UnaryOp::Plus, value) => Err(CellError::type_error(format!(
            "cannot apply unary {} to {}",
            if op == UnaryOp::Neg { "-" } else { "+" },
            value.type_name()
        ))),
    }
}

pub(crate) fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, CellError> {
    use BinaryOp::*;

    match op {
        Eq => return Ok(Value::Bool(left == right)),
        NotEq => return Ok(Value::Bool(left != right)),
        Add => {
            if is_text(&left) || is_text(&right) {
                return Ok(Value::String(format!("{left}{right}")));
            }
        }
        Lt | LtEq | Gt | GtEq => return compare(op, &left, &right),
        _ => {}
    }

    let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
        return Err(mismatch(op, &left, &right));
    };
    let result = match op {
        Add => a + b,
        Sub => a - b,
        Mul => a * b,
        Div => a / b,
        Rem => a % b,
        Eq | NotEq | Lt | LtEq | Gt | GtEq => unreachable!("handled above"),
    };
    Ok(Value::Number(result))
}

fn is_text(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Html(_))
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, CellError> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => return Err(mismatch(op, left, right)),
    };
    let Some(ordering) = ordering else {
        // NaN compares false with everything.
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::LtEq => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::GtEq => ordering.is_ge(),
        _ => unreachable!("not a comparison"),
    };
    Ok(Value::Bool(result))
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> CellError {
    CellError::type_error(format!(
        "cannot apply {} to {} and {}",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

/// `object.property`
pub(crate) fn member(object: &Value, property: &str) -> Result<Value, CellError> {
    match object {
        Value::Undefined | Value::Null => Err(CellError::type_error(format!(
            "cannot read property '{property}' of {}",
            object.type_name()
        ))),
        Value::Record(fields) => Ok(fields.get(property).cloned().unwrap_or_default()),
        Value::List(items) if property == "length" => Ok(Value::Number(items.len() as f64)),
        Value::String(s) if property == "length" => Ok(Value::Number(s.chars().count() as f64)),
        _ => Ok(Value::Undefined),
    }
}

/// `object[index]`
pub(crate) fn index(object: &Value, index: &Value) -> Result<Value, CellError> {
    match (object, index) {
        (Value::List(items), Value::Number(n)) => Ok(position(*n)
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or_default()),
        (Value::String(s), Value::Number(n)) => Ok(position(*n)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or_default()),
        (_, Value::String(key)) => member(object, key),
        (Value::Undefined | Value::Null, _) => Err(CellError::type_error(format!(
            "cannot index {}",
            object.type_name()
        ))),
        _ => Ok(Value::Undefined),
    }
}

fn position(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn arithmetic() {
        assert_eq!(binary(BinaryOp::Mul, num(9.0), num(2.0)).unwrap(), num(18.0));
        assert_eq!(binary(BinaryOp::Rem, num(7.0), num(4.0)).unwrap(), num(3.0));
        assert_eq!(
            binary(BinaryOp::Div, num(1.0), num(0.0)).unwrap(),
            num(f64::INFINITY)
        );
    }

    #[test]
    fn plus_concatenates_text() {
        assert_eq!(
            binary(BinaryOp::Add, Value::from("n = "), num(4.0)).unwrap(),
            Value::from("n = 4")
        );
    }

    #[test]
    fn arithmetic_on_lists_is_a_type_error() {
        let err = binary(BinaryOp::Sub, Value::List(vec![]), num(1.0)).unwrap_err();
        assert_eq!(err, CellError::Type("cannot apply - to list and number".into()));
    }

    #[test]
    fn structural_equality() {
        let a = Value::List(vec![num(1.0), Value::from("x")]);
        let b = Value::List(vec![num(1.0), Value::from("x")]);
        assert_eq!(binary(BinaryOp::Eq, a, b).unwrap(), Value::Bool(true));
    }

    #[test]
    fn comparisons() {
        assert_eq!(binary(BinaryOp::Lt, num(1.0), num(2.0)).unwrap(), Value::Bool(true));
        assert_eq!(
            binary(BinaryOp::GtEq, Value::from("b"), Value::from("a")).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            binary(BinaryOp::Lt, num(f64::NAN), num(2.0)).unwrap(),
            Value::Bool(false)
        );
        assert!(binary(BinaryOp::Lt, num(1.0), Value::from("2")).is_err());
    }

    #[test]
    fn member_and_index() {
        let list = Value::List(vec![num(10.0), num(20.0)]);
        assert_eq!(member(&list, "length").unwrap(), num(2.0));
        assert_eq!(index(&list, &num(1.0)).unwrap(), num(20.0));
        assert_eq!(index(&list, &num(5.0)).unwrap(), Value::Undefined);
        assert!(member(&Value::Undefined, "x").is_err());
    }
}
