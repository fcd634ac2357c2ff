use trigger_types::Event;

use crate::ast::{BinOp, Expr, FieldRef};
use crate::value::{from_event_value, Value};
use crate::ExprError;

/// Evaluate `expr` against `event`, returning the boolean result.
///
/// A top-level non-boolean result (e.g. a pre-filter that's just a bare
/// number) is a [`ExprError::TypeError`] — pre-filters must reduce to a
/// condition, not a value.
pub fn eval_bool(expr: &Expr, event: &Event) -> Result<bool, ExprError> {
    match eval(expr, event)? {
        Value::Bool(b) => Ok(b),
        other => Err(ExprError::TypeError(format!(
            "expression evaluated to {}, expected bool",
            other.type_name()
        ))),
    }
}

fn eval(expr: &Expr, event: &Event) -> Result<Value, ExprError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::StringLit(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::ListLit(items) => {
            let values = items
                .iter()
                .map(|item| eval(item, event))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(values))
        }
        Expr::Field(field_ref) => eval_field(field_ref, event),
        Expr::Neg(inner) => match eval(inner, event)? {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(type_error("number", &other)),
        },
        Expr::Not(inner) => match eval(inner, event)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(type_error("bool", &other)),
        },
        Expr::BinOp { op, left, right } => eval_binop(*op, left, right, event),
        Expr::InList {
            expr: target,
            list,
            negated,
        } => {
            let target_val = eval(target, event)?;
            let list_val = eval(list, event)?;
            let Value::List(items) = list_val else {
                return Err(type_error("list", &list_val));
            };
            let found = items.iter().any(|item| values_equal(&target_val, item));
            Ok(Value::Bool(if *negated { !found } else { found }))
        }
    }
}

fn eval_field(field_ref: &FieldRef, event: &Event) -> Result<Value, ExprError> {
    let name = match field_ref {
        FieldRef::Simple(name) => name.as_str(),
        FieldRef::Bracketed(_, key) => key.as_str(),
    };
    let raw = event
        .get(name)
        .ok_or_else(|| ExprError::UnknownName(name.to_string()))?;
    Ok(from_event_value(raw))
}

fn eval_binop(op: BinOp, left: &Expr, right: &Expr, event: &Event) -> Result<Value, ExprError> {
    match op {
        BinOp::And => {
            let l = eval_bool(left, event)?;
            if !l {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval_bool(right, event)?))
        }
        BinOp::Or => {
            let l = eval_bool(left, event)?;
            if l {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval_bool(right, event)?))
        }
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            let lv = eval(left, event)?;
            let rv = eval(right, event)?;
            compare(op, &lv, &rv).map(Value::Bool)
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            let lv = eval(left, event)?;
            let rv = eval(right, event)?;
            let ln = as_number(&lv)?;
            let rn = as_number(&rv)?;
            arithmetic(op, ln, rn)
        }
    }
}

fn as_number(v: &Value) -> Result<f64, ExprError> {
    match v {
        Value::Number(n) => Ok(*n),
        other => Err(type_error("number", other)),
    }
}

fn arithmetic(op: BinOp, l: f64, r: f64) -> Result<Value, ExprError> {
    match op {
        BinOp::Add => Ok(Value::Number(l + r)),
        BinOp::Sub => Ok(Value::Number(l - r)),
        BinOp::Mul => Ok(Value::Number(l * r)),
        BinOp::Div => {
            if r == 0.0 {
                Err(ExprError::DivisionByZero)
            } else {
                Ok(Value::Number(l / r))
            }
        }
        BinOp::Mod => {
            if r == 0.0 {
                Err(ExprError::DivisionByZero)
            } else {
                Ok(Value::Number(l % r))
            }
        }
        _ => unreachable!("arithmetic called with non-arithmetic op"),
    }
}

fn compare(op: BinOp, l: &Value, r: &Value) -> Result<bool, ExprError> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => Ok(match op {
            BinOp::Eq => a == b,
            BinOp::Ne => a != b,
            BinOp::Lt => a < b,
            BinOp::Gt => a > b,
            BinOp::Le => a <= b,
            BinOp::Ge => a >= b,
            _ => unreachable!("compare called with non-comparison op"),
        }),
        (Value::Str(a), Value::Str(b)) => Ok(match op {
            BinOp::Eq => a == b,
            BinOp::Ne => a != b,
            BinOp::Lt => a < b,
            BinOp::Gt => a > b,
            BinOp::Le => a <= b,
            BinOp::Ge => a >= b,
            _ => unreachable!("compare called with non-comparison op"),
        }),
        (Value::Bool(a), Value::Bool(b)) => match op {
            BinOp::Eq => Ok(a == b),
            BinOp::Ne => Ok(a != b),
            _ => Err(ExprError::TypeError(
                "bool only supports == and != comparisons".into(),
            )),
        },
        (Value::List(a), Value::List(b)) => match op {
            BinOp::Eq => Ok(a.len() == b.len()
                && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))),
            BinOp::Ne => Ok(a.len() != b.len()
                || !a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))),
            _ => Err(ExprError::TypeError(
                "list only supports == and != comparisons".into(),
            )),
        },
        (a, b) => Err(ExprError::TypeError(format!(
            "cannot compare {} with {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    matches!(compare(BinOp::Eq, a, b), Ok(true))
}

fn type_error(expected: &str, got: &Value) -> ExprError {
    ExprError::TypeError(format!("expected {expected}, got {}", got.type_name()))
}
