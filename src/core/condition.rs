use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use log::trace;

use crate::context::Context;
use crate::core::expression::{FilterExpression, LookupError};
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
        };
        f.write_str(symbol)
    }
}

/// A compiled boolean expression for `if`/`elif`.
#[derive(Debug, Clone)]
pub enum Condition {
    Operand(FilterExpression),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Compare(CompareOp, Box<Condition>, Box<Condition>),
}

impl Condition {
    /// Evaluates to the deciding operand value, like `and`/`or` do in the
    /// host language. A bare missing variable is `Undefined` (falsy); a
    /// missing operand of a comparison aborts the whole condition.
    pub fn evaluate(&self, ctx: &Context<'_>) -> Result<Value, LookupError> {
        match self {
            Condition::Operand(expr) => match expr.resolve_strict(ctx) {
                Ok(value) => Ok(value),
                Err(LookupError::DoesNotExist(path)) => {
                    trace!("Condition operand '{}' is undefined", path);
                    Ok(Value::Undefined)
                }
                Err(err) => Err(err),
            },
            Condition::Not(inner) => Ok(Value::Bool(!inner.evaluate(ctx)?.is_true())),
            Condition::And(lhs, rhs) => {
                let left = lhs.evaluate(ctx)?;
                if !left.is_true() {
                    return Ok(left);
                }
                rhs.evaluate(ctx)
            }
            Condition::Or(lhs, rhs) => {
                let left = lhs.evaluate(ctx)?;
                if left.is_true() {
                    return Ok(left);
                }
                rhs.evaluate(ctx)
            }
            Condition::Compare(op, lhs, rhs) => {
                let left = lhs.comparison_operand(ctx)?;
                let right = rhs.comparison_operand(ctx)?;
                Ok(Value::Bool(compare(*op, &left, &right)))
            }
        }
    }

    /// True when the condition holds; evaluation failures count as false.
    pub fn is_true(&self, ctx: &Context<'_>) -> bool {
        match self.evaluate(ctx) {
            Ok(value) => value.is_true(),
            Err(err) => {
                trace!("Condition aborted: {}", err);
                false
            }
        }
    }

    fn comparison_operand(&self, ctx: &Context<'_>) -> Result<Value, LookupError> {
        match self {
            Condition::Operand(expr) => expr.resolve_strict(ctx),
            other => other.evaluate(ctx),
        }
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    match op {
        CompareOp::Eq => left == right,
        CompareOp::Ne => left != right,
        CompareOp::Lt => matches!(left.partial_cmp(right), Some(Ordering::Less)),
        CompareOp::Le => matches!(left.partial_cmp(right), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => matches!(left.partial_cmp(right), Some(Ordering::Greater)),
        CompareOp::Ge => matches!(left.partial_cmp(right), Some(Ordering::Greater | Ordering::Equal)),
        CompareOp::In => right.contains(left).unwrap_or(false),
        CompareOp::NotIn => right.contains(left).is_some_and(|found| !found),
        CompareOp::Is => identical(left, right),
        CompareOp::IsNot => !identical(left, right),
    }
}

/// Identity test. Singletons compare by value, shared containers by
/// pointer, everything else is never identical.
fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) | (Value::Undefined, Value::Undefined) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
        (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
        (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::context::Scope;
    use crate::parser::parse_condition;
    use crate::registry::{FilterRegistry, Services};
    use crate::types::Map;
    use serde_json::json;

    fn check(source: &str, vars: serde_json::Value) -> Result<bool, LookupError> {
        let registry = FilterRegistry::new();
        let condition = parse_condition(source, &registry, 1).unwrap();
        let config = EngineConfig::default();
        let services = Services::default();
        let map: Map = match Value::from(vars) {
            Value::Map(map) => map.as_ref().clone(),
            _ => Map::new(),
        };
        let ctx = Context::new(Scope::from(map), &config, &services);
        condition.evaluate(&ctx).map(|v| v.is_true())
    }

    #[test]
    fn precedence() {
        // `or` binds loosest, then `and`, then `not`
        assert!(check("a or b and c", json!({"a": true, "b": false, "c": false})).unwrap());
        assert!(!check("not a or b", json!({"a": true, "b": false})).unwrap());
        assert!(check("not a == b", json!({"a": 1, "b": 2})).unwrap());
        assert!(check("not x in items", json!({"x": 4, "items": [1, 2]})).unwrap());
    }

    #[test]
    fn comparisons() {
        let vars = json!({"n": 5, "s": "abc", "items": [1, 2, 3], "m": {"k": 1}});
        assert!(check("n > 4", vars.clone()).unwrap());
        assert!(check("n <= 5", vars.clone()).unwrap());
        assert!(check("n == 5.0", vars.clone()).unwrap());
        assert!(check("\"b\" in s", vars.clone()).unwrap());
        assert!(check("2 in items", vars.clone()).unwrap());
        assert!(check("\"k\" in m", vars.clone()).unwrap());
        assert!(check("9 not in items", vars.clone()).unwrap());
        assert!(!check("s < 1", vars.clone()).unwrap());
        assert!(check("n|add:1 == 6", vars).unwrap());
    }

    #[test]
    fn identity() {
        let vars = json!({"nothing": null, "flag": true, "items": [1]});
        assert!(check("nothing is None", vars.clone()).unwrap());
        assert!(check("flag is True", vars.clone()).unwrap());
        assert!(check("items is not None", vars.clone()).unwrap());
        assert!(check("items is items", vars).unwrap());
    }

    #[test]
    fn missing_variables() {
        assert!(!check("missing", json!({})).unwrap());
        assert!(check("not missing", json!({})).unwrap());
        assert!(check("missing or 1", json!({})).unwrap());
        assert!(check("missing == 1", json!({})).is_err());
        assert!(check("missing|default:1 == 1", json!({})).unwrap());
    }

    #[test]
    fn short_circuits() {
        // the right-hand comparison would abort if it were evaluated
        assert!(check("1 or missing == 2", json!({})).unwrap());
        assert!(!check("0 and missing == 2", json!({})).unwrap());
    }
}
