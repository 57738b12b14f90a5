//! Runtime values
//!
//! Values live on the operand stack or in frame locals. Aggregates are
//! reference values (`Arc`) with value-semantic equality; assignment
//! copies the reference and mutation operations produce new values, so
//! sharing is safe.

use droe_core::constant::{decimal_to_string, Constant};
use std::sync::Arc;

/// A runtime value.
///
/// `Decimal` holds the scaled representation (value x 100). Dates and
/// file paths are text at runtime; their types only matter to the
/// checker and the format rules.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i32),
    Decimal(i64),
    Text(Arc<str>),
    Flag(bool),
    List(Arc<Vec<Value>>),
    Group(Arc<Vec<Value>>),
    Record {
        schema: u16,
        fields: Arc<Vec<Value>>,
    },
}

impl Value {
    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(Arc::from(s.into().into_boxed_str()))
    }

    /// Placeholder for locals that have not been assigned yet; the
    /// checker's declare-before-use rule keeps these unobservable.
    pub fn uninit() -> Value {
        Value::Flag(false)
    }

    pub fn from_constant(constant: &Constant) -> Value {
        match constant {
            Constant::Int(v) => Value::Int(*v),
            Constant::Decimal(v) => Value::Decimal(*v),
            Constant::Text(s) | Constant::Date(s) | Constant::Pattern(s) => Value::text(s.clone()),
            Constant::Flag(b) => Value::Flag(*b),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Flag(_) => "flag",
            Value::List(_) => "list",
            Value::Group(_) => "group",
            Value::Record { .. } => "record",
        }
    }

    /// The fixed display rules: int by decimal digits, decimal with a
    /// two-digit fractional part, flag as true/false, text verbatim,
    /// collections as `[e1, e2, ...]`.
    pub fn display(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Decimal(v) => decimal_to_string(*v),
            Value::Text(s) => s.to_string(),
            Value::Flag(b) => b.to_string(),
            Value::List(items) | Value::Group(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.display()).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Record { fields, .. } => {
                let rendered: Vec<String> = fields.iter().map(|v| v.display()).collect();
                format!("{{{}}}", rendered.join(", "))
            }
        }
    }
}

impl PartialEq for Value {
    /// Value-semantic equality. Mixed int/decimal compares on the scaled
    /// representation; lists compare element-wise in order; groups
    /// compare as unordered multisets.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Int(a), Value::Decimal(b)) | (Value::Decimal(b), Value::Int(a)) => {
                i64::from(*a) * 100 == *b
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Flag(a), Value::Flag(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Group(a), Value::Group(b)) => multiset_eq(a, b),
            (
                Value::Record {
                    schema: sa,
                    fields: fa,
                },
                Value::Record {
                    schema: sb,
                    fields: fb,
                },
            ) => sa == sb && fa == fb,
            _ => false,
        }
    }
}

fn multiset_eq(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut remaining: Vec<&Value> = b.iter().collect();
    for item in a {
        match remaining.iter().position(|candidate| *candidate == item) {
            Some(at) => {
                remaining.swap_remove(at);
            }
            None => return false,
        }
    }
    true
}
