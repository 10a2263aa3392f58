//! Value operations: truthiness, equality, coercions, arithmetic
//! helpers, and display formatting.

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use sharpts_common::numeric::format_number;

use crate::value::{PropKey, Value};

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::BigInt(b) => **b != BigInt::from(0),
        Value::Str(s) => !s.is_empty(),
        _ => true,
    }
}

pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => true,
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::BigInt(x), Value::BigInt(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        _ => match (a.identity(), b.identity()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Number(x), Value::Str(y)) => *x == str_to_number(y),
        (Value::Str(x), Value::Number(y)) => str_to_number(x) == *y,
        (Value::Bool(x), _) => loose_equals(&Value::Number(f64::from(*x as u8)), b),
        (_, Value::Bool(y)) => loose_equals(a, &Value::Number(f64::from(*y as u8))),
        (Value::BigInt(x), Value::Number(y)) => x.to_f64().is_some_and(|v| v == *y),
        (Value::Number(x), Value::BigInt(y)) => y.to_f64().is_some_and(|v| v == *x),
        _ => strict_equals(a, b),
    }
}

fn str_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Number coercion for arithmetic and comparison contexts.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(*b as u8),
        Value::Number(n) => *n,
        Value::BigInt(b) => b.to_f64().unwrap_or(f64::NAN),
        Value::Str(s) => str_to_number(s),
        _ => f64::NAN,
    }
}

/// ToInt32 for the bitwise operators.
pub fn to_int32(value: &Value) -> i32 {
    let n = to_number(value);
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let m = n.trunc();
    (m as i64 as u32) as i32
}

/// ToUint32 for `>>>`.
pub fn to_uint32(value: &Value) -> u32 {
    let n = to_number(value);
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    n.trunc() as i64 as u32
}

/// String coercion (the `+` operator and template literals).
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(*n),
        Value::BigInt(b) => b.to_string(),
        Value::Str(s) => s.to_string(),
        Value::Symbol(_) => "Symbol()".to_string(),
        Value::Array(elements) => {
            // Array-to-string joins with commas (no brackets).
            let parts: Vec<String> = elements
                .borrow()
                .iter()
                .map(to_display_string)
                .collect();
            parts.join(",")
        }
        Value::Object(_) => "[object Object]".to_string(),
        Value::Function(_) | Value::Class(_) => "function".to_string(),
        Value::Promise(_) => "[object Promise]".to_string(),
        Value::Generator(_) => "[object Generator]".to_string(),
    }
}

/// Console-style formatting: strings print bare at the top level;
/// compound values print inspected.
pub fn format_for_console(value: &Value) -> String {
    match value {
        Value::Str(s) => s.to_string(),
        _ => inspect(value, 0),
    }
}

fn inspect(value: &Value, depth: u32) -> String {
    match value {
        Value::Str(s) => format!("'{s}'"),
        Value::BigInt(b) => format!("{b}n"),
        Value::Array(elements) => {
            if depth > 3 {
                return "[Array]".to_string();
            }
            let parts: Vec<String> = elements
                .borrow()
                .iter()
                .map(|v| inspect(v, depth + 1))
                .collect();
            if parts.is_empty() {
                "[]".to_string()
            } else {
                format!("[ {} ]", parts.join(", "))
            }
        }
        Value::Object(data) => {
            if depth > 3 {
                return "[Object]".to_string();
            }
            if let Some(class) = &data.class {
                let fields: Vec<String> = data
                    .props
                    .borrow()
                    .iter()
                    .filter_map(|(key, v)| match key {
                        PropKey::Name(name) => {
                            Some(format!("{name}: {}", inspect(v, depth + 1)))
                        }
                        PropKey::Symbol(_) => None,
                    })
                    .collect();
                return format!("{} {{ {} }}", class.name, fields.join(", "));
            }
            let fields: Vec<String> = data
                .props
                .borrow()
                .iter()
                .filter_map(|(key, v)| match key {
                    PropKey::Name(name) => Some(format!("{name}: {}", inspect(v, depth + 1))),
                    PropKey::Symbol(_) => None,
                })
                .collect();
            if fields.is_empty() {
                "{}".to_string()
            } else {
                format!("{{ {} }}", fields.join(", "))
            }
        }
        Value::Function(_) => "[Function]".to_string(),
        Value::Class(class) => format!("[class {}]", class.name),
        Value::Promise(_) => "Promise".to_string(),
        Value::Generator(_) => "Object [Generator] {}".to_string(),
        other => to_display_string(other),
    }
}
