use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use indexmap::IndexMap;

pub type Map = IndexMap<String, Value>;

/// A value flowing through a render pass.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// The result of a failed lookup. Renders as nothing.
    #[default]
    Undefined,
    None,
    Bool(bool),
    Number(Number),
    String(Str),
    List(Arc<Vec<Value>>),
    Map(Arc<Map>),
    DateTime(NaiveDateTime),
    Object(Arc<dyn Object>),
}

#[derive(Clone, Copy, Debug)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(x) => f.write_str(&format_float(*x)),
        }
    }
}

/// String data plus the safe taint. A safe string is already escaped and
/// is emitted verbatim even when autoescaping is active.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Str {
    text: String,
    safe: bool,
}

impl Str {
    pub fn plain(text: impl Into<String>) -> Self {
        Str { text: text.into(), safe: false }
    }

    pub fn safe(text: impl Into<String>) -> Self {
        Str { text: text.into(), safe: true }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Capabilities a host type can expose to templates. Every capability
/// defaults to "not supported", which makes lookups fall through to the
/// next strategy and finally to a does-not-exist result.
pub trait Object: fmt::Debug + Send + Sync {
    /// Attribute-style lookup (`obj.name`).
    fn get_attr(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Index lookup (`obj.0`).
    fn get_item(&self, _index: i64) -> Option<Value> {
        None
    }

    /// Zero-argument call, applied automatically during path resolution.
    fn call(&self) -> Option<Value> {
        None
    }

    /// Iteration support for loops, unpacking and list filters.
    fn as_sequence(&self) -> Option<Vec<Value>> {
        None
    }

    fn is_true(&self) -> bool {
        true
    }

    fn render(&self) -> String {
        format!("{:?}", self)
    }
}

impl Value {
    pub fn safe_string(text: impl Into<String>) -> Value {
        Value::String(Str::safe(text))
    }

    pub fn from_object<O: Object + 'static>(object: O) -> Value {
        Value::Object(Arc::new(object))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Number(Number::Int(_)) => "int",
            Value::Number(Number::Float(_)) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::DateTime(_) => "datetime",
            Value::Object(_) => "object",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, Value::String(s) if s.is_safe())
    }

    /// Marks string data as safe. Other kinds carry no taint and pass through.
    pub fn mark_safe(self) -> Value {
        match self {
            Value::String(s) => Value::String(Str::safe(s.into_string())),
            other => other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        match self {
            Value::Undefined | Value::None => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64() != 0.0,
            Value::String(s) => !s.as_str().is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::DateTime(_) => true,
            Value::Object(o) => o.is_true(),
        }
    }

    /// String coercion with the safe taint preserved.
    pub fn to_str(&self) -> Str {
        match self {
            Value::String(s) => s.clone(),
            other => Str::plain(other.to_string()),
        }
    }

    /// Integer coercion following the usual `int()` rules: floats truncate,
    /// strings must hold an integer literal.
    pub fn to_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Number(Number::Int(i)) => Some(*i),
            Value::Number(Number::Float(f)) if f.is_finite() => Some(f.trunc() as i64),
            Value::String(s) => s.as_str().trim().replace('_', "").parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Float coercion following the usual `float()` rules.
    pub fn to_float(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Some(n.as_f64()),
            Value::String(s) => parse_float(s.as_str()),
            _ => None,
        }
    }

    /// Length of sized values. Strings count characters.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.as_str().chars().count()),
            Value::List(items) => Some(items.len()),
            Value::Map(map) => Some(map.len()),
            Value::Object(o) => o.as_sequence().map(|s| s.len()),
            _ => None,
        }
    }

    /// Items produced by iterating the value: list elements, map keys,
    /// string characters or an object's sequence.
    pub fn try_iter(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items.as_ref().clone()),
            Value::Map(map) => Some(map.keys().map(|k| Value::from(k.as_str())).collect()),
            Value::String(s) => Some(
                s.as_str()
                    .chars()
                    .map(|c| Value::String(Str { text: c.to_string(), safe: s.is_safe() }))
                    .collect(),
            ),
            Value::Object(o) => o.as_sequence(),
            _ => None,
        }
    }

    /// Membership test used by the `in` operator. `None` means the
    /// container does not support membership.
    pub fn contains(&self, needle: &Value) -> Option<bool> {
        match self {
            Value::String(hay) => needle.as_str().map(|n| hay.as_str().contains(n)),
            Value::List(items) => Some(items.iter().any(|v| v == needle)),
            Value::Map(map) => needle.as_str().map(|k| map.contains_key(k)),
            Value::Object(o) => o.as_sequence().map(|items| items.iter().any(|v| v == needle)),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Undefined | Value::None => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(Number::Int(i)) => Json::from(*i),
            Value::Number(Number::Float(f)) => {
                serde_json::Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null)
            }
            Value::String(s) => Json::String(s.as_str().to_string()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => Json::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            Value::DateTime(dt) => Json::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            Value::Object(o) => match o.as_sequence() {
                Some(items) => Json::Array(items.iter().map(Value::to_json).collect()),
                None => Json::String(o.render()),
            },
        }
    }

    /// Quoted representation used when values are nested inside lists and maps.
    pub fn repr(&self) -> String {
        match self {
            Value::String(s) => {
                let text = s.as_str();
                if text.contains('\'') && !text.contains('"') {
                    format!("\"{}\"", text.replace('\\', "\\\\"))
                } else {
                    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
                }
            }
            Value::Undefined => "None".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => Ok(()),
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s.as_str()),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", Value::from(k.as_str()).repr(), v.repr()))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Object(o) => f.write_str(&o.render()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::None, Value::None) => true,
            (Value::String(a), Value::String(b)) => a.as_str() == b.as_str(),
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Number(Number::Int(a)), Value::Number(Number::Int(b))) => a == b,
            (a, b) => match (a.numeric(), b.numeric()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.partial_cmp(y)? {
                        Ordering::Equal => continue,
                        ord => return Some(ord),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Number(Number::Int(a)), Value::Number(Number::Int(b))) => Some(a.cmp(b)),
            (a, b) => a.numeric()?.partial_cmp(&b.numeric()?),
        }
    }
}

impl Value {
    /// Numeric view used by comparisons: numbers and booleans only.
    fn numeric(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Some(n.as_f64()),
            _ => None,
        }
    }
}

/// Formats a float the way the original host runtime prints it: integral
/// values keep one decimal place, very large or very small magnitudes use
/// exponent notation with a signed, two-digit exponent.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    let magnitude = f.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{:e}", f);
        let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(d) => ('-', d),
            None => ('+', exponent),
        };
        return format!("{}e{}{:0>2}", mantissa, sign, digits);
    }
    if f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

pub(crate) fn parse_float(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" | "+infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        "nan" | "+nan" | "-nan" => Some(f64::NAN),
        _ => trimmed.replace('_', "").parse::<f64>().ok(),
    }
}

// Macro to generate From and TryFrom impls
macro_rules! impl_value_conversion {
    ($variant:ident, $type:ty, $error_msg:expr) => {
        impl TryFrom<Value> for $type {
            type Error = String;

            fn try_from(value: Value) -> Result<$type, Self::Error> {
                if let Value::$variant(inner) = value {
                    Ok(inner.into())
                } else {
                    Err($error_msg.to_string())
                }
            }
        }
    };
}

macro_rules! impl_value_number_conversion {
    ($variant:ident, $type:ty, $as:ty) => {
        impl From<$type> for Value {
            fn from(value: $type) -> Value {
                Value::Number(Number::$variant(value as $as))
            }
        }
    };
}

impl_value_conversion!(Bool, bool, "Not a boolean");
impl_value_conversion!(DateTime, NaiveDateTime, "Not a datetime");
impl_value_number_conversion!(Int, i64, i64);
impl_value_number_conversion!(Int, i32, i64);
impl_value_number_conversion!(Int, u32, i64);
impl_value_number_conversion!(Int, usize, i64);
impl_value_number_conversion!(Float, f64, f64);
impl_value_number_conversion!(Float, f32, f64);

impl TryFrom<Value> for String {
    type Error = String;

    fn try_from(value: Value) -> Result<String, Self::Error> {
        match value {
            Value::String(s) => Ok(s.into_string()),
            _ => Err("Not a string".to_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Value {
        Value::Bool(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Value {
        Value::String(Str::plain(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Value {
        Value::String(Str::plain(value))
    }
}

impl From<Str> for Value {
    fn from(value: Str) -> Value {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Value {
        Value::List(Arc::new(value))
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Value {
        Value::Map(Arc::new(value))
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Value {
        Value::DateTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Value {
        value.map(Into::into).unwrap_or(Value::None)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Value {
        Value::from(&value)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(number) => Value::Number(number.into()),
            serde_json::Value::String(s) => Value::from(s.as_str()),
            serde_json::Value::Array(values) => Value::from(values.iter().map(Value::from).collect::<Vec<_>>()),
            serde_json::Value::Object(map) => Value::from(
                map.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect::<Map>(),
            ),
        }
    }
}

impl From<&serde_json::Number> for Number {
    fn from(number: &serde_json::Number) -> Number {
        match number.as_i64() {
            Some(i) => Number::Int(i),
            None => Number::Float(number.as_f64().unwrap_or(f64::NAN)),
        }
    }
}
