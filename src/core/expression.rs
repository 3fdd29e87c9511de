use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, Timelike};
use log::{trace, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::context::Context;
use crate::core::filters::Filter;
use crate::types::{Map, Number, Value};
use crate::ParserError;

static NUMBER_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?(?:\d+(?:\.\d+)?|\.\d+)(?:[eE][-+]?\d+)?$").unwrap());

/// Why a lookup produced no value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    #[error("Failed lookup for key [{0}]")]
    DoesNotExist(String),
    #[error("Access to private variables is forbidden: '{0}'")]
    AccessDenied(String),
}

/// True for paths that reach for a name starting with an underscore.
pub fn is_private_path(path: &str) -> bool {
    path.starts_with('_') || path.contains("._")
}

/// A dotted path such as `user.address.city` or `items.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    path: String,
    segments: Vec<String>,
}

impl Variable {
    pub fn new(path: &str) -> Result<Self, ParserError> {
        if is_private_path(path) {
            return Err(ParserError::PrivateAccess(path.to_string()));
        }
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(ParserError::syntax(format!("Invalid variable path '{}'", path), 0));
        }
        Ok(Self { path: path.to_string(), segments: path.split('.').map(str::to_string).collect() })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn resolve(&self, ctx: &Context<'_>) -> Result<Value, LookupError> {
        trace!("Variable::resolve: path='{}'", self.path);
        let (first, rest) = match self.segments.split_first() {
            Some(split) => split,
            None => return Err(LookupError::DoesNotExist(self.path.clone())),
        };
        let root = ctx
            .get(first)
            .cloned()
            .ok_or_else(|| LookupError::DoesNotExist(first.clone()))?;
        resolve_path(call_if_callable(root), rest)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Walks `segments` from `root`, one capability check per segment.
pub fn resolve_path<S: AsRef<str>>(root: Value, segments: &[S]) -> Result<Value, LookupError> {
    let mut current = root;
    for segment in segments {
        let segment = segment.as_ref();
        current = lookup_segment(&current, segment)
            .map(call_if_callable)
            .ok_or_else(|| LookupError::DoesNotExist(segment.to_string()))?;
    }
    Ok(current)
}

/// One resolution step: keyed lookup, then index lookup, then attribute
/// lookup. The first capability that answers wins.
pub fn lookup_segment(current: &Value, segment: &str) -> Option<Value> {
    let index = segment.parse::<i64>().ok();
    match current {
        Value::Map(map) => map.get(segment).cloned().or_else(|| map_attribute(map, segment)),
        Value::List(items) => index.and_then(|i| python_index(items.len(), i)).map(|i| items[i].clone()),
        Value::String(s) => {
            let i = index?;
            let chars: Vec<char> = s.as_str().chars().collect();
            python_index(chars.len(), i).map(|i| Value::from(chars[i].to_string()))
        }
        Value::Object(object) => object
            .get_attr(segment)
            .or_else(|| index.and_then(|i| object.get_item(i))),
        Value::DateTime(dt) => match segment {
            "year" => Some(Value::from(dt.year())),
            "month" => Some(Value::from(dt.month())),
            "day" => Some(Value::from(dt.day())),
            "hour" => Some(Value::from(dt.hour())),
            "minute" => Some(Value::from(dt.minute())),
            "second" => Some(Value::from(dt.second())),
            "microsecond" => Some(Value::from(dt.nanosecond() / 1_000 % 1_000_000)),
            "weekday" => Some(Value::from(dt.weekday().num_days_from_monday())),
            "isoweekday" => Some(Value::from(dt.weekday().number_from_monday())),
            _ => None,
        },
        _ => None,
    }
}

fn map_attribute(map: &Map, segment: &str) -> Option<Value> {
    match segment {
        "items" => Some(Value::from(
            map.iter()
                .map(|(k, v)| Value::from(vec![Value::from(k.as_str()), v.clone()]))
                .collect::<Vec<_>>(),
        )),
        "keys" => Some(Value::from(map.keys().map(|k| Value::from(k.as_str())).collect::<Vec<_>>())),
        "values" => Some(Value::from(map.values().cloned().collect::<Vec<_>>())),
        _ => None,
    }
}

/// Maps a possibly negative index onto `0..len`.
pub(crate) fn python_index(len: usize, index: i64) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { len + index } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

fn call_if_callable(value: Value) -> Value {
    if let Value::Object(object) = &value {
        if let Some(result) = object.call() {
            return result;
        }
    }
    value
}

/// The base of a filter expression: a literal or a variable path.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Variable(Variable),
}

impl Operand {
    /// Classifies a raw token. Quoted strings become safe literals, whole
    /// numeric tokens become numbers, everything else is a path.
    pub fn parse(token: &str) -> Result<Self, ParserError> {
        if let Some(text) = unquote(token) {
            return Ok(Operand::Literal(Value::safe_string(text)));
        }
        if NUMBER_LITERAL.is_match(token) {
            return parse_number(token).map(Operand::Literal);
        }
        Variable::new(token).map(Operand::Variable)
    }

    pub fn resolve(&self, ctx: &Context<'_>) -> Result<Value, LookupError> {
        match self {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Variable(variable) => variable.resolve(ctx),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(value) => write!(f, "{}", value.repr()),
            Operand::Variable(variable) => write!(f, "{}", variable),
        }
    }
}

fn parse_number(token: &str) -> Result<Value, ParserError> {
    let is_float = token.contains('.') || token.contains('e') || token.contains('E');
    if !is_float {
        if let Ok(i) = token.parse::<i64>() {
            return Ok(Value::Number(Number::Int(i)));
        }
    }
    token
        .parse::<f64>()
        .map(|f| Value::Number(Number::Float(f)))
        .map_err(|_| ParserError::InvalidNumber(token.to_string()))
}

/// Strips matching quotes and undoes `\"`, `\'` and `\\` escapes.
pub(crate) fn unquote(token: &str) -> Option<String> {
    let quote = token.chars().next()?;
    if token.len() < 2 || !(quote == '"' || quote == '\'') || !token.ends_with(quote) {
        return None;
    }
    let inner = &token[1..token.len() - 1];
    let escaped_quote = format!("\\{}", quote);
    Some(inner.replace(&escaped_quote, &quote.to_string()).replace("\\\\", "\\"))
}

/// A filter applied with its optional argument.
#[derive(Debug, Clone)]
pub struct FilterCall {
    pub name: String,
    pub filter: Arc<dyn Filter>,
    pub arg: Option<Operand>,
}

/// A base operand threaded through an ordered filter chain. Immutable once
/// compiled; evaluated fresh on every render.
#[derive(Debug, Clone)]
pub struct FilterExpression {
    token: String,
    base: Operand,
    filters: Vec<FilterCall>,
}

impl FilterExpression {
    pub fn new(token: impl Into<String>, base: Operand, filters: Vec<FilterCall>) -> Self {
        Self { token: token.into(), base, filters }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn base(&self) -> &Operand {
        &self.base
    }

    pub fn filters(&self) -> &[FilterCall] {
        &self.filters
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.base, Operand::Literal(_)) && self.filters.is_empty()
    }

    /// Display-position resolution. A missing variable yields the configured
    /// invalid string (with `%s` replaced by the path), or runs the filter
    /// chain on an empty string when none is configured.
    pub fn resolve(&self, ctx: &Context<'_>) -> Value {
        match self.base.resolve(ctx) {
            Ok(value) => self.apply_filters(value, ctx),
            Err(err) => {
                warn!("Missing variable in '{}': {}", self.token, err);
                let invalid = &ctx.config().string_if_invalid;
                if invalid.is_empty() {
                    self.apply_filters(Value::from(""), ctx)
                } else if invalid.contains("%s") {
                    Value::from(invalid.replace("%s", &self.base.to_string()))
                } else {
                    Value::from(invalid.as_str())
                }
            }
        }
    }

    /// Lenient resolution: a missing variable becomes `None` before the
    /// filter chain runs.
    pub fn resolve_quiet(&self, ctx: &Context<'_>) -> Value {
        let value = self.base.resolve(ctx).unwrap_or_else(|err| {
            trace!("Quiet lookup of '{}' failed: {}", self.token, err);
            Value::None
        });
        self.apply_filters(value, ctx)
    }

    /// Strict resolution used by comparison operands. A missing bare
    /// variable is an error; with filters attached it behaves like
    /// [`FilterExpression::resolve_quiet`].
    pub fn resolve_strict(&self, ctx: &Context<'_>) -> Result<Value, LookupError> {
        match self.base.resolve(ctx) {
            Ok(value) => Ok(self.apply_filters(value, ctx)),
            Err(err) if self.filters.is_empty() => Err(err),
            Err(_) => Ok(self.apply_filters(Value::None, ctx)),
        }
    }

    fn apply_filters(&self, mut value: Value, ctx: &Context<'_>) -> Value {
        for call in &self.filters {
            let arg = call.arg.as_ref().map(|arg| {
                arg.resolve(ctx).unwrap_or_else(|err| {
                    warn!("Argument of filter '{}' failed to resolve: {}", call.name, err);
                    Value::Undefined
                })
            });
            let signature = call.filter.signature();
            let input_safe = value.is_safe();
            let input = if signature.string_only { Value::String(value.to_str()) } else { value };
            trace!("Applying filter '{}' to {:?} (arg {:?})", call.name, input, arg);
            let output = call.filter.apply(input, arg.as_ref(), ctx);
            value = if signature.is_safe && input_safe { output.mark_safe() } else { output };
        }
        value
    }
}
