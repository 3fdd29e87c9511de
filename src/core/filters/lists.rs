use std::cmp::Ordering;

use log::warn;

use crate::context::Context;
use crate::core::escape::conditional_escape;
use crate::core::expression::{is_private_path, lookup_segment};
use crate::types::{Number, Str, Value};

use super::{arg_text, ArgSpec, FnFilter};

pub(crate) fn filters() -> Vec<FnFilter> {
    vec![
        FnFilter::new("dictsort", ArgSpec::Required, dictsort),
        FnFilter::new("dictsortreversed", ArgSpec::Required, dictsortreversed),
        FnFilter::new("first", ArgSpec::None, first),
        FnFilter::new("last", ArgSpec::None, last).safe(),
        FnFilter::new("join", ArgSpec::Required, join).safe().needs_autoescape(),
        FnFilter::new("length", ArgSpec::None, length),
        FnFilter::new("random", ArgSpec::None, random).safe(),
        FnFilter::new("slice", ArgSpec::Required, slice).safe(),
    ]
}

/// How `dictsort` extracts the sort key of each element.
enum SortKey {
    Index(i64),
    Path(Vec<String>),
}

impl SortKey {
    fn from_arg(arg: Option<&Value>) -> Option<SortKey> {
        match arg? {
            Value::Number(Number::Int(i)) => Some(SortKey::Index(*i)),
            other => {
                let path = other.to_str().into_string();
                if path.is_empty() || is_private_path(&path) {
                    return None;
                }
                Some(SortKey::Path(path.split('.').map(str::to_string).collect()))
            }
        }
    }

    fn extract(&self, item: &Value) -> Option<Value> {
        match self {
            SortKey::Index(i) => match item {
                Value::Object(object) => object.get_item(*i),
                other => lookup_segment(other, &i.to_string()),
            },
            SortKey::Path(segments) => segments.iter().try_fold(item.clone(), |current, segment| {
                match &current {
                    Value::Object(object) => object.get_attr(segment),
                    other => lookup_segment(other, segment),
                }
            }),
        }
    }
}

fn sort_by_key(value: &Value, arg: Option<&Value>, reverse: bool) -> Value {
    let Some(key) = SortKey::from_arg(arg) else {
        return Value::from("");
    };
    let Some(items) = value.try_iter() else {
        return Value::from("");
    };
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        match key.extract(&item) {
            Some(k) => keyed.push((k, item)),
            None => {
                warn!("dictsort: element {} has no sort key", item.repr());
                return Value::from("");
            }
        }
    }
    let mut mixed = false;
    keyed.sort_by(|(a, _), (b, _)| {
        let ordering = compare_keys(a, b, &mut mixed);
        if reverse { ordering.reverse() } else { ordering }
    });
    if mixed {
        warn!("dictsort: sort keys are not comparable");
        return Value::from("");
    }
    Value::from(keyed.into_iter().map(|(_, item)| item).collect::<Vec<_>>())
}

/// Total order over sort keys. Numbers, strings, datetimes and lists each
/// order among themselves; a comparison across kinds (or between kinds with
/// no order at all) sets `mixed` and falls back to ranking by kind.
fn compare_keys(a: &Value, b: &Value, mixed: &mut bool) -> Ordering {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.as_str().cmp(y.as_str()),
        (Value::DateTime(x), Value::DateTime(y)) => x.cmp(y),
        (Value::List(x), Value::List(y)) => {
            for (p, q) in x.iter().zip(y.iter()) {
                match compare_keys(p, q, mixed) {
                    Ordering::Equal => continue,
                    ordering => return ordering,
                }
            }
            x.len().cmp(&y.len())
        }
        _ => match (numeric_key(a), numeric_key(b)) {
            (Some(x), Some(y)) => compare_numbers(x, y),
            _ => {
                *mixed = true;
                key_rank(a).cmp(&key_rank(b))
            }
        },
    }
}

fn key_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) | Value::Number(_) => 0,
        Value::String(_) => 1,
        Value::DateTime(_) => 2,
        Value::List(_) => 3,
        _ => 4,
    }
}

fn numeric_key(value: &Value) -> Option<Number> {
    match value {
        Value::Bool(b) => Some(Number::Int(*b as i64)),
        Value::Number(n) => Some(*n),
        _ => None,
    }
}

/// Exact numeric order. NaN sorts after every other number.
fn compare_numbers(a: Number, b: Number) -> Ordering {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x.cmp(&y),
        (Number::Float(x), Number::Float(y)) => match (x.is_nan(), y.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        },
        (Number::Int(x), Number::Float(y)) => compare_int_float(x, y),
        (Number::Float(x), Number::Int(y)) => compare_int_float(y, x).reverse(),
    }
}

fn compare_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        return Ordering::Less;
    }
    match (i as f64).partial_cmp(&f) {
        // equal after rounding means `f` is integral and within i128
        Some(Ordering::Equal) => (i as i128).cmp(&(f as i128)),
        Some(ordering) => ordering,
        None => Ordering::Less,
    }
}

fn dictsort(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    sort_by_key(&value, arg, false)
}

fn dictsortreversed(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    sort_by_key(&value, arg, true)
}

fn first(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    value.try_iter().and_then(|items| items.into_iter().next()).unwrap_or_else(|| Value::from(""))
}

fn last(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    value.try_iter().and_then(|items| items.into_iter().last()).unwrap_or_else(|| Value::from(""))
}

fn join(value: Value, arg: Option<&Value>, ctx: &Context<'_>) -> Value {
    let Some(items) = value.try_iter() else {
        return value;
    };
    let separator = arg.cloned().unwrap_or_else(|| Value::from(""));
    if ctx.autoescape() {
        let separator = conditional_escape(&separator);
        let parts: Vec<String> = items.iter().map(|item| conditional_escape(item).into_string()).collect();
        return Value::String(Str::safe(parts.join(separator.as_str())));
    }
    let mut parts = Vec::with_capacity(items.len());
    for item in &items {
        match item.as_str() {
            Some(s) => parts.push(s.to_string()),
            None => return value,
        }
    }
    Value::from(parts.join(separator.to_str().as_str())).mark_safe()
}

fn length(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    Value::from(value.len().unwrap_or(0))
}

fn random(value: Value, _: Option<&Value>, ctx: &Context<'_>) -> Value {
    let Some(items) = value.try_iter() else {
        return Value::from("");
    };
    match ctx.services().choice.choose(items.len()) {
        Some(i) => items.get(i).cloned().unwrap_or_default(),
        None => Value::from(""),
    }
}

/// Parses `start:stop:step` with each part optional.
fn parse_slice(spec: &str) -> Option<(Option<i64>, Option<i64>, i64)> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let bound = |part: Option<&&str>| -> Option<Option<i64>> {
        match part.map(|p| p.trim()) {
            None | Some("") => Some(None),
            Some(p) => p.parse::<i64>().ok().map(Some),
        }
    };
    if parts.len() == 1 {
        // a lone index slices up to it
        return Some((None, bound(parts.first())?, 1));
    }
    let start = bound(parts.first())?;
    let stop = bound(parts.get(1))?;
    let step = bound(parts.get(2))?.unwrap_or(1);
    Some((start, stop, step))
}

/// Indices selected by a slice over a sequence of `len` elements.
pub(crate) fn slice_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let clamp = |bound: i64, low: i64, high: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(low, high)
    };
    let mut out = Vec::new();
    if step > 0 {
        let start = start.map_or(0, |s| clamp(s, 0, len));
        let stop = stop.map_or(len, |s| clamp(s, 0, len));
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    } else {
        let start = start.map_or(len - 1, |s| clamp(s, -1, len - 1));
        let stop = stop.map_or(-1, |s| clamp(s, -1, len - 1));
        let mut i = start;
        while i > stop {
            out.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    }
    out
}

fn slice(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    let Some((start, stop, step)) = arg_text(arg).as_deref().and_then(parse_slice) else {
        return value;
    };
    if step == 0 {
        return value;
    }
    if let Value::String(s) = &value {
        let chars: Vec<char> = s.as_str().chars().collect();
        let sliced: String = slice_indices(chars.len(), start, stop, step).into_iter().map(|i| chars[i]).collect();
        return Value::String(Str::plain(sliced));
    }
    let Some(items) = value.try_iter() else {
        return value;
    };
    Value::from(
        slice_indices(items.len(), start, stop, step)
            .into_iter()
            .map(|i| items[i].clone())
            .collect::<Vec<_>>(),
    )
}
