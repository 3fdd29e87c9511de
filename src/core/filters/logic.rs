use crate::context::Context;
use crate::types::Value;

use super::{arg_text, ArgSpec, FnFilter};

/// Line width `pprint` tries to stay within.
const PPRINT_WIDTH: usize = 80;

pub(crate) fn filters() -> Vec<FnFilter> {
    vec![
        FnFilter::new("default", ArgSpec::Required, default),
        FnFilter::new("default_if_none", ArgSpec::Required, default_if_none),
        FnFilter::new("yesno", ArgSpec::Optional, yesno),
        FnFilter::new("pluralize", ArgSpec::Optional, pluralize),
        FnFilter::new("pprint", ArgSpec::None, pprint).safe(),
    ]
}

fn default(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    if value.is_true() { value } else { arg.cloned().unwrap_or_default() }
}

fn default_if_none(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    if value.is_none() || value.is_undefined() {
        arg.cloned().unwrap_or_default()
    } else {
        value
    }
}

fn yesno(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    let mapping = arg_text(arg).unwrap_or_else(|| "yes,no,maybe".to_string());
    let bits: Vec<&str> = mapping.split(',').collect();
    let (yes, no, maybe) = match bits.as_slice() {
        [yes, no, maybe] => (*yes, *no, *maybe),
        [yes, no, ..] => (*yes, *no, *no),
        _ => return value,
    };
    let chosen = if value.is_none() || value.is_undefined() {
        maybe
    } else if value.is_true() {
        yes
    } else {
        no
    };
    Value::from(chosen)
}

fn pluralize(value: Value, arg: Option<&Value>, _: &Context<'_>) -> Value {
    let mut suffixes = arg_text(arg).unwrap_or_else(|| "s".to_string());
    if !suffixes.contains(',') {
        suffixes.insert(0, ',');
    }
    let bits: Vec<&str> = suffixes.split(',').collect();
    let [singular, plural] = bits.as_slice() else {
        return Value::from("");
    };
    let count = match &value {
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.to_float(),
        other => other.len().map(|len| len as f64),
    };
    match count {
        Some(n) if n == 1.0 => Value::from(*singular),
        Some(_) => Value::from(*plural),
        None => Value::from(""),
    }
}

fn pprint(value: Value, _: Option<&Value>, _: &Context<'_>) -> Value {
    Value::from(pformat(&value, 0))
}

/// Single-line representation with map keys in sorted order.
fn sorted_repr(value: &Value) -> String {
    match value {
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(sorted_repr).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Map(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let parts: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}: {}", Value::from(k.as_str()).repr(), sorted_repr(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        other => other.repr(),
    }
}

/// Pretty representation that breaks containers one element per line once
/// the flat form no longer fits.
pub(crate) fn pformat(value: &Value, indent: usize) -> String {
    let flat = sorted_repr(value);
    if indent + flat.chars().count() <= PPRINT_WIDTH {
        return flat;
    }
    let padding = " ".repeat(indent + 1);
    match value {
        Value::List(items) if !items.is_empty() => {
            let parts: Vec<String> = items.iter().map(|item| pformat(item, indent + 1)).collect();
            format!("[{}]", parts.join(&format!(",\n{}", padding)))
        }
        Value::Map(map) if !map.is_empty() => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let parts: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| {
                    let key = Value::from(k.as_str()).repr();
                    let nested = indent + 1 + key.chars().count() + 2;
                    format!("{}: {}", key, pformat(v, nested))
                })
                .collect();
            format!("{{{}}}", parts.join(&format!(",\n{}", padding)))
        }
        _ => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filters::run;
    use serde_json::json;

    #[test]
    fn defaults() {
        assert_eq!(run("default", Value::from(""), Some(Value::from("x")), true).to_string(), "x");
        assert_eq!(run("default", Value::from(0), Some(Value::from("x")), true).to_string(), "x");
        assert_eq!(run("default", Value::from("v"), Some(Value::from("x")), true).to_string(), "v");
        assert_eq!(run("default_if_none", Value::None, Some(Value::from("x")), true).to_string(), "x");
        assert_eq!(run("default_if_none", Value::from(""), Some(Value::from("x")), true).to_string(), "");
    }

    #[test]
    fn yes_no_maybe() {
        let yn = |value: Value, arg: Option<&str>| run("yesno", value, arg.map(Value::from), true).to_string();
        assert_eq!(yn(Value::from(true), None), "yes");
        assert_eq!(yn(Value::None, None), "maybe");
        assert_eq!(yn(Value::None, Some("on,off")), "off");
        assert_eq!(yn(Value::from(0), Some("on,off")), "off");
        assert_eq!(yn(Value::from(true), Some("bad")), "True");
    }

    #[test]
    fn plural_suffixes() {
        let p = |value: Value, arg: Option<&str>| run("pluralize", value, arg.map(Value::from), true).to_string();
        assert_eq!(p(Value::from(1), None), "");
        assert_eq!(p(Value::from(2), None), "s");
        assert_eq!(p(Value::from("1"), Some("es")), "");
        assert_eq!(p(Value::from(0), Some("y,ies")), "ies");
        assert_eq!(p(Value::from(json!(["a"])), Some("y,ies")), "y");
        assert_eq!(p(Value::from("many"), None), "");
        assert_eq!(p(Value::from(2), Some("a,b,c")), "");
    }

    #[test]
    fn pretty_printing() {
        let value = Value::from(json!({"b": [1, 2], "a": "x"}));
        assert_eq!(run("pprint", value, None, true).to_string(), "{'a': 'x', 'b': [1, 2]}");
        let long: Vec<Value> = (0..30).map(|i| Value::from(format!("item{}", i))).collect();
        let printed = pformat(&Value::from(long), 0);
        assert!(printed.starts_with("['item0',\n 'item1',"));
        assert!(printed.ends_with("'item29']"));
    }
}
