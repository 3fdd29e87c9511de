use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use log::trace;

use crate::context::Context;
use crate::types::Value;
use crate::ParserError;

pub mod dates;
pub mod html;
pub mod lists;
pub mod logic;
pub mod numbers;
pub mod strings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSpec {
    None,
    Optional,
    Required,
}

impl ArgSpec {
    fn accepts(&self, provided: bool) -> bool {
        match self {
            ArgSpec::None => !provided,
            ArgSpec::Optional => true,
            ArgSpec::Required => provided,
        }
    }

    fn expected(&self) -> usize {
        match self {
            ArgSpec::None => 0,
            ArgSpec::Optional | ArgSpec::Required => 1,
        }
    }
}

impl fmt::Display for ArgSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgSpec::None => write!(f, "no argument"),
            ArgSpec::Optional => write!(f, "an optional argument"),
            ArgSpec::Required => write!(f, "one argument"),
        }
    }
}

/// Static description of a filter.
///
/// * `is_safe`: the output is re-marked safe when the input was safe.
/// * `needs_autoescape`: the filter reads the ambient autoescape setting.
/// * `string_only`: the input is coerced to a string (taint preserved)
///   before the filter runs.
#[derive(Debug, Clone)]
pub struct FilterSignature {
    pub name: String,
    pub arg: ArgSpec,
    pub is_safe: bool,
    pub needs_autoescape: bool,
    pub string_only: bool,
}

impl FilterSignature {
    pub fn new(name: &str, arg: ArgSpec) -> Self {
        Self { name: name.to_string(), arg, is_safe: false, needs_autoescape: false, string_only: false }
    }
}

/// A named transformation in a filter chain.
///
/// Filters never fail: bad input degrades to a fallback value chosen per
/// filter (usually an empty string or the input itself).
pub trait Filter: Debug + Send + Sync {
    fn apply(&self, value: Value, arg: Option<&Value>, ctx: &Context<'_>) -> Value;

    fn signature(&self) -> &FilterSignature;

    fn validate_args(&self, provided: bool) -> Result<(), ParserError> {
        let signature = self.signature();
        trace!("Filter::validate_args({}, provided={})", signature.name, provided);
        if signature.arg.accepts(provided) {
            Ok(())
        } else {
            Err(ParserError::FilterArguments {
                name: signature.name.clone(),
                expected: signature.arg.expected(),
                provided: provided as usize,
            })
        }
    }
}

pub type FilterFn = fn(Value, Option<&Value>, &Context<'_>) -> Value;

/// A filter backed by a plain function.
#[derive(Clone)]
pub struct FnFilter {
    signature: FilterSignature,
    func: FilterFn,
}

impl Debug for FnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFilter").field("signature", &self.signature).finish()
    }
}

impl FnFilter {
    pub fn new(name: &str, arg: ArgSpec, func: FilterFn) -> Self {
        Self { signature: FilterSignature::new(name, arg), func }
    }

    pub fn safe(mut self) -> Self {
        self.signature.is_safe = true;
        self
    }

    pub fn needs_autoescape(mut self) -> Self {
        self.signature.needs_autoescape = true;
        self
    }

    pub fn string_only(mut self) -> Self {
        self.signature.string_only = true;
        self
    }
}

impl Filter for FnFilter {
    fn apply(&self, value: Value, arg: Option<&Value>, ctx: &Context<'_>) -> Value {
        (self.func)(value, arg, ctx)
    }

    fn signature(&self) -> &FilterSignature {
        &self.signature
    }
}

pub(crate) fn load_filters() -> HashMap<String, Arc<dyn Filter>> {
    let mut filters: HashMap<String, Arc<dyn Filter>> = HashMap::new();
    for filter in strings::filters()
        .into_iter()
        .chain(html::filters())
        .chain(lists::filters())
        .chain(numbers::filters())
        .chain(logic::filters())
        .chain(dates::filters())
    {
        filters.insert(filter.signature.name.clone(), Arc::new(filter));
    }
    filters
}

/// String view of a filter argument; `None` when absent.
pub(crate) fn arg_text(arg: Option<&Value>) -> Option<String> {
    arg.map(|a| a.to_str().into_string())
}

/// Integer view of a filter argument following `int()` rules.
pub(crate) fn arg_int(arg: Option<&Value>) -> Option<i64> {
    arg.and_then(Value::to_int)
}

/// Runs a single built-in filter through the same pipeline templates use.
#[cfg(test)]
pub(crate) fn run(name: &str, value: Value, arg: Option<Value>, autoescape: bool) -> Value {
    use crate::config::EngineConfig;
    use crate::context::Scope;
    use crate::core::expression::{FilterCall, FilterExpression, Operand};
    use crate::registry::Services;

    let config = EngineConfig { autoescape, ..EngineConfig::default() };
    let services = Services::from_config(&config);
    let ctx = Context::new(Scope::new(), &config, &services);
    let filters = load_filters();
    let call = FilterCall {
        name: name.to_string(),
        filter: filters[name].clone(),
        arg: arg.map(Operand::Literal),
    };
    FilterExpression::new(name, Operand::Literal(value), vec![call]).resolve(&ctx)
}
