use log::{trace, warn};

use crate::context::Context;
use crate::core::expression::FilterExpression;
use crate::types::{Object, Value};

/// One group produced by `regroup`: the shared key and its members.
/// Unpacks as `(grouper, list)`.
#[derive(Debug, Clone)]
pub struct GroupedResult {
    pub grouper: Value,
    pub list: Value,
}

impl Object for GroupedResult {
    fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "grouper" => Some(self.grouper.clone()),
            "list" => Some(self.list.clone()),
            _ => None,
        }
    }

    fn get_item(&self, index: i64) -> Option<Value> {
        match index {
            0 | -2 => Some(self.grouper.clone()),
            1 | -1 => Some(self.list.clone()),
            _ => None,
        }
    }

    fn as_sequence(&self) -> Option<Vec<Value>> {
        Some(vec![self.grouper.clone(), self.list.clone()])
    }

    fn render(&self) -> String {
        format!("GroupedResult(grouper={}, list={})", self.grouper.repr(), self.list.repr())
    }
}

/// `regroup target by key as name`. Consecutive items with equal keys form
/// a group; the input is expected to be sorted by the key already.
#[derive(Debug, Clone)]
pub struct RegroupNode {
    target: FilterExpression,
    /// `name.key`, resolved with each item bound to `name`.
    key: FilterExpression,
    var_name: String,
}

impl RegroupNode {
    pub fn new(target: FilterExpression, key: FilterExpression, var_name: String) -> Self {
        Self { target, key, var_name }
    }

    pub fn render(&self, ctx: &mut Context<'_>) -> String {
        let items = match self.target.resolve_quiet(ctx) {
            Value::None | Value::Undefined => Vec::new(),
            value => value.try_iter().unwrap_or_else(|| {
                warn!("regroup target '{}' is not iterable", self.target.token());
                Vec::new()
            }),
        };

        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
        for item in items {
            ctx.set(self.var_name.clone(), item.clone());
            let key = self.key.resolve_quiet(ctx);
            match groups.last_mut() {
                Some((grouper, members)) if *grouper == key => members.push(item),
                _ => groups.push((key, vec![item])),
            }
        }
        trace!("RegroupNode: {} groups for '{}'", groups.len(), self.var_name);

        let results: Vec<Value> = groups
            .into_iter()
            .map(|(grouper, members)| Value::from_object(GroupedResult { grouper, list: Value::from(members) }))
            .collect();
        ctx.set(self.var_name.clone(), Value::from(results));
        String::new()
    }
}
