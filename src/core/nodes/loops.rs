use std::collections::HashMap;

use log::{error, trace, warn};

use crate::context::{Context, LoopFrame};
use crate::core::expression::FilterExpression;
use crate::errors::RenderError;
use crate::types::{Map, Value};

use super::NodeList;

/// `for a, b in sequence [reversed]` with an optional `empty` body.
#[derive(Debug, Clone)]
pub struct ForNode {
    loopvars: Vec<String>,
    sequence: FilterExpression,
    reversed: bool,
    body: NodeList,
    empty: Option<NodeList>,
    line: usize,
}

impl ForNode {
    pub fn new(
        loopvars: Vec<String>,
        sequence: FilterExpression,
        reversed: bool,
        body: NodeList,
        empty: Option<NodeList>,
        line: usize,
    ) -> Self {
        Self { loopvars, sequence, reversed, body, empty, line }
    }

    pub fn render(&self, ctx: &mut Context<'_>) -> Result<String, RenderError> {
        let parent = ctx.get("forloop").cloned().unwrap_or_else(|| Value::from(Map::new()));
        let mut scope = ctx.push_loop();

        let mut items = match self.sequence.resolve_quiet(&scope) {
            Value::None | Value::Undefined => Vec::new(),
            value => value.try_iter().unwrap_or_else(|| {
                warn!("'{}' is not iterable ({}); looping over nothing", self.sequence.token(), value.kind());
                Vec::new()
            }),
        };
        if items.is_empty() {
            return match &self.empty {
                Some(empty) => empty.render(&mut scope),
                None => Ok(String::new()),
            };
        }
        if self.reversed {
            items.reverse();
        }

        let len = items.len();
        let mut output = String::new();
        for (index, item) in items.into_iter().enumerate() {
            trace!("ForNode: iteration {} of {}", index + 1, len);
            let frame = LoopFrame { index, len, parent: parent.clone() };
            scope.set("forloop", frame.to_value());

            if let [name] = self.loopvars.as_slice() {
                scope.set(name.clone(), item);
                output.push_str(&self.body.render(&mut scope)?);
                continue;
            }

            // only sequences unpack; strings and maps count as one value
            let parts = match &item {
                Value::List(values) => values.as_ref().clone(),
                Value::Object(object) => object.as_sequence().unwrap_or_else(|| vec![item.clone()]),
                _ => vec![item.clone()],
            };
            if parts.len() != self.loopvars.len() {
                error!("Cannot unpack {} values into {} loop variables", parts.len(), self.loopvars.len());
                return Err(RenderError::Unpack { expected: self.loopvars.len(), found: parts.len(), line: self.line });
            }
            let vars: HashMap<String, Value> = self.loopvars.iter().cloned().zip(parts).collect();
            let mut iteration = scope.push(vars);
            output.push_str(&self.body.render(&mut iteration)?);
        }
        Ok(output)
    }
}
