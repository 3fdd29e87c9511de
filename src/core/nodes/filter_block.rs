use std::collections::HashMap;

use crate::context::Context;
use crate::core::expression::FilterExpression;
use crate::errors::RenderError;
use crate::types::Value;

use super::NodeList;

/// `filter f|g`: the rendered body runs through the filter chain. The chain
/// is compiled as `var|f|g` and the body is bound to `var`.
#[derive(Debug, Clone)]
pub struct FilterBlockNode {
    expression: FilterExpression,
    body: NodeList,
}

impl FilterBlockNode {
    pub fn new(expression: FilterExpression, body: NodeList) -> Self {
        Self { expression, body }
    }

    pub fn render(&self, ctx: &mut Context<'_>) -> Result<String, RenderError> {
        let output = self.body.render(ctx)?;
        let mut vars = HashMap::new();
        vars.insert("var".to_string(), Value::safe_string(output));
        let inner = ctx.push(vars);
        Ok(self.expression.resolve(&inner).to_string())
    }
}
