use crate::context::Context;
use crate::core::expression::FilterExpression;

use super::render_value_in_context;

/// `{{ expression }}`.
#[derive(Debug, Clone)]
pub struct VariableNode {
    expression: FilterExpression,
}

impl VariableNode {
    pub fn new(expression: FilterExpression) -> Self {
        Self { expression }
    }

    pub fn render(&self, ctx: &Context<'_>) -> String {
        let value = self.expression.resolve(ctx);
        render_value_in_context(&value, ctx).into_string()
    }
}
