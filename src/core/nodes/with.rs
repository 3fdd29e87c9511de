use std::collections::HashMap;

use crate::context::Context;
use crate::core::expression::FilterExpression;
use crate::errors::RenderError;

use super::NodeList;

/// `with name=expr ...`: binds names for the body only.
#[derive(Debug, Clone)]
pub struct WithNode {
    bindings: Vec<(String, FilterExpression)>,
    body: NodeList,
}

impl WithNode {
    pub fn new(bindings: Vec<(String, FilterExpression)>, body: NodeList) -> Self {
        Self { bindings, body }
    }

    pub fn render(&self, ctx: &mut Context<'_>) -> Result<String, RenderError> {
        // every binding sees the outer scope, never a sibling binding
        let vars: HashMap<_, _> = self
            .bindings
            .iter()
            .map(|(name, expr)| (name.clone(), expr.resolve(ctx)))
            .collect();
        let mut inner = ctx.push(vars);
        self.body.render(&mut inner)
    }
}
