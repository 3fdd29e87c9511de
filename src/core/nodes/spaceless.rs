use crate::context::Context;
use crate::core::escape::strip_spaces_between_tags;
use crate::errors::RenderError;

use super::NodeList;

/// Removes whitespace between tags, never between a tag and text.
#[derive(Debug, Clone)]
pub struct SpacelessNode {
    body: NodeList,
}

impl SpacelessNode {
    pub fn new(body: NodeList) -> Self {
        Self { body }
    }

    pub fn render(&self, ctx: &mut Context<'_>) -> Result<String, RenderError> {
        let output = self.body.render(ctx)?;
        Ok(strip_spaces_between_tags(output.trim()))
    }
}
