use log::trace;

use crate::context::Context;
use crate::errors::RenderError;

use super::NodeList;

/// `autoescape on|off`: switches escaping for the body only.
#[derive(Debug, Clone)]
pub struct AutoescapeNode {
    enabled: bool,
    body: NodeList,
}

impl AutoescapeNode {
    pub fn new(enabled: bool, body: NodeList) -> Self {
        Self { enabled, body }
    }

    pub fn render(&self, ctx: &mut Context<'_>) -> Result<String, RenderError> {
        trace!("AutoescapeNode: autoescape {}", if self.enabled { "on" } else { "off" });
        let mut inner = ctx.with_autoescape(self.enabled);
        self.body.render(&mut inner)
    }
}
