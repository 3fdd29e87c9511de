use log::trace;

use crate::context::Context;
use crate::core::condition::Condition;
use crate::errors::RenderError;

use super::NodeList;

/// `if` / `elif` / `else`. Arms are tried in order; an arm without a
/// condition is the `else` branch.
#[derive(Debug, Clone)]
pub struct IfNode {
    arms: Vec<(Option<Condition>, NodeList)>,
}

impl IfNode {
    pub fn new(arms: Vec<(Option<Condition>, NodeList)>) -> Self {
        Self { arms }
    }

    pub fn render(&self, ctx: &mut Context<'_>) -> Result<String, RenderError> {
        for (index, (condition, body)) in self.arms.iter().enumerate() {
            let matched = match condition {
                Some(condition) => condition.is_true(ctx),
                None => true,
            };
            if matched {
                trace!("IfNode: arm {} matched", index);
                return body.render(ctx);
            }
        }
        Ok(String::new())
    }
}
