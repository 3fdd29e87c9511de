use log::trace;

use crate::context::{ChangeMemo, Context, NodeState, StateKey};
use crate::core::expression::FilterExpression;
use crate::errors::RenderError;
use crate::id::NodeId;

use super::NodeList;

/// `ifchanged [expr ...]`. Without expressions the rendered body itself is
/// compared. Memory lives with the innermost running loop, so a nested
/// `ifchanged` starts over on every run of its loop.
#[derive(Debug, Clone)]
pub struct IfChangedNode {
    id: NodeId,
    expressions: Vec<FilterExpression>,
    body: NodeList,
    otherwise: Option<NodeList>,
}

impl IfChangedNode {
    pub fn new(id: NodeId, expressions: Vec<FilterExpression>, body: NodeList, otherwise: Option<NodeList>) -> Self {
        Self { id, expressions, body, otherwise }
    }

    fn state_key(&self, ctx: &Context<'_>) -> StateKey {
        match ctx.current_loop() {
            Some(loop_id) => StateKey::Loop(loop_id, self.id),
            None => StateKey::Global(self.id),
        }
    }

    pub fn render(&self, ctx: &mut Context<'_>) -> Result<String, RenderError> {
        let key = self.state_key(ctx);
        let (current, rendered) = if self.expressions.is_empty() {
            let output = self.body.render(ctx)?;
            (ChangeMemo::Output(output.clone()), Some(output))
        } else {
            let values = self.expressions.iter().map(|expr| expr.resolve_quiet(ctx)).collect();
            (ChangeMemo::Values(values), None)
        };

        let changed = match ctx.state().get(&key) {
            Some(NodeState::Changed(previous)) => previous != &current,
            _ => true,
        };
        trace!("IfChangedNode {}: changed={}", self.id, changed);

        if changed {
            ctx.state_mut().insert(key, NodeState::Changed(current));
            return match rendered {
                Some(output) => Ok(output),
                None => self.body.render(ctx),
            };
        }
        match &self.otherwise {
            Some(otherwise) => otherwise.render(ctx),
            None => Ok(String::new()),
        }
    }
}
