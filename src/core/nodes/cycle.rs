use std::sync::Arc;

use log::trace;

use crate::context::{Context, NodeState, StateKey};
use crate::core::expression::FilterExpression;
use crate::id::NodeId;

use super::render_value_in_context;

/// A declared cycle. References by name share the same definition, and
/// therefore the same rotation.
#[derive(Debug)]
pub struct CycleDef {
    pub id: NodeId,
    pub values: Vec<FilterExpression>,
    pub name: Option<String>,
    pub silent: bool,
}

#[derive(Debug, Clone)]
pub struct CycleNode {
    def: Arc<CycleDef>,
}

impl CycleNode {
    pub fn new(def: Arc<CycleDef>) -> Self {
        Self { def }
    }

    pub fn render(&self, ctx: &mut Context<'_>) -> String {
        let key = StateKey::Global(self.def.id);
        let position = match ctx.state().get(&key) {
            Some(NodeState::Cycle(position)) => *position,
            _ => 0,
        };
        let Some(expr) = self.def.values.get(position % self.def.values.len().max(1)) else {
            return String::new();
        };
        ctx.state_mut().insert(key, NodeState::Cycle((position + 1) % self.def.values.len()));

        let value = expr.resolve(ctx);
        trace!("CycleNode {}: position {} -> {:?}", self.def.id, position, value);
        if let Some(name) = &self.def.name {
            ctx.set_upward(name, value.clone());
        }
        if self.def.silent {
            return String::new();
        }
        render_value_in_context(&value, ctx).into_string()
    }
}

/// `resetcycle [name]`: the next visit of the cycle starts from its first
/// value again.
#[derive(Debug, Clone)]
pub struct ResetCycleNode {
    def: Arc<CycleDef>,
}

impl ResetCycleNode {
    pub fn new(def: Arc<CycleDef>) -> Self {
        Self { def }
    }

    pub fn render(&self, ctx: &mut Context<'_>) -> String {
        trace!("ResetCycleNode: resetting {}", self.def.id);
        ctx.state_mut().insert(StateKey::Global(self.def.id), NodeState::Cycle(0));
        String::new()
    }
}
