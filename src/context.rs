use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use log::trace;

use crate::config::EngineConfig;
use crate::id::NodeId;
use crate::registry::Services;
use crate::types::{Map, Value};

#[derive(Debug, Clone, Default)]
struct Frame {
    vars: HashMap<String, Value>,
    /// Set on the frame a loop pushes for its whole run.
    loop_id: Option<u64>,
}

/// Stack of name→value frames. Lookups search innermost to outermost.
#[derive(Debug, Clone)]
pub struct Scope {
    frames: Vec<Frame>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// A scope holding only the builtins `True`, `False` and `None`.
    pub fn new() -> Self {
        let mut builtins = HashMap::new();
        builtins.insert("True".to_string(), Value::Bool(true));
        builtins.insert("False".to_string(), Value::Bool(false));
        builtins.insert("None".to_string(), Value::None);
        Self { frames: vec![Frame { vars: builtins, loop_id: None }, Frame::default()] }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.vars.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Binds `name` in the innermost frame.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.insert(name.into(), value);
        }
    }

    /// Rebinds `name` in the innermost frame that already defines it, or
    /// binds it in the innermost frame otherwise.
    pub fn set_upward(&mut self, name: &str, value: Value) {
        match self.frames.iter_mut().rev().find(|frame| frame.vars.contains_key(name)) {
            Some(frame) => {
                frame.vars.insert(name.to_string(), value);
            }
            None => self.set(name, value),
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn push(&mut self, vars: HashMap<String, Value>, loop_id: Option<u64>) {
        self.frames.push(Frame { vars, loop_id });
    }

    fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    fn innermost_loop(&self) -> Option<u64> {
        self.frames.iter().rev().find_map(|frame| frame.loop_id)
    }
}

impl From<Map> for Scope {
    fn from(vars: Map) -> Self {
        let mut scope = Scope::new();
        for (name, value) in vars {
            scope.set(name, value);
        }
        scope
    }
}

/// Key of a per-node memory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    Global(NodeId),
    Loop(u64, NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeMemo {
    Values(Vec<Value>),
    Output(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeState {
    Cycle(usize),
    Changed(ChangeMemo),
}

/// Per-render memory of stateful nodes. Created fresh for every top-level
/// render and never shared between renders.
#[derive(Debug, Default)]
pub struct RenderState {
    slots: HashMap<StateKey, NodeState>,
    next_loop: u64,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &StateKey) -> Option<&NodeState> {
        self.slots.get(key)
    }

    pub fn insert(&mut self, key: StateKey, state: NodeState) {
        trace!("RenderState::insert: {:?} = {:?}", key, state);
        self.slots.insert(key, state);
    }

    fn allocate_loop(&mut self) -> u64 {
        let id = self.next_loop;
        self.next_loop += 1;
        id
    }
}

/// Position metadata exposed as `forloop` during one loop's iteration.
#[derive(Debug, Clone)]
pub struct LoopFrame {
    pub index: usize,
    pub len: usize,
    pub parent: Value,
}

impl LoopFrame {
    pub fn first(&self) -> bool {
        self.index == 0
    }

    pub fn last(&self) -> bool {
        self.index + 1 == self.len
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("counter0".into(), Value::from(self.index));
        map.insert("counter".into(), Value::from(self.index + 1));
        map.insert("revcounter".into(), Value::from(self.len - self.index));
        map.insert("revcounter0".into(), Value::from(self.len - self.index - 1));
        map.insert("first".into(), Value::Bool(self.first()));
        map.insert("last".into(), Value::Bool(self.last()));
        map.insert("parentloop".into(), self.parent.clone());
        Value::from(map)
    }
}

/// Everything a render pass threads through the node tree.
pub struct Context<'e> {
    scope: Scope,
    state: RenderState,
    autoescape: bool,
    config: &'e EngineConfig,
    services: &'e Services,
}

impl<'e> Context<'e> {
    pub(crate) fn new(scope: Scope, config: &'e EngineConfig, services: &'e Services) -> Self {
        Self { scope, state: RenderState::new(), autoescape: config.autoescape, config, services }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scope.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.scope.set(name, value);
    }

    pub fn set_upward(&mut self, name: &str, value: Value) {
        self.scope.set_upward(name, value);
    }

    pub fn autoescape(&self) -> bool {
        self.autoescape
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    pub fn services(&self) -> &Services {
        self.services
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RenderState {
        &mut self.state
    }

    /// Id of the innermost loop currently running, if any.
    pub fn current_loop(&self) -> Option<u64> {
        self.scope.innermost_loop()
    }

    /// Pushes a frame that is popped when the guard drops, on every exit path.
    pub fn push(&mut self, vars: HashMap<String, Value>) -> ScopeGuard<'_, 'e> {
        let depth = self.scope.depth();
        self.scope.push(vars, None);
        ScopeGuard { context: self, depth }
    }

    /// Pushes the frame a loop runs in, tagged with a fresh loop id.
    pub fn push_loop(&mut self) -> ScopeGuard<'_, 'e> {
        let depth = self.scope.depth();
        let loop_id = self.state.allocate_loop();
        self.scope.push(HashMap::new(), Some(loop_id));
        ScopeGuard { context: self, depth }
    }

    /// Switches the ambient autoescape setting until the guard drops.
    pub fn with_autoescape(&mut self, enabled: bool) -> AutoescapeGuard<'_, 'e> {
        let previous = self.autoescape;
        self.autoescape = enabled;
        AutoescapeGuard { context: self, previous }
    }
}

pub struct ScopeGuard<'c, 'e> {
    context: &'c mut Context<'e>,
    depth: usize,
}

impl<'e> Deref for ScopeGuard<'_, 'e> {
    type Target = Context<'e>;

    fn deref(&self) -> &Context<'e> {
        self.context
    }
}

impl<'e> DerefMut for ScopeGuard<'_, 'e> {
    fn deref_mut(&mut self) -> &mut Context<'e> {
        self.context
    }
}

impl Drop for ScopeGuard<'_, '_> {
    fn drop(&mut self) {
        // Never pops below the depth recorded at push time.
        self.context.scope.truncate(self.depth);
    }
}

pub struct AutoescapeGuard<'c, 'e> {
    context: &'c mut Context<'e>,
    previous: bool,
}

impl<'e> Deref for AutoescapeGuard<'_, 'e> {
    type Target = Context<'e>;

    fn deref(&self) -> &Context<'e> {
        self.context
    }
}

impl<'e> DerefMut for AutoescapeGuard<'_, 'e> {
    fn deref_mut(&mut self) -> &mut Context<'e> {
        self.context
    }
}

impl Drop for AutoescapeGuard<'_, '_> {
    fn drop(&mut self) {
        self.context.autoescape = self.previous;
    }
}
