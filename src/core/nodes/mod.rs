use std::ops::{Deref, DerefMut};

use log::trace;

use crate::context::Context;
use crate::core::escape::conditional_escape;
use crate::errors::RenderError;
use crate::types::{Str, Value};

pub mod autoescape;
pub mod changed;
pub mod conditional;
pub mod cycle;
pub mod filter_block;
pub mod loops;
pub mod lorem;
pub mod misc;
pub mod regroup;
pub mod spaceless;
pub mod text;
pub mod variable;
pub mod widthratio;
pub mod with;

pub use autoescape::AutoescapeNode;
pub use changed::IfChangedNode;
pub use conditional::IfNode;
pub use cycle::{CycleDef, CycleNode, ResetCycleNode};
pub use filter_block::FilterBlockNode;
pub use loops::ForNode;
pub use lorem::{LoremMethod, LoremNode};
pub use misc::{CsrfTokenNode, FirstOfNode, NowNode, UrlNode};
pub use regroup::{GroupedResult, RegroupNode};
pub use spaceless::SpacelessNode;
pub use text::TextNode;
pub use variable::VariableNode;
pub use widthratio::WidthRatioNode;
pub use with::WithNode;

/// One unit of compiled template structure.
#[derive(Debug, Clone)]
pub enum Node {
    Text(TextNode),
    Variable(VariableNode),
    If(IfNode),
    For(ForNode),
    With(WithNode),
    IfChanged(IfChangedNode),
    Cycle(CycleNode),
    ResetCycle(ResetCycleNode),
    Regroup(RegroupNode),
    Filter(FilterBlockNode),
    Spaceless(SpacelessNode),
    Autoescape(AutoescapeNode),
    WidthRatio(WidthRatioNode),
    FirstOf(FirstOfNode),
    Now(NowNode),
    Url(UrlNode),
    CsrfToken(CsrfTokenNode),
    Lorem(LoremNode),
}

impl Node {
    pub fn render(&self, ctx: &mut Context<'_>) -> Result<String, RenderError> {
        match self {
            Node::Text(node) => Ok(node.render()),
            Node::Variable(node) => Ok(node.render(ctx)),
            Node::If(node) => node.render(ctx),
            Node::For(node) => node.render(ctx),
            Node::With(node) => node.render(ctx),
            Node::IfChanged(node) => node.render(ctx),
            Node::Cycle(node) => Ok(node.render(ctx)),
            Node::ResetCycle(node) => Ok(node.render(ctx)),
            Node::Regroup(node) => Ok(node.render(ctx)),
            Node::Filter(node) => node.render(ctx),
            Node::Spaceless(node) => node.render(ctx),
            Node::Autoescape(node) => node.render(ctx),
            Node::WidthRatio(node) => node.render(ctx),
            Node::FirstOf(node) => Ok(node.render(ctx)),
            Node::Now(node) => Ok(node.render(ctx)),
            Node::Url(node) => node.render(ctx),
            Node::CsrfToken(node) => Ok(node.render(ctx)),
            Node::Lorem(node) => Ok(node.render(ctx)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Node::Text(_) => "text",
            Node::Variable(_) => "variable",
            Node::If(_) => "if",
            Node::For(_) => "for",
            Node::With(_) => "with",
            Node::IfChanged(_) => "ifchanged",
            Node::Cycle(_) => "cycle",
            Node::ResetCycle(_) => "resetcycle",
            Node::Regroup(_) => "regroup",
            Node::Filter(_) => "filter",
            Node::Spaceless(_) => "spaceless",
            Node::Autoescape(_) => "autoescape",
            Node::WidthRatio(_) => "widthratio",
            Node::FirstOf(_) => "firstof",
            Node::Now(_) => "now",
            Node::Url(_) => "url",
            Node::CsrfToken(_) => "csrf_token",
            Node::Lorem(_) => "lorem",
        }
    }
}

/// An ordered list of sibling nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeList(Vec<Node>);

impl NodeList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Renders every node in order. Node output is already escaped, so the
    /// concatenation is safe text.
    pub fn render(&self, ctx: &mut Context<'_>) -> Result<String, RenderError> {
        let mut output = String::new();
        for node in &self.0 {
            trace!("NodeList::render: {}", node.name());
            output.push_str(&node.render(ctx)?);
        }
        Ok(output)
    }
}

impl Deref for NodeList {
    type Target = Vec<Node>;

    fn deref(&self) -> &Vec<Node> {
        &self.0
    }
}

impl DerefMut for NodeList {
    fn deref_mut(&mut self) -> &mut Vec<Node> {
        &mut self.0
    }
}

impl From<Vec<Node>> for NodeList {
    fn from(nodes: Vec<Node>) -> Self {
        Self(nodes)
    }
}

/// Converts a value to output text under the ambient autoescape setting.
/// Dates use the configured datetime format.
pub fn render_value_in_context(value: &Value, ctx: &Context<'_>) -> Str {
    let value = match value {
        Value::DateTime(dt) => {
            let format = ctx.config().named_format("DATETIME_FORMAT");
            Value::from(ctx.services().date_formatter.format_date(dt, format))
        }
        other => other.clone(),
    };
    if ctx.autoescape() { conditional_escape(&value) } else { value.to_str() }
}
