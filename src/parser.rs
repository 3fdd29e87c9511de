use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use log::{debug, error, trace};
use once_cell::sync::Lazy;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;
use regex::Regex;

use crate::core::condition::{CompareOp, Condition};
use crate::core::expression::{unquote, FilterCall, FilterExpression, Operand};
use crate::core::nodes::text::template_tag_symbol;
use crate::core::nodes::{
    AutoescapeNode, CsrfTokenNode, CycleDef, CycleNode, FilterBlockNode, FirstOfNode, ForNode,
    IfChangedNode, IfNode, LoremMethod, LoremNode, Node, NodeList, NowNode, RegroupNode,
    ResetCycleNode, SpacelessNode, TextNode, UrlNode, VariableNode, WidthRatioNode, WithNode,
};
use crate::errors::ParserError;
use crate::id::IdGenerator;
use crate::lexer::{tokenize, Token, TokenKind};
use crate::registry::FilterRegistry;

#[derive(Parser)]
#[grammar = "parser.pest"]
pub(crate) struct TemplateParser;

lazy_static! {
    // Loosest binding first.
    static ref PRATT: PrattParser<Rule> = PrattParser::new()
        .op(Op::infix(Rule::or_op, Assoc::Left))
        .op(Op::infix(Rule::and_op, Assoc::Left))
        .op(Op::prefix(Rule::not_op))
        .op(Op::infix(Rule::in_op, Assoc::Left) | Op::infix(Rule::not_in_op, Assoc::Left))
        .op(Op::infix(Rule::eq_op, Assoc::Left)
            | Op::infix(Rule::ne_op, Assoc::Left)
            | Op::infix(Rule::lt_op, Assoc::Left)
            | Op::infix(Rule::le_op, Assoc::Left)
            | Op::infix(Rule::gt_op, Assoc::Left)
            | Op::infix(Rule::ge_op, Assoc::Left)
            | Op::infix(Rule::is_op, Assoc::Left)
            | Op::infix(Rule::is_not_op, Assoc::Left));
}

static KWARG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+)=(.+)$").unwrap());

fn pest_error(text: &str, err: pest::error::Error<Rule>) -> ParserError {
    error!("Failed to parse '{}': {}", text, err);
    ParserError::Pest(text.to_string(), Box::new(err))
}

/// Splits tag contents on whitespace, keeping quoted runs whole.
pub fn parse_bits(contents: &str) -> Result<Vec<String>, ParserError> {
    let mut pairs = TemplateParser::parse(Rule::bits, contents).map_err(|e| pest_error(contents, e))?;
    let bits = pairs
        .next()
        .ok_or_else(|| ParserError::Internal("Empty parse result for tag arguments".to_string()))?;
    Ok(bits
        .into_inner()
        .filter(|pair| pair.as_rule() == Rule::bit)
        .map(|pair| pair.as_str().to_string())
        .collect())
}

/// Compiles `base|filter:arg|filter` against the registry. Unknown filters
/// and wrong argument counts are rejected here, never at render time.
pub fn parse_filter_expression(token: &str, filters: &FilterRegistry) -> Result<FilterExpression, ParserError> {
    trace!("parse_filter_expression: '{}'", token);
    let mut pairs = TemplateParser::parse(Rule::filter_expression, token).map_err(|e| pest_error(token, e))?;
    let expression = pairs
        .next()
        .ok_or_else(|| ParserError::Internal(format!("Empty parse result for '{}'", token)))?;

    let mut inner = expression.into_inner();
    let base = inner
        .next()
        .ok_or_else(|| ParserError::Internal(format!("Missing operand in '{}'", token)))?;
    let base = Operand::parse(base.as_str())?;

    let mut calls = Vec::new();
    for pair in inner {
        match pair.as_rule() {
            Rule::filter => calls.push(parse_filter_call(pair, filters)?),
            Rule::EOI => (),
            rule => return Err(ParserError::Internal(format!("Unexpected rule {:?} in '{}'", rule, token))),
        }
    }
    Ok(FilterExpression::new(token, base, calls))
}

fn parse_filter_call(pair: Pair<'_, Rule>, filters: &FilterRegistry) -> Result<FilterCall, ParserError> {
    let mut parts = pair.into_inner();
    let name = parts
        .next()
        .map(|p| p.as_str().to_string())
        .ok_or_else(|| ParserError::Internal("Filter without a name".to_string()))?;
    let arg = parts.next().map(|p| Operand::parse(p.as_str())).transpose()?;
    let filter = filters.get(&name)?;
    filter.validate_args(arg.is_some())?;
    Ok(FilterCall { name, filter, arg })
}

/// Compiles an `if` condition. `or` binds loosest, then `and`, then `not`,
/// then `in`/`not in`, then the comparisons.
pub fn parse_condition(text: &str, filters: &FilterRegistry, line: usize) -> Result<Condition, ParserError> {
    trace!("parse_condition: '{}' (line {})", text, line);
    let mut pairs = TemplateParser::parse(Rule::condition, text).map_err(|e| pest_error(text, e))?;
    let condition = pairs
        .next()
        .ok_or_else(|| ParserError::syntax(format!("Empty condition '{}'", text), line))?;
    let terms = condition.into_inner().filter(|pair| pair.as_rule() != Rule::EOI);

    PRATT
        .map_primary(|primary| match primary.as_rule() {
            Rule::atom => parse_filter_expression(primary.as_str(), filters).map(Condition::Operand),
            rule => Err(ParserError::Internal(format!("Unexpected condition term {:?}", rule))),
        })
        .map_prefix(|op, rhs| match op.as_rule() {
            Rule::not_op => Ok(Condition::Not(Box::new(rhs?))),
            rule => Err(ParserError::Internal(format!("Unexpected prefix {:?}", rule))),
        })
        .map_infix(|lhs, op, rhs| {
            let (lhs, rhs) = (Box::new(lhs?), Box::new(rhs?));
            let compare = match op.as_rule() {
                Rule::or_op => return Ok(Condition::Or(lhs, rhs)),
                Rule::and_op => return Ok(Condition::And(lhs, rhs)),
                Rule::eq_op => CompareOp::Eq,
                Rule::ne_op => CompareOp::Ne,
                Rule::lt_op => CompareOp::Lt,
                Rule::le_op => CompareOp::Le,
                Rule::gt_op => CompareOp::Gt,
                Rule::ge_op => CompareOp::Ge,
                Rule::in_op => CompareOp::In,
                Rule::not_in_op => CompareOp::NotIn,
                Rule::is_op => CompareOp::Is,
                Rule::is_not_op => CompareOp::IsNot,
                rule => return Err(ParserError::Internal(format!("Unexpected operator {:?}", rule))),
            };
            Ok(Condition::Compare(compare, lhs, rhs))
        })
        .parse(terms)
}

/// Bookkeeping shared by every tag compiled in one pass.
#[derive(Debug, Default)]
struct CompileContext {
    ids: IdGenerator,
    named_cycles: HashMap<String, Arc<CycleDef>>,
    last_cycle: Option<Arc<CycleDef>>,
}

/// Turns a token stream into a node tree.
pub(crate) struct Compiler<'a> {
    tokens: Vec<Token>,
    position: usize,
    filters: &'a FilterRegistry,
    context: CompileContext,
    /// Open block tags, innermost last, for unclosed-tag reporting.
    command_stack: Vec<(String, usize)>,
}

impl<'a> Compiler<'a> {
    pub fn new(source: &str, filters: &'a FilterRegistry) -> Self {
        Self {
            tokens: tokenize(source),
            position: 0,
            filters,
            context: CompileContext::default(),
            command_stack: Vec::new(),
        }
    }

    pub fn compile(mut self) -> Result<NodeList, ParserError> {
        let (nodes, _) = self.parse(&[])?;
        debug!("Compiled template into {} top-level nodes", nodes.len());
        Ok(nodes)
    }

    fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// Compiles nodes until a block tag named in `until` is reached. The
    /// closing token is consumed and handed back.
    fn parse(&mut self, until: &[&str]) -> Result<(NodeList, Option<Token>), ParserError> {
        let mut nodes = NodeList::new();
        while let Some(token) = self.next_token() {
            match token.kind {
                TokenKind::Text => nodes.push(Node::Text(TextNode::new(token.contents))),
                TokenKind::Comment => (),
                TokenKind::Variable => {
                    if token.contents.is_empty() {
                        return Err(self.syntax(format!("Empty variable tag on line {}", token.line), token.line));
                    }
                    let expression = self.filter_expression(&token.contents)?;
                    nodes.push(Node::Variable(VariableNode::new(expression)));
                }
                TokenKind::Block => {
                    let command = token.command().to_string();
                    if command.is_empty() {
                        return Err(self.syntax(format!("Empty block tag on line {}", token.line), token.line));
                    }
                    if until.contains(&command.as_str()) {
                        return Ok((nodes, Some(token)));
                    }
                    self.command_stack.push((command, token.line));
                    if let Some(node) = self.compile_tag(&token)? {
                        nodes.push(node);
                    }
                    self.command_stack.pop();
                }
            }
        }

        if !until.is_empty() {
            return Err(self.unclosed(until));
        }
        Ok((nodes, None))
    }

    fn parse_until(&mut self, until: &[&str]) -> Result<(NodeList, Token), ParserError> {
        match self.parse(until)? {
            (nodes, Some(end)) => Ok((nodes, end)),
            (_, None) => Err(self.unclosed(until)),
        }
    }

    /// Drops tokens up to and including the block tag `end`.
    fn skip_past(&mut self, end: &str) -> Result<(), ParserError> {
        while let Some(token) = self.next_token() {
            if token.kind == TokenKind::Block && token.contents == end {
                return Ok(());
            }
        }
        Err(self.unclosed(&[end]))
    }

    fn unclosed(&self, until: &[&str]) -> ParserError {
        let (name, line) = self.command_stack.last().cloned().unwrap_or_default();
        error!("Unclosed tag '{}' on line {}, expected {:?}", name, line, until);
        ParserError::UnclosedTag { name, expected: until.join(", "), line }
    }

    fn syntax(&self, message: impl Into<String>, line: usize) -> ParserError {
        let message = message.into();
        error!("Template syntax error at line {}: {}", line, message);
        ParserError::syntax(message, line)
    }

    fn filter_expression(&self, token: &str) -> Result<FilterExpression, ParserError> {
        parse_filter_expression(token, self.filters)
    }

    fn compile_tag(&mut self, token: &Token) -> Result<Option<Node>, ParserError> {
        let command = token.command();
        debug!("Compiling tag '{}' on line {}", command, token.line);
        let node = match command {
            "if" => self.compile_if(token)?,
            "for" => self.compile_for(token)?,
            "with" => self.compile_with(token)?,
            "ifchanged" => self.compile_ifchanged(token)?,
            "cycle" => self.compile_cycle(token)?,
            "resetcycle" => self.compile_resetcycle(token)?,
            "regroup" => self.compile_regroup(token)?,
            "filter" => self.compile_filter_block(token)?,
            "spaceless" => Node::Spaceless(SpacelessNode::new(self.parse_until(&["endspaceless"])?.0)),
            "autoescape" => self.compile_autoescape(token)?,
            "widthratio" => self.compile_widthratio(token)?,
            "firstof" => self.compile_firstof(token)?,
            "now" => self.compile_now(token)?,
            "url" => self.compile_url(token)?,
            "csrf_token" => Node::CsrfToken(CsrfTokenNode),
            "lorem" => self.compile_lorem(token)?,
            "templatetag" => self.compile_templatetag(token)?,
            "verbatim" => self.compile_verbatim(),
            "comment" => {
                self.skip_past("endcomment")?;
                return Ok(None);
            }
            other => {
                error!("Invalid block tag on line {}: '{}'", token.line, other);
                return Err(ParserError::UnknownTag { name: other.to_string(), line: token.line });
            }
        };
        Ok(Some(node))
    }

    fn condition(&self, token: &Token) -> Result<Condition, ParserError> {
        let text = token.contents[token.command().len()..].trim();
        if text.is_empty() {
            return Err(self.syntax(format!("'{}' requires a condition", token.command()), token.line));
        }
        parse_condition(text, self.filters, token.line)
    }

    fn compile_if(&mut self, token: &Token) -> Result<Node, ParserError> {
        let mut arms = Vec::new();
        let mut condition = self.condition(token)?;
        loop {
            let (body, end) = self.parse_until(&["elif", "else", "endif"])?;
            arms.push((Some(condition), body));
            match end.command() {
                "elif" => condition = self.condition(&end)?,
                "else" => {
                    let (body, _) = self.parse_until(&["endif"])?;
                    arms.push((None, body));
                    break;
                }
                _ => break,
            }
        }
        Ok(Node::If(IfNode::new(arms)))
    }

    fn compile_for(&mut self, token: &Token) -> Result<Node, ParserError> {
        let bits = parse_bits(&token.contents)?;
        if bits.len() < 4 {
            return Err(self.syntax(
                format!("'for' statements should have at least four words: {}", token.contents),
                token.line,
            ));
        }
        let reversed = bits.last().is_some_and(|bit| bit == "reversed");
        let in_index = if reversed { bits.len() - 3 } else { bits.len() - 2 };
        if bits[in_index] != "in" {
            return Err(self.syntax(
                format!("'for' statements should use the format 'for x in y': {}", token.contents),
                token.line,
            ));
        }

        let names = bits[1..in_index].join(" ");
        let loopvars: Vec<String> = names.split(',').map(|name| name.trim().to_string()).collect();
        let invalid = |c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '|');
        if loopvars.iter().any(|name| name.is_empty() || name.contains(invalid)) {
            return Err(self.syntax(
                format!("'for' tag received an invalid argument: {}", token.contents),
                token.line,
            ));
        }

        let sequence = self.filter_expression(&bits[in_index + 1])?;
        let (body, end) = self.parse_until(&["empty", "endfor"])?;
        let empty = match end.command() {
            "empty" => Some(self.parse_until(&["endfor"])?.0),
            _ => None,
        };
        Ok(Node::For(ForNode::new(loopvars, sequence, reversed, body, empty, token.line)))
    }

    /// `name=expr` pairs, or `expr as name [and expr as name]` when `legacy`
    /// is allowed. Returns the bindings and how many bits they used.
    fn token_kwargs(
        &self,
        bits: &[String],
        legacy: bool,
    ) -> Result<(Vec<(String, FilterExpression)>, usize), ParserError> {
        let Some(first) = bits.first() else {
            return Ok((Vec::new(), 0));
        };
        let kwarg_format = KWARG.is_match(first);
        if !kwarg_format && !(legacy && bits.len() >= 3 && bits[1] == "as") {
            return Ok((Vec::new(), 0));
        }

        let mut bindings = Vec::new();
        let mut used = 0;
        while used < bits.len() {
            if kwarg_format {
                let Some(caps) = KWARG.captures(&bits[used]) else { break };
                bindings.push((caps[1].to_string(), self.filter_expression(&caps[2])?));
                used += 1;
            } else {
                if bits.len() - used < 3 || bits[used + 1] != "as" {
                    break;
                }
                bindings.push((bits[used + 2].clone(), self.filter_expression(&bits[used])?));
                used += 3;
                match bits.get(used) {
                    Some(joiner) if joiner == "and" => used += 1,
                    _ => break,
                }
            }
        }
        Ok((bindings, used))
    }

    fn compile_with(&mut self, token: &Token) -> Result<Node, ParserError> {
        let bits = parse_bits(&token.contents)?;
        let (bindings, used) = self.token_kwargs(&bits[1..], true)?;
        if bindings.is_empty() {
            return Err(self.syntax("'with' expected at least one variable assignment", token.line));
        }
        if let Some(extra) = bits.get(1 + used) {
            return Err(self.syntax(format!("'with' received an invalid token: '{}'", extra), token.line));
        }
        let (body, _) = self.parse_until(&["endwith"])?;
        Ok(Node::With(WithNode::new(bindings, body)))
    }

    fn compile_ifchanged(&mut self, token: &Token) -> Result<Node, ParserError> {
        let bits = parse_bits(&token.contents)?;
        let expressions = bits[1..]
            .iter()
            .map(|bit| self.filter_expression(bit))
            .collect::<Result<Vec<_>, _>>()?;
        let (body, end) = self.parse_until(&["else", "endifchanged"])?;
        let otherwise = match end.command() {
            "else" => Some(self.parse_until(&["endifchanged"])?.0),
            _ => None,
        };
        let id = self.context.ids.generate();
        Ok(Node::IfChanged(IfChangedNode::new(id, expressions, body, otherwise)))
    }

    fn compile_cycle(&mut self, token: &Token) -> Result<Node, ParserError> {
        let mut args = parse_bits(&token.contents)?;
        if args.len() < 2 {
            return Err(self.syntax("'cycle' tag requires at least two arguments", token.line));
        }

        if args.len() == 2 {
            // reference to a named cycle declared earlier
            let name = &args[1];
            return match self.context.named_cycles.get(name) {
                Some(def) => Ok(Node::Cycle(CycleNode::new(def.clone()))),
                None => {
                    error!("Named cycle '{}' does not exist (line {})", name, token.line);
                    Err(ParserError::UnknownCycle { name: name.clone(), line: token.line })
                }
            };
        }

        let len = args.len();
        let mut named = None;
        if len > 4 && args[len - 3] == "as" {
            if args[len - 1] != "silent" {
                return Err(self.syntax(
                    format!("Only 'silent' flag is allowed after cycle's name, not '{}'.", args[len - 1]),
                    token.line,
                ));
            }
            args.pop();
            named = args.pop().map(|name| (name, true));
            args.pop();
        } else if len > 4 && args[len - 2] == "as" {
            named = args.pop().map(|name| (name, false));
            args.pop();
        }

        let values = args[1..]
            .iter()
            .map(|arg| self.filter_expression(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let (name, silent) = match named {
            Some((name, silent)) => (Some(name), silent),
            None => (None, false),
        };
        let def = Arc::new(CycleDef { id: self.context.ids.generate(), values, name: name.clone(), silent });
        if let Some(name) = name {
            debug!("Declared named cycle '{}' ({})", name, def.id);
            self.context.named_cycles.insert(name, def.clone());
        }
        self.context.last_cycle = Some(def.clone());
        Ok(Node::Cycle(CycleNode::new(def)))
    }

    fn compile_resetcycle(&mut self, token: &Token) -> Result<Node, ParserError> {
        let args = parse_bits(&token.contents)?;
        let def = match args.len() {
            1 => self.context.last_cycle.clone().ok_or_else(|| {
                error!("resetcycle on line {} with no cycle declared before it", token.line);
                ParserError::NoCycles { line: token.line }
            })?,
            2 => self.context.named_cycles.get(&args[1]).cloned().ok_or_else(|| {
                error!("resetcycle on line {}: named cycle '{}' does not exist", token.line, args[1]);
                ParserError::UnknownCycle { name: args[1].clone(), line: token.line }
            })?,
            _ => return Err(self.syntax("'resetcycle' tag accepts at most one argument", token.line)),
        };
        Ok(Node::ResetCycle(ResetCycleNode::new(def)))
    }

    fn compile_regroup(&mut self, token: &Token) -> Result<Node, ParserError> {
        let bits = parse_bits(&token.contents)?;
        if bits.len() != 6 {
            return Err(self.syntax("'regroup' tag takes five arguments", token.line));
        }
        if bits[2] != "by" {
            return Err(self.syntax("second argument to 'regroup' tag must be 'by'", token.line));
        }
        if bits[4] != "as" {
            return Err(self.syntax("next-to-last argument to 'regroup' tag must be 'as'", token.line));
        }
        let target = self.filter_expression(&bits[1])?;
        // the key is looked up on each item, which is bound to the result name
        let key = self.filter_expression(&format!("{}.{}", bits[5], bits[3]))?;
        Ok(Node::Regroup(RegroupNode::new(target, key, bits[5].clone())))
    }

    fn compile_filter_block(&mut self, token: &Token) -> Result<Node, ParserError> {
        let chain = token.contents["filter".len()..].trim();
        if chain.is_empty() {
            return Err(self.syntax("'filter' tag requires at least one filter", token.line));
        }
        let expression = self.filter_expression(&format!("var|{}", chain))?;
        if let Some(call) = expression.filters().iter().find(|call| call.name == "escape" || call.name == "safe") {
            error!("filter tag on line {} uses '{}'", token.line, call.name);
            return Err(ParserError::DisallowedFilter { name: call.name.clone(), line: token.line });
        }
        let (body, _) = self.parse_until(&["endfilter"])?;
        Ok(Node::Filter(FilterBlockNode::new(expression, body)))
    }

    fn compile_autoescape(&mut self, token: &Token) -> Result<Node, ParserError> {
        let bits = parse_bits(&token.contents)?;
        if bits.len() != 2 {
            return Err(self.syntax("'autoescape' tag requires exactly one argument.", token.line));
        }
        let enabled = match bits[1].as_str() {
            "on" => true,
            "off" => false,
            _ => return Err(self.syntax("'autoescape' argument should be 'on' or 'off'", token.line)),
        };
        let (body, _) = self.parse_until(&["endautoescape"])?;
        Ok(Node::Autoescape(AutoescapeNode::new(enabled, body)))
    }

    fn compile_widthratio(&mut self, token: &Token) -> Result<Node, ParserError> {
        let bits = parse_bits(&token.contents)?;
        let asvar = match bits.len() {
            4 => None,
            6 if bits[4] == "as" => Some(bits[5].clone()),
            6 => return Err(self.syntax("Invalid syntax in widthratio tag. Expecting 'as' keyword", token.line)),
            _ => return Err(self.syntax("widthratio takes at least three arguments", token.line)),
        };
        let value = self.filter_expression(&bits[1])?;
        let max = self.filter_expression(&bits[2])?;
        let scale = self.filter_expression(&bits[3])?;
        if let Operand::Literal(literal) = scale.base() {
            if scale.filters().is_empty() && literal.to_int().is_none() {
                return Err(self.syntax("widthratio final argument must be a number", token.line));
            }
        }
        Ok(Node::WidthRatio(WidthRatioNode::new(value, max, scale, asvar, token.line)))
    }

    /// Splits a trailing `as name` off `bits`.
    fn take_asvar(bits: &mut Vec<String>, min_len: usize) -> Option<String> {
        let len = bits.len();
        if len >= min_len + 2 && bits[len - 2] == "as" {
            let name = bits.pop();
            bits.pop();
            name
        } else {
            None
        }
    }

    fn compile_firstof(&mut self, token: &Token) -> Result<Node, ParserError> {
        let mut bits = parse_bits(&token.contents)?;
        let asvar = Self::take_asvar(&mut bits, 1);
        if bits.len() < 2 {
            return Err(self.syntax("'firstof' statement requires at least one argument", token.line));
        }
        let values = bits[1..]
            .iter()
            .map(|bit| self.filter_expression(bit))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Node::FirstOf(FirstOfNode::new(values, asvar)))
    }

    fn compile_now(&mut self, token: &Token) -> Result<Node, ParserError> {
        let mut bits = parse_bits(&token.contents)?;
        let asvar = if bits.len() == 4 { Self::take_asvar(&mut bits, 2) } else { None };
        if bits.len() != 2 {
            return Err(self.syntax("'now' statement takes one argument", token.line));
        }
        let format = unquote(&bits[1])
            .ok_or_else(|| self.syntax("'now' format must be a quoted string", token.line))?;
        Ok(Node::Now(NowNode::new(format, asvar)))
    }

    fn compile_url(&mut self, token: &Token) -> Result<Node, ParserError> {
        let mut bits = parse_bits(&token.contents)?;
        if bits.len() < 2 {
            return Err(self.syntax("'url' takes at least one argument, a URL pattern name.", token.line));
        }
        let asvar = Self::take_asvar(&mut bits, 2);
        let name = self.filter_expression(&bits[1])?;

        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        for bit in &bits[2..] {
            match KWARG.captures(bit) {
                Some(caps) => kwargs.push((caps[1].to_string(), self.filter_expression(&caps[2])?)),
                None => args.push(self.filter_expression(bit)?),
            }
        }
        Ok(Node::Url(UrlNode::new(name, args, kwargs, asvar, token.line)))
    }

    fn compile_lorem(&mut self, token: &Token) -> Result<Node, ParserError> {
        let mut bits = parse_bits(&token.contents)?;
        let common = bits.last().is_none_or(|bit| bit != "random");
        if !common {
            bits.pop();
        }
        let method = match bits.last().and_then(|bit| LoremMethod::from_bit(bit)) {
            Some(method) if bits.len() > 1 => {
                bits.pop();
                method
            }
            _ => LoremMethod::Plain,
        };
        let count = match bits.len() {
            1 => self.filter_expression("1")?,
            2 => self.filter_expression(&bits[1])?,
            _ => return Err(self.syntax("Incorrect format for 'lorem' tag", token.line)),
        };
        Ok(Node::Lorem(LoremNode::new(count, method, common)))
    }

    fn compile_templatetag(&mut self, token: &Token) -> Result<Node, ParserError> {
        let bits = parse_bits(&token.contents)?;
        if bits.len() != 2 {
            return Err(self.syntax("'templatetag' statement takes one argument", token.line));
        }
        match template_tag_symbol(&bits[1]) {
            Some(symbol) => Ok(Node::Text(TextNode::new(symbol))),
            None => {
                error!("Invalid templatetag argument '{}' on line {}", bits[1], token.line);
                Err(ParserError::InvalidTemplateTag { name: bits[1].clone(), line: token.line })
            }
        }
    }

    /// The lexer already turned everything up to the matching end tag into
    /// raw text tokens.
    fn compile_verbatim(&mut self) -> Node {
        let mut content = String::new();
        while let Some(token) = self.next_token() {
            if token.kind == TokenKind::Block && token.command() == "endverbatim" {
                break;
            }
            content.push_str(&token.contents);
        }
        Node::Text(TextNode::new(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> Result<NodeList, ParserError> {
        let registry = FilterRegistry::new();
        Compiler::new(source, &registry).compile()
    }

    #[test]
    fn splits_bits_keeping_quotes() {
        assert_eq!(
            parse_bits(r#"with greeting="hello world" n=1"#).unwrap(),
            vec!["with", r#"greeting="hello world""#, "n=1"]
        );
        assert_eq!(parse_bits("cycle 'a b' c").unwrap(), vec!["cycle", "'a b'", "c"]);
    }

    #[test]
    fn compiles_filter_chains() {
        let registry = FilterRegistry::new();
        let expr = parse_filter_expression(r#"name|default:"x y"|upper"#, &registry).unwrap();
        assert_eq!(expr.filters().len(), 2);
        assert_eq!(expr.filters()[0].name, "default");
        assert!(expr.filters()[0].arg.is_some());
        assert!(expr.filters()[1].arg.is_none());
    }

    #[test]
    fn rejects_bad_filters() {
        let registry = FilterRegistry::new();
        assert!(matches!(
            parse_filter_expression("name|nope", &registry),
            Err(ParserError::UnknownFilter(name)) if name == "nope"
        ));
        assert!(matches!(
            parse_filter_expression("name|upper:1", &registry),
            Err(ParserError::FilterArguments { .. })
        ));
        assert!(matches!(
            parse_filter_expression("name|add", &registry),
            Err(ParserError::FilterArguments { .. })
        ));
        assert!(matches!(parse_filter_expression("_secret", &registry), Err(ParserError::PrivateAccess(_))));
    }

    #[test]
    fn compiles_nested_blocks() {
        let nodes = compile("{% for x in items %}{% if x %}{{ x }}{% else %}-{% endif %}{% empty %}none{% endfor %}")
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].name(), "for");
    }

    #[test]
    fn reports_unclosed_and_unknown_tags() {
        match compile("a\n{% if x %}\n{% for y in z %}") {
            Err(ParserError::UnclosedTag { name, line, .. }) => {
                assert_eq!(name, "for");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected {:?}", other.map(|n| n.len())),
        }
        assert!(matches!(compile("{% bogus %}"), Err(ParserError::UnknownTag { name, .. }) if name == "bogus"));
        assert!(matches!(compile("{% endif %}"), Err(ParserError::UnknownTag { .. })));
        assert!(matches!(compile("{{ }}"), Err(ParserError::Syntax { .. })));
    }

    #[test]
    fn cycle_declarations() {
        assert!(compile("{% cycle 'a' 'b' as row %}{% cycle row %}{% resetcycle row %}").is_ok());
        assert!(matches!(compile("{% cycle row %}"), Err(ParserError::UnknownCycle { .. })));
        assert!(matches!(compile("{% resetcycle %}"), Err(ParserError::NoCycles { line: 1 })));
        assert!(matches!(compile("{% cycle 'a' 'b' as row loud %}"), Err(ParserError::Syntax { .. })));
    }

    #[test]
    fn tag_argument_checks() {
        assert!(matches!(compile("{% filter escape %}x{% endfilter %}"), Err(ParserError::DisallowedFilter { .. })));
        assert!(matches!(compile("{% autoescape maybe %}{% endautoescape %}"), Err(ParserError::Syntax { .. })));
        assert!(matches!(compile("{% widthratio a b 'c' %}"), Err(ParserError::Syntax { .. })));
        assert!(matches!(compile("{% templatetag openpaw %}"), Err(ParserError::InvalidTemplateTag { .. })));
        assert!(matches!(compile("{% regroup a on b as c %}"), Err(ParserError::Syntax { .. })));
        assert!(matches!(compile("{% with %}{% endwith %}"), Err(ParserError::Syntax { .. })));
        assert!(matches!(compile("{% for x on y %}{% endfor %}"), Err(ParserError::Syntax { .. })));
        assert!(matches!(compile("{% for a|b in y %}{% endfor %}"), Err(ParserError::Syntax { .. })));
        assert!(matches!(compile("{% lorem 2 w random extra %}"), Err(ParserError::Syntax { .. })));
        assert!(compile("{% lorem %}{% lorem 3 p %}{% lorem n w random %}").is_ok());
        assert!(matches!(compile("{% for 'a' in y %}{% endfor %}"), Err(ParserError::Syntax { .. })));
        assert!(matches!(compile("{% for a, \"b\" in y %}{% endfor %}"), Err(ParserError::Syntax { .. })));
    }

    #[test]
    fn parses_conditions() {
        let registry = FilterRegistry::new();
        assert!(matches!(parse_condition("a or b and c", &registry, 1).unwrap(), Condition::Or(..)));
        assert!(matches!(parse_condition("not a in b", &registry, 1).unwrap(), Condition::Not(..)));
        assert!(matches!(
            parse_condition("a is not None", &registry, 1).unwrap(),
            Condition::Compare(CompareOp::IsNot, ..)
        ));
        assert!(matches!(
            parse_condition("a not in b", &registry, 1).unwrap(),
            Condition::Compare(CompareOp::NotIn, ..)
        ));
        assert!(parse_condition("a ==", &registry, 1).is_err());
        assert!(parse_condition("and", &registry, 1).is_err());
    }
}
